//! Recursive-descent parser for the whitelist declaration strings.
//!
//! ```text
//! type   := "ref " type | core suffix*
//! core   := "!!" digits | "!" digits | keyword | dotted ("/" ident)* ("<" type ("," type)* ">")?
//! suffix := "[]" | "*"
//! field  := type " " name
//! method := type " " name ("<" ","* ">")? "(" (type ("," type)*)? ")"
//! ```

use std::str::FromStr;

use crate::{
    metadata::signatures::PrimitiveType,
    sandbox::{
        config::{WhitelistField, WhitelistMethod},
        types::MType,
    },
    Error, Result,
};

/// Parse a single type, e.g. ``System.Collections.Generic.List`1<int>[]``.
///
/// # Errors
/// Returns [`Error::Config`] if `input` is not a complete type.
pub fn parse_type(input: &str) -> Result<MType> {
    let mut cursor = Cursor::new(input);
    let parsed = cursor.parse_type()?;
    cursor.finish()?;
    Ok(parsed)
}

/// Parse a field declaration, e.g. `int Count`.
///
/// # Errors
/// Returns [`Error::Config`] if `input` is not a field declaration.
pub fn parse_field(input: &str) -> Result<WhitelistField> {
    let mut cursor = Cursor::new(input);
    let field_type = cursor.parse_type()?;
    cursor.require_whitespace()?;
    let name = cursor.member_name()?;
    cursor.finish()?;

    Ok(WhitelistField {
        name: name.to_string(),
        field_type,
    })
}

/// Parse a method declaration, e.g. `void Write<,>(string, !!0)`.
///
/// # Errors
/// Returns [`Error::Config`] if `input` is not a method declaration.
pub fn parse_method(input: &str) -> Result<WhitelistMethod> {
    let mut cursor = Cursor::new(input);
    let return_type = cursor.parse_type()?;
    cursor.require_whitespace()?;
    let name = cursor.member_name()?;

    let mut generic_parameter_count = 0;
    if cursor.eat('<') {
        generic_parameter_count = 1;
        loop {
            cursor.skip_whitespace();
            if !cursor.eat(',') {
                break;
            }
            generic_parameter_count += 1;
        }
        cursor.expect('>')?;
    }

    cursor.skip_whitespace();
    cursor.expect('(')?;
    let mut parameter_types = Vec::new();
    cursor.skip_whitespace();
    if !cursor.eat(')') {
        loop {
            parameter_types.push(cursor.parse_type()?);
            cursor.skip_whitespace();
            if cursor.eat(',') {
                continue;
            }
            cursor.expect(')')?;
            break;
        }
    }
    cursor.finish()?;

    Ok(WhitelistMethod {
        name: name.to_string(),
        return_type,
        parameter_types,
        generic_parameter_count,
    })
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '`'
}

fn is_member_char(c: char) -> bool {
    is_identifier_char(c) || c == '.' || c == '$'
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Cursor { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn error(&self, expected: &str) -> Error {
        Error::Config(format!(
            "expected {} at column {} in \"{}\"",
            expected, self.pos, self.input
        ))
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    fn eat_str(&mut self, s: &str) -> bool {
        if self.rest().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, c: char) -> Result<()> {
        if self.eat(c) {
            Ok(())
        } else {
            Err(self.error(&format!("'{c}'")))
        }
    }

    fn skip_whitespace(&mut self) -> usize {
        let start = self.pos;
        self.take_while(char::is_whitespace);
        self.pos - start
    }

    fn require_whitespace(&mut self) -> Result<()> {
        if self.skip_whitespace() == 0 {
            return Err(self.error("whitespace"));
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.skip_whitespace();
        if self.pos != self.input.len() {
            return Err(self.error("end of declaration"));
        }
        Ok(())
    }

    fn take_while(&mut self, accept: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !accept(c) {
                break;
            }
            self.pos += c.len_utf8();
        }
        &self.input[start..self.pos]
    }

    fn identifier(&mut self) -> Result<&'a str> {
        let identifier = self.take_while(is_identifier_char);
        if identifier.is_empty() {
            return Err(self.error("identifier"));
        }
        Ok(identifier)
    }

    fn member_name(&mut self) -> Result<&'a str> {
        let name = self.take_while(is_member_char);
        if name.is_empty() {
            return Err(self.error("member name"));
        }
        Ok(name)
    }

    fn number(&mut self) -> Result<u32> {
        let digits = self.take_while(|c| c.is_ascii_digit());
        digits.parse().map_err(|_| self.error("generic parameter index"))
    }

    fn parse_type(&mut self) -> Result<MType> {
        self.skip_whitespace();
        if self.eat_str("ref ") {
            let element = self.parse_type()?;
            return Ok(MType::ByRef(Box::new(element)));
        }

        let mut parsed = self.parse_core()?;
        loop {
            if self.eat_str("[]") {
                parsed = MType::SzArray(Box::new(parsed));
            } else if self.eat('*') {
                parsed = MType::Pointer(Box::new(parsed));
            } else {
                break;
            }
        }

        Ok(parsed)
    }

    fn parse_core(&mut self) -> Result<MType> {
        if self.eat_str("!!") {
            return Ok(MType::GenericMethodParameter(self.number()?));
        }
        if self.eat('!') {
            return Ok(MType::GenericTypeParameter(self.number()?));
        }

        let mut segments = vec![self.identifier()?];
        while self.rest().starts_with('.')
            && self.rest()[1..].starts_with(is_identifier_char)
        {
            self.pos += 1;
            segments.push(self.identifier()?);
        }

        if !matches!(self.peek(), Some('/' | '<')) {
            if let Some(primitive) = primitive(&segments) {
                return Ok(MType::Primitive(primitive));
            }
        }

        let (name, namespace) = match segments.split_last() {
            Some((name, [])) => (*name, None),
            Some((name, namespace)) => (*name, Some(namespace.join("."))),
            None => return Err(self.error("type name")),
        };
        let mut parsed = MType::Parsed {
            namespace,
            name: name.to_string(),
            nested_parent: None,
        };

        while self.eat('/') {
            let nested = self.identifier()?;
            parsed = MType::Parsed {
                namespace: None,
                name: nested.to_string(),
                nested_parent: Some(Box::new(parsed)),
            };
        }

        if self.eat('<') {
            let mut arguments = Vec::new();
            loop {
                arguments.push(self.parse_type()?);
                self.skip_whitespace();
                if self.eat(',') {
                    continue;
                }
                self.expect('>')?;
                break;
            }
            parsed = MType::Generic {
                definition: Box::new(parsed),
                arguments,
            };
        }

        Ok(parsed)
    }
}

/// `int`, `Int32` and `System.Int32` all name the same primitive
fn primitive(segments: &[&str]) -> Option<PrimitiveType> {
    match segments {
        [name] => PrimitiveType::from_keyword(name).or_else(|| PrimitiveType::from_str(name).ok()),
        ["System", name] => PrimitiveType::from_str(name).ok(),
        _ => None,
    }
}
