//! Metadata tokens: a table id in the high byte and a 1-based row in the low 24 bits.

use std::fmt;

/// A metadata token such as `0x0A000012` (MemberRef row 18).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Token(pub u32);

impl Token {
    /// Wrap a raw token value
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Build a token from a table id and a row
    #[must_use]
    pub fn from_parts(table: u8, row: u32) -> Self {
        Token((u32::from(table) << 24) | (row & 0x00FF_FFFF))
    }

    /// The raw value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// The table id (high byte)
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// The 1-based row (low 24 bits)
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns `true` for a token with row 0
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.row() == 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parts() {
        let token = Token::new(0x0A00_0012);
        assert_eq!(token.table(), 0x0A);
        assert_eq!(token.row(), 0x12);
        assert_eq!(Token::from_parts(0x0A, 0x12), token);
        assert_eq!(token.to_string(), "0x0a000012");
    }

    #[test]
    fn null() {
        assert!(Token::new(0).is_null());
        assert!(Token::from_parts(0x01, 0).is_null());
        assert!(!Token::new(0x0100_0001).is_null());
    }
}
