//! References to fields and methods of other assemblies.

use std::fmt;

use crate::{metadata::token::Token, sandbox::types::MType};

/// A field or method of another assembly, as referenced through a `MemberRef` row.
#[derive(Debug, Clone, PartialEq)]
pub enum MemberRef {
    /// A field access
    Field {
        /// `MemberRef` row the reference came from
        token: Token,
        /// Declaring type
        parent: MType,
        /// Field name
        name: String,
        /// Declared type of the field
        field_type: MType,
    },
    /// A method call, including constructors
    Method {
        /// `MemberRef` row the reference came from
        token: Token,
        /// Declaring type
        parent: MType,
        /// Method name
        name: String,
        /// Return type
        return_type: MType,
        /// Parameter types, in order
        parameter_types: Vec<MType>,
        /// Number of generic parameters of the method itself
        generic_parameter_count: u32,
    },
}

impl MemberRef {
    /// The declaring type
    #[must_use]
    pub fn parent(&self) -> &MType {
        match self {
            MemberRef::Field { parent, .. } | MemberRef::Method { parent, .. } => parent,
        }
    }

    /// The member name
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            MemberRef::Field { name, .. } | MemberRef::Method { name, .. } => name,
        }
    }

    /// The `MemberRef` token
    #[must_use]
    pub fn token(&self) -> Token {
        match self {
            MemberRef::Field { token, .. } | MemberRef::Method { token, .. } => *token,
        }
    }
}

impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemberRef::Field {
                parent,
                name,
                field_type,
                ..
            } => write!(f, "{parent}.{name} Returns {field_type}"),
            MemberRef::Method {
                parent,
                name,
                return_type,
                parameter_types,
                generic_parameter_count,
                ..
            } => {
                write!(f, "{parent}.{name}")?;
                if *generic_parameter_count > 0 {
                    write!(f, "<{generic_parameter_count}>")?;
                }
                write!(f, "(")?;
                for (index, parameter) in parameter_types.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{parameter}")?;
                }
                write!(f, ") Returns {return_type}")
            }
        }
    }
}
