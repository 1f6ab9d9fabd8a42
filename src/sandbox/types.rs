//! The type model: resolution scopes, referenced types and [`MType`].
//!
//! Types seen in the scanned assembly and types named by the whitelist share one representation,
//! so matching a reference against a whitelist entry is a structural comparison.

use std::fmt;

use crate::metadata::signatures::{MethodSignature, PrimitiveType};

/// Where a referenced type is resolved: another assembly, or an enclosing referenced type.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionScope {
    /// Top-level type in the named assembly
    Assembly(String),
    /// Nested type; the enclosing type is resolved recursively
    Type(Box<MType>),
}

impl fmt::Display for ResolutionScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionScope::Assembly(name) => write!(f, "[{name}]"),
            ResolutionScope::Type(parent) => write!(f, "{parent}/"),
        }
    }
}

/// A type defined outside the scanned assembly, the only subject of an access decision.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeReference {
    /// Resolution scope with the full enclosing chain
    pub scope: ResolutionScope,
    /// Simple name, including a generic arity suffix such as ``List`1``
    pub name: String,
    /// Namespace; `None` for nested types and types in the global namespace
    pub namespace: Option<String>,
}

impl TypeReference {
    /// A top-level type in `assembly`
    #[must_use]
    pub fn in_assembly(assembly: &str, namespace: Option<&str>, name: &str) -> Self {
        TypeReference {
            scope: ResolutionScope::Assembly(assembly.to_string()),
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
        }
    }

    /// A type nested inside `parent`
    #[must_use]
    pub fn nested(parent: TypeReference, name: &str) -> Self {
        TypeReference {
            scope: ResolutionScope::Type(Box::new(MType::Referenced(parent))),
            name: name.to_string(),
            namespace: None,
        }
    }

    /// `"{namespace}.{name}"` without the assembly; nested types are prefixed with their
    /// enclosing type and a `/`
    #[must_use]
    pub fn whitelist_to_string(&self) -> String {
        match &self.scope {
            ResolutionScope::Type(parent) => format!(
                "{}/{}",
                parent.whitelist_to_string(),
                qualified(self.namespace.as_deref(), &self.name)
            ),
            ResolutionScope::Assembly(_) => qualified(self.namespace.as_deref(), &self.name),
        }
    }
}

impl fmt::Display for TypeReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{}{}.{}", self.scope, namespace, self.name),
            None => write!(f, "{}{}", self.scope, self.name),
        }
    }
}

/// The type model shared by the scanners and the whitelist.
///
/// Values are built from signatures and tables while walking one assembly, or from the
/// whitelist strings of a [`crate::SandboxConfig`] (only [`MType::Parsed`] and the shapes
/// wrapping it). Every consumer matches on it exhaustively.
#[derive(Debug, Clone, PartialEq)]
pub enum MType {
    /// A built-in type
    Primitive(PrimitiveType),
    /// A type declared inside the scanned assembly
    Defined {
        /// Simple name
        name: String,
        /// Namespace, `None` when empty
        namespace: Option<String>,
        /// Enclosing type for nested definitions
        enclosing: Option<Box<MType>>,
    },
    /// A type declared in another assembly
    Referenced(TypeReference),
    /// An instantiated generic type
    Generic {
        /// The open generic type
        definition: Box<MType>,
        /// Type arguments, in order
        arguments: Vec<MType>,
    },
    /// A type carrying a `modreq` / `modopt`; transparent to policy
    Modified {
        /// The type being modified
        underlying: Box<MType>,
        /// The modifier type
        modifier: Box<MType>,
        /// `modreq` when set, `modopt` otherwise
        required: bool,
    },
    /// A multi-dimensional or non-zero-based array
    IrregularArray {
        /// Element type
        element: Box<MType>,
        /// Number of dimensions
        rank: u32,
    },
    /// A single-dimensional, zero-based array
    SzArray(Box<MType>),
    /// An unmanaged pointer
    Pointer(Box<MType>),
    /// A managed reference
    ByRef(Box<MType>),
    /// `!index`, a parameter of the enclosing generic type
    GenericTypeParameter(u32),
    /// `!!index`, a parameter of the generic method
    GenericMethodParameter(u32),
    /// A function pointer
    FunctionPointer(Box<MethodSignature<MType>>),
    /// A type named in a whitelist entry; never the subject of an access check
    Parsed {
        /// Namespace, `None` for nested or global types
        namespace: Option<String>,
        /// Simple name
        name: String,
        /// Enclosing type when the entry names a nested type
        nested_parent: Option<Box<MType>>,
    },
}

impl MType {
    /// Structural comparison between a type seen in the assembly and a whitelist type.
    ///
    /// Modifiers are ignored on both sides. Referenced types match parsed types by name,
    /// namespace and nesting; types declared in the scanned assembly never match.
    #[must_use]
    pub fn whitelist_equals(&self, other: &MType) -> bool {
        match (self, other) {
            (MType::Modified { underlying, .. }, _) => underlying.whitelist_equals(other),
            (_, MType::Modified { underlying, .. }) => self.whitelist_equals(underlying),

            (MType::Referenced(reference), MType::Parsed { .. }) => {
                parsed_matches(other, reference)
            }
            (MType::Parsed { .. }, MType::Referenced(reference)) => {
                parsed_matches(self, reference)
            }
            (MType::Referenced(left), MType::Referenced(right)) => {
                left.name == right.name
                    && left.namespace == right.namespace
                    && left.scope == right.scope
            }
            (
                MType::Parsed {
                    namespace: left_ns,
                    name: left_name,
                    nested_parent: left_parent,
                },
                MType::Parsed {
                    namespace: right_ns,
                    name: right_name,
                    nested_parent: right_parent,
                },
            ) => {
                left_ns == right_ns
                    && left_name == right_name
                    && match (left_parent, right_parent) {
                        (Some(left), Some(right)) => left.whitelist_equals(right),
                        (None, None) => true,
                        _ => false,
                    }
            }

            (MType::Primitive(left), MType::Primitive(right)) => left == right,
            (MType::SzArray(left), MType::SzArray(right))
            | (MType::Pointer(left), MType::Pointer(right))
            | (MType::ByRef(left), MType::ByRef(right)) => left.whitelist_equals(right),
            (MType::GenericTypeParameter(left), MType::GenericTypeParameter(right))
            | (MType::GenericMethodParameter(left), MType::GenericMethodParameter(right)) => {
                left == right
            }
            (
                MType::Generic {
                    definition: left_def,
                    arguments: left_args,
                },
                MType::Generic {
                    definition: right_def,
                    arguments: right_args,
                },
            ) => {
                left_def.whitelist_equals(right_def)
                    && left_args.len() == right_args.len()
                    && left_args
                        .iter()
                        .zip(right_args)
                        .all(|(left, right)| left.whitelist_equals(right))
            }

            _ => false,
        }
    }

    /// The type as a whitelist entry would spell it: no assembly scopes and no modifiers, at any
    /// depth.
    #[must_use]
    pub fn whitelist_to_string(&self) -> String {
        match self {
            MType::Primitive(primitive) => primitive.to_string(),
            MType::Modified { underlying, .. } => underlying.whitelist_to_string(),
            MType::Referenced(reference) => reference.whitelist_to_string(),
            MType::Defined {
                enclosing: Some(enclosing),
                name,
                ..
            } => format!("{}/{name}", enclosing.whitelist_to_string()),
            MType::Defined {
                namespace, name, ..
            } => qualified(namespace.as_deref(), name),
            MType::Generic {
                definition,
                arguments,
            } => format!(
                "{}<{}>",
                definition.whitelist_to_string(),
                whitelist_list(arguments)
            ),
            MType::IrregularArray { element, rank } => format!(
                "{}[{}]",
                element.whitelist_to_string(),
                ",".repeat(rank.saturating_sub(1) as usize)
            ),
            MType::SzArray(element) => format!("{}[]", element.whitelist_to_string()),
            MType::Pointer(element) => format!("{}*", element.whitelist_to_string()),
            MType::ByRef(element) => format!("ref {}", element.whitelist_to_string()),
            MType::GenericTypeParameter(index) => format!("!{index}"),
            MType::GenericMethodParameter(index) => format!("!!{index}"),
            MType::FunctionPointer(signature) => format!(
                "method {} *({})",
                signature.return_type.whitelist_to_string(),
                whitelist_list(&signature.parameter_types)
            ),
            MType::Parsed {
                namespace,
                name,
                nested_parent: Some(parent),
            } => format!(
                "{}/{}",
                parent.whitelist_to_string(),
                qualified(namespace.as_deref(), name)
            ),
            MType::Parsed {
                namespace, name, ..
            } => qualified(namespace.as_deref(), name),
        }
    }
}

fn whitelist_list(types: &[MType]) -> String {
    types
        .iter()
        .map(MType::whitelist_to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn parsed_matches(parsed: &MType, reference: &TypeReference) -> bool {
    let MType::Parsed {
        namespace,
        name,
        nested_parent,
    } = parsed
    else {
        return false;
    };

    if reference.name != *name || reference.namespace != *namespace {
        return false;
    }

    match (&reference.scope, nested_parent) {
        (ResolutionScope::Type(parent), Some(expected)) => parent.whitelist_equals(expected),
        (ResolutionScope::Assembly(_), None) => true,
        _ => false,
    }
}

fn qualified(namespace: Option<&str>, name: &str) -> String {
    match namespace {
        Some(namespace) => format!("{namespace}.{name}"),
        None => name.to_string(),
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, types: &[MType]) -> fmt::Result {
    for (index, item) in types.iter().enumerate() {
        if index > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for MType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MType::Primitive(primitive) => write!(f, "{primitive}"),
            MType::Defined {
                name,
                namespace,
                enclosing,
            } => match enclosing {
                Some(enclosing) => write!(f, "{enclosing}/{name}"),
                None => write!(f, "{}", qualified(namespace.as_deref(), name)),
            },
            MType::Referenced(reference) => write!(f, "{reference}"),
            MType::Generic {
                definition,
                arguments,
            } => {
                write!(f, "{definition}<")?;
                write_list(f, arguments)?;
                write!(f, ">")
            }
            MType::Modified {
                underlying,
                modifier,
                required,
            } => {
                let kind = if *required { "modreq" } else { "modopt" };
                write!(f, "{underlying} {kind}({modifier})")
            }
            MType::IrregularArray { element, rank } => {
                let commas = ",".repeat(rank.saturating_sub(1) as usize);
                write!(f, "{element}[{commas}]")
            }
            MType::SzArray(element) => write!(f, "{element}[]"),
            MType::Pointer(element) => write!(f, "{element}*"),
            MType::ByRef(element) => write!(f, "ref {element}"),
            MType::GenericTypeParameter(index) => write!(f, "!{index}"),
            MType::GenericMethodParameter(index) => write!(f, "!!{index}"),
            MType::FunctionPointer(signature) => {
                write!(f, "method {} *(", signature.return_type)?;
                write_list(f, &signature.parameter_types)?;
                write!(f, ")")
            }
            MType::Parsed {
                namespace,
                name,
                nested_parent,
            } => match nested_parent {
                Some(parent) => write!(f, "{parent}/{name}"),
                None => write!(f, "{}", qualified(namespace.as_deref(), name)),
            },
        }
    }
}
