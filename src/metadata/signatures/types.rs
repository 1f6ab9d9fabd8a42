use strum::{Display, EnumIter, EnumString};

#[allow(non_snake_case, dead_code, missing_docs)]
/// Possible bytes that represent various 'Types' for a signature - from coreclr
pub mod ELEMENT_TYPE {
    //Marks end of a list
    pub const END: u8 = 0x00;
    pub const VOID: u8 = 0x01;
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0a;
    pub const U8: u8 = 0x0b;
    pub const R4: u8 = 0x0c;
    pub const R8: u8 = 0x0d;
    pub const STRING: u8 = 0x0e;
    // Followed by type
    pub const PTR: u8 = 0x0f;
    // Followed by type
    pub const BYREF: u8 = 0x10;
    // Followed by TypeDef or TypeRef token
    pub const VALUETYPE: u8 = 0x11;
    // Followed by TypeDef or TypeRef token
    pub const CLASS: u8 = 0x12;
    // Generic parameter in a generic type definition, represented as number
    pub const VAR: u8 = 0x13;
    // type rank boundsCount bound1 … loCount lo1 …
    pub const ARRAY: u8 = 0x14;
    // Generic type instantiation. Followed by type type-arg-count type-1 ... type-n
    pub const GENERICINST: u8 = 0x15;
    pub const TYPEDBYREF: u8 = 0x16;
    // System.IntPtr
    pub const I: u8 = 0x18;
    // System.UIntPtr
    pub const U: u8 = 0x19;
    // Followed by full method signature
    pub const FNPTR: u8 = 0x1b;
    // System.Object
    pub const OBJECT: u8 = 0x1c;
    // Single-dim array with 0 lower bound
    pub const SZARRAY: u8 = 0x1d;
    // Generic parameter in a generic method definition,represented as number
    pub const MVAR: u8 = 0x1e;
    // Required modifier : followed by a TypeDef or TypeRef token
    pub const CMOD_REQD: u8 = 0x1f;
    // Optional modifier : followed by a TypeDef or TypeRef token
    pub const CMOD_OPT: u8 = 0x20;
    // Implemented within the CLI
    pub const INTERNAL: u8 = 0x21;
    // Or’d with following element types
    pub const MODIFIER: u8 = 0x40;
    // Sentinel for vararg method signature
    pub const SENTINEL: u8 = 0x41;
    // Denotes a local variable that points at a pinned object
    pub const PINNED: u8 = 0x45;
}

/// The built-in types that signatures encode with a single element type byte.
///
/// `Display` produces the CLR name (`Int32`, `String`, ...), which is also the form accepted by
/// `FromStr`. The C# keyword spellings are handled by [`PrimitiveType::from_keyword`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
#[allow(missing_docs)]
pub enum PrimitiveType {
    Void,
    Boolean,
    Char,
    SByte,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Single,
    Double,
    String,
    TypedReference,
    IntPtr,
    UIntPtr,
    Object,
}

impl PrimitiveType {
    /// Map an element type byte to its primitive, if it is one
    #[must_use]
    pub fn from_element_type(element_type: u8) -> Option<PrimitiveType> {
        let primitive = match element_type {
            ELEMENT_TYPE::VOID => PrimitiveType::Void,
            ELEMENT_TYPE::BOOLEAN => PrimitiveType::Boolean,
            ELEMENT_TYPE::CHAR => PrimitiveType::Char,
            ELEMENT_TYPE::I1 => PrimitiveType::SByte,
            ELEMENT_TYPE::U1 => PrimitiveType::Byte,
            ELEMENT_TYPE::I2 => PrimitiveType::Int16,
            ELEMENT_TYPE::U2 => PrimitiveType::UInt16,
            ELEMENT_TYPE::I4 => PrimitiveType::Int32,
            ELEMENT_TYPE::U4 => PrimitiveType::UInt32,
            ELEMENT_TYPE::I8 => PrimitiveType::Int64,
            ELEMENT_TYPE::U8 => PrimitiveType::UInt64,
            ELEMENT_TYPE::R4 => PrimitiveType::Single,
            ELEMENT_TYPE::R8 => PrimitiveType::Double,
            ELEMENT_TYPE::STRING => PrimitiveType::String,
            ELEMENT_TYPE::TYPEDBYREF => PrimitiveType::TypedReference,
            ELEMENT_TYPE::I => PrimitiveType::IntPtr,
            ELEMENT_TYPE::U => PrimitiveType::UIntPtr,
            ELEMENT_TYPE::OBJECT => PrimitiveType::Object,
            _ => return None,
        };

        Some(primitive)
    }

    /// Map a C# keyword (`int`, `string`, `nint`, ...) to its primitive
    #[must_use]
    pub fn from_keyword(keyword: &str) -> Option<PrimitiveType> {
        let primitive = match keyword {
            "void" => PrimitiveType::Void,
            "bool" => PrimitiveType::Boolean,
            "char" => PrimitiveType::Char,
            "sbyte" => PrimitiveType::SByte,
            "byte" => PrimitiveType::Byte,
            "short" => PrimitiveType::Int16,
            "ushort" => PrimitiveType::UInt16,
            "int" => PrimitiveType::Int32,
            "uint" => PrimitiveType::UInt32,
            "long" => PrimitiveType::Int64,
            "ulong" => PrimitiveType::UInt64,
            "float" => PrimitiveType::Single,
            "double" => PrimitiveType::Double,
            "string" => PrimitiveType::String,
            "object" => PrimitiveType::Object,
            "nint" => PrimitiveType::IntPtr,
            "nuint" => PrimitiveType::UIntPtr,
            _ => return None,
        };

        Some(primitive)
    }
}

/// The leading byte of a signature blob (II.23.2.1 and II.23.2.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureHeader(pub u8);

impl SignatureHeader {
    /// Field signature
    pub const FIELD: u8 = 0x06;
    /// Local variable signature
    pub const LOCAL_SIG: u8 = 0x07;
    /// Property signature
    pub const PROPERTY: u8 = 0x08;
    /// Generic method, followed by the generic parameter count
    pub const GENERIC: u8 = 0x10;
    /// Instance method
    pub const HAS_THIS: u8 = 0x20;
    /// The `this` pointer is the first explicit parameter
    pub const EXPLICIT_THIS: u8 = 0x40;
    /// `vararg` calling convention
    pub const VARARG: u8 = 0x05;

    /// The calling convention or signature kind in the low nibble
    #[must_use]
    pub fn kind(&self) -> u8 {
        self.0 & 0x0F
    }

    /// Is this a field signature
    #[must_use]
    pub fn is_field(&self) -> bool {
        self.0 == Self::FIELD
    }

    /// Is this a method signature (any calling convention)
    #[must_use]
    pub fn is_method(&self) -> bool {
        self.kind() <= Self::VARARG
    }

    /// Does the method declare generic parameters
    #[must_use]
    pub fn is_generic(&self) -> bool {
        self.0 & Self::GENERIC != 0
    }

    /// Is the method an instance method
    #[must_use]
    pub fn has_this(&self) -> bool {
        self.0 & Self::HAS_THIS != 0
    }

    /// Is `this` passed explicitly
    #[must_use]
    pub fn explicit_this(&self) -> bool {
        self.0 & Self::EXPLICIT_THIS != 0
    }

    /// Does the method use the `vararg` convention
    #[must_use]
    pub fn is_vararg(&self) -> bool {
        self.kind() == Self::VARARG
    }
}

/// The shape of a general array (II.23.2.13)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArrayShape {
    /// Number of dimensions
    pub rank: u32,
    /// Sizes of the leading dimensions
    pub sizes: Vec<u32>,
    /// Lower bounds of the leading dimensions, as encoded
    pub lower_bounds: Vec<u32>,
}

/// A decoded method signature, generic over the type representation produced by a
/// [`crate::metadata::signatures::TypeProvider`]
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSignature<T> {
    /// The header byte
    pub header: SignatureHeader,
    /// The return type
    pub return_type: T,
    /// Number of parameters before the vararg sentinel, or all of them
    pub required_parameter_count: usize,
    /// Number of generic parameters (0 if the method is not generic)
    pub generic_parameter_count: u32,
    /// All parameter types, including the ones after a vararg sentinel
    pub parameter_types: Vec<T>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn primitive_names() {
        assert_eq!(PrimitiveType::Int32.to_string(), "Int32");
        assert_eq!(PrimitiveType::from_str("UIntPtr").unwrap(), PrimitiveType::UIntPtr);
        assert_eq!(PrimitiveType::from_keyword("int"), Some(PrimitiveType::Int32));
        assert_eq!(PrimitiveType::from_keyword("Int32"), None);
        assert_eq!(
            PrimitiveType::from_element_type(ELEMENT_TYPE::STRING),
            Some(PrimitiveType::String)
        );
        assert_eq!(PrimitiveType::from_element_type(ELEMENT_TYPE::CLASS), None);
    }

    #[test]
    fn header() {
        let header = SignatureHeader(0x30);
        assert!(header.is_method());
        assert!(header.is_generic());
        assert!(header.has_this());
        assert!(!header.is_vararg());

        assert!(SignatureHeader(0x05).is_vararg());
        assert!(SignatureHeader(0x06).is_field());
        assert!(!SignatureHeader(0x06).is_method());
    }
}
