use bitflags::bitflags;

use crate::{
    file::io::{read_le_at, read_le_at_dyn},
    metadata::{
        tables::{CodedIndex, CodedIndexType, RowReadable, TableId, TableInfo},
        token::Token,
    },
    Result,
};

bitflags! {
    /// `TypeAttributes` (ECMA-335 II.23.1.15), the subset the sandbox inspects.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct TypeAttributes: u32 {
        /// Visibility mask
        const VISIBILITY_MASK = 0x0000_0007;
        /// Nested visibility values start here
        const NESTED_PUBLIC = 0x0000_0002;
        /// Layout mask
        const LAYOUT_MASK = 0x0000_0018;
        /// Fields are laid out sequentially
        const SEQUENTIAL_LAYOUT = 0x0000_0008;
        /// Field offsets are given explicitly
        const EXPLICIT_LAYOUT = 0x0000_0010;
        /// Type is an interface
        const INTERFACE = 0x0000_0020;
        /// Type is abstract
        const ABSTRACT = 0x0000_0080;
        /// Type is sealed
        const SEALED = 0x0000_0100;
    }
}

/// A row of the `TypeDef` table (ECMA-335 II.22.37).
#[derive(Clone, Debug)]
pub struct TypeDefRaw {
    /// Row id
    pub rid: u32,
    /// Token of this row
    pub token: Token,
    /// `TypeAttributes` bits
    pub flags: u32,
    /// `#Strings` index of the type name
    pub type_name: u32,
    /// `#Strings` index of the namespace, 0 for none
    pub type_namespace: u32,
    /// Base type, a nil index for interfaces and `System.Object`
    pub extends: CodedIndex,
    /// First row of this type's run in the `Field` table
    pub field_list: u32,
    /// First row of this type's run in the `MethodDef` table
    pub method_list: u32,
}

impl TypeDefRaw {
    /// Attribute bits as [`TypeAttributes`]
    #[must_use]
    pub fn attributes(&self) -> TypeAttributes {
        TypeAttributes::from_bits_retain(self.flags)
    }

    /// Returns `true` for `ExplicitLayout` types
    #[must_use]
    pub fn is_explicit_layout(&self) -> bool {
        self.flags & TypeAttributes::LAYOUT_MASK.bits() == TypeAttributes::EXPLICIT_LAYOUT.bits()
    }

    /// Returns `true` if the visibility marks the type as nested
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.flags & TypeAttributes::VISIBILITY_MASK.bits() >= TypeAttributes::NESTED_PUBLIC.bits()
    }
}

impl RowReadable for TypeDefRaw {
    const TABLE_ID: TableId = TableId::TypeDef;

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfo) -> Result<Self> {
        Ok(TypeDefRaw {
            rid,
            token: Token::new(0x0200_0000 + rid),
            flags: read_le_at::<u32>(data, offset)?,
            type_name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            type_namespace: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            extends: CodedIndex::read(data, offset, sizes, CodedIndexType::TypeDefOrRef)?,
            field_list: read_le_at_dyn(data, offset, sizes.is_large(TableId::Field))?,
            method_list: read_le_at_dyn(data, offset, sizes.is_large(TableId::MethodDef))?,
        })
    }
}
