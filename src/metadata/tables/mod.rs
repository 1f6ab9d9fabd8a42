//! Typed access to the rows of the `#~` stream (ECMA-335 II.22).
//!
//! Row layouts depend on the size of every heap and every table in the image, so the
//! [`TableInfo`] computed from the tables header is threaded through every row read. Only the
//! tables the sandbox inspects have typed readers; the remaining tables are still sized so
//! that the offsets of later tables come out right.

mod codedindex;
mod table;
mod tableinfo;

mod assembly;
mod assemblyref;
mod classlayout;
mod field;
mod interfaceimpl;
mod memberref;
mod methoddef;
mod module;
mod moduleref;
mod nestedclass;
mod typedef;
mod typeref;
mod typespec;

pub use codedindex::{CodedIndex, CodedIndexType};
pub use table::{MetadataTable, RowReadable, TableIterator};
pub use tableinfo::{TableInfo, TableRowInfo};

pub use assembly::AssemblyRaw;
pub use assemblyref::AssemblyRefRaw;
pub use classlayout::ClassLayoutRaw;
pub use field::{FieldAttributes, FieldRaw};
pub use interfaceimpl::InterfaceImplRaw;
pub use memberref::MemberRefRaw;
pub use methoddef::{MethodAttributes, MethodDefRaw, MethodImplAttributes};
pub use module::ModuleRaw;
pub use moduleref::ModuleRefRaw;
pub use nestedclass::NestedClassRaw;
pub use typedef::{TypeAttributes, TypeDefRaw};
pub use typeref::TypeRefRaw;
pub use typespec::TypeSpecRaw;

use strum::{EnumCount, EnumIter};

/// Identifiers of the ECMA-335 metadata tables, valued by their table number.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash, PartialOrd, Ord, EnumIter, EnumCount)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum TableId {
    Module = 0x00,
    TypeRef = 0x01,
    TypeDef = 0x02,
    FieldPtr = 0x03,
    Field = 0x04,
    MethodPtr = 0x05,
    MethodDef = 0x06,
    ParamPtr = 0x07,
    Param = 0x08,
    InterfaceImpl = 0x09,
    MemberRef = 0x0A,
    Constant = 0x0B,
    CustomAttribute = 0x0C,
    FieldMarshal = 0x0D,
    DeclSecurity = 0x0E,
    ClassLayout = 0x0F,
    FieldLayout = 0x10,
    StandAloneSig = 0x11,
    EventMap = 0x12,
    EventPtr = 0x13,
    Event = 0x14,
    PropertyMap = 0x15,
    PropertyPtr = 0x16,
    Property = 0x17,
    MethodSemantics = 0x18,
    MethodImpl = 0x19,
    ModuleRef = 0x1A,
    TypeSpec = 0x1B,
    ImplMap = 0x1C,
    FieldRVA = 0x1D,
    EncLog = 0x1E,
    EncMap = 0x1F,
    Assembly = 0x20,
    AssemblyProcessor = 0x21,
    AssemblyOS = 0x22,
    AssemblyRef = 0x23,
    AssemblyRefProcessor = 0x24,
    AssemblyRefOS = 0x25,
    File = 0x26,
    ExportedType = 0x27,
    ManifestResource = 0x28,
    NestedClass = 0x29,
    GenericParam = 0x2A,
    MethodSpec = 0x2B,
    GenericParamConstraint = 0x2C,
}

impl TableId {
    /// Look up a table by its number. Portable PDB tables (0x30 and up) are not modelled.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<TableId> {
        use strum::IntoEnumIterator;

        if usize::from(value) >= TableId::COUNT {
            return None;
        }

        TableId::iter().nth(usize::from(value))
    }

    /// The high byte of tokens that point into this table
    #[must_use]
    pub fn token_prefix(self) -> u32 {
        (self as u32) << 24
    }
}
