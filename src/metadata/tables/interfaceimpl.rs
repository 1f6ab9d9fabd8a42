use crate::{
    file::io::read_le_at_dyn,
    metadata::{
        tables::{CodedIndex, CodedIndexType, RowReadable, TableId, TableInfo},
        token::Token,
    },
    Result,
};

/// A row of the `InterfaceImpl` table (ECMA-335 II.22.23).
#[derive(Clone, Debug)]
pub struct InterfaceImplRaw {
    /// Row id
    pub rid: u32,
    /// Token of this row
    pub token: Token,
    /// `TypeDef` row of the implementing type
    pub class: u32,
    /// The implemented interface
    pub interface: CodedIndex,
}

impl RowReadable for InterfaceImplRaw {
    const TABLE_ID: TableId = TableId::InterfaceImpl;

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfo) -> Result<Self> {
        Ok(InterfaceImplRaw {
            rid,
            token: Token::new(0x0900_0000 + rid),
            class: read_le_at_dyn(data, offset, sizes.is_large(TableId::TypeDef))?,
            interface: CodedIndex::read(data, offset, sizes, CodedIndexType::TypeDefOrRef)?,
        })
    }
}
