use crate::{
    file::io::read_le_at_dyn,
    metadata::{
        tables::{RowReadable, TableId, TableInfo},
        token::Token,
    },
    Result,
};

/// A row of the `NestedClass` table (ECMA-335 II.22.32).
#[derive(Clone, Debug)]
pub struct NestedClassRaw {
    /// Row id
    pub rid: u32,
    /// Token of this row
    pub token: Token,
    /// `TypeDef` row of the nested type
    pub nested_class: u32,
    /// `TypeDef` row of the enclosing type
    pub enclosing_class: u32,
}

impl RowReadable for NestedClassRaw {
    const TABLE_ID: TableId = TableId::NestedClass;

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfo) -> Result<Self> {
        Ok(NestedClassRaw {
            rid,
            token: Token::new(0x2900_0000 + rid),
            nested_class: read_le_at_dyn(data, offset, sizes.is_large(TableId::TypeDef))?,
            enclosing_class: read_le_at_dyn(data, offset, sizes.is_large(TableId::TypeDef))?,
        })
    }
}
