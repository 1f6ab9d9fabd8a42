use crate::{
    file::io::read_le_at_dyn,
    metadata::{
        tables::{RowReadable, TableId, TableInfo},
        token::Token,
    },
    Result,
};

/// A row of the `TypeSpec` table (ECMA-335 II.22.39).
#[derive(Clone, Debug)]
pub struct TypeSpecRaw {
    /// Row id
    pub rid: u32,
    /// Token of this row
    pub token: Token,
    /// `#Blob` index of the type signature
    pub signature: u32,
}

impl RowReadable for TypeSpecRaw {
    const TABLE_ID: TableId = TableId::TypeSpec;

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfo) -> Result<Self> {
        Ok(TypeSpecRaw {
            rid,
            token: Token::new(0x1B00_0000 + rid),
            signature: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
        })
    }
}
