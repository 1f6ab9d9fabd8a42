use crate::{
    file::io::read_le_at_dyn,
    metadata::{
        tables::{RowReadable, TableId, TableInfo},
        token::Token,
    },
    Result,
};

/// A row of the `ModuleRef` table (ECMA-335 II.22.31).
#[derive(Clone, Debug)]
pub struct ModuleRefRaw {
    /// Row id
    pub rid: u32,
    /// Token of this row
    pub token: Token,
    /// `#Strings` index of the module name
    pub name: u32,
}

impl RowReadable for ModuleRefRaw {
    const TABLE_ID: TableId = TableId::ModuleRef;

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfo) -> Result<Self> {
        Ok(ModuleRefRaw {
            rid,
            token: Token::new(0x1A00_0000 + rid),
            name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
        })
    }
}
