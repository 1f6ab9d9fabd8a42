use crate::{
    file::io::{read_le_at, read_le_at_dyn},
    metadata::{
        tables::{RowReadable, TableId, TableInfo},
        token::Token,
    },
    Result,
};

/// A row of the `ClassLayout` table (ECMA-335 II.22.8).
#[derive(Clone, Debug)]
pub struct ClassLayoutRaw {
    /// Row id
    pub rid: u32,
    /// Token of this row
    pub token: Token,
    /// Field alignment
    pub packing_size: u16,
    /// Declared instance size
    pub class_size: u32,
    /// `TypeDef` row this layout applies to
    pub parent: u32,
}

impl RowReadable for ClassLayoutRaw {
    const TABLE_ID: TableId = TableId::ClassLayout;

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfo) -> Result<Self> {
        Ok(ClassLayoutRaw {
            rid,
            token: Token::new(0x0F00_0000 + rid),
            packing_size: read_le_at::<u16>(data, offset)?,
            class_size: read_le_at::<u32>(data, offset)?,
            parent: read_le_at_dyn(data, offset, sizes.is_large(TableId::TypeDef))?,
        })
    }
}
