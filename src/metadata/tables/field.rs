use bitflags::bitflags;

use crate::{
    file::io::{read_le_at, read_le_at_dyn},
    metadata::{
        tables::{RowReadable, TableId, TableInfo},
        token::Token,
    },
    Result,
};

bitflags! {
    /// `FieldAttributes` (ECMA-335 II.23.1.5), the subset the sandbox inspects.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct FieldAttributes: u16 {
        /// Field is static
        const STATIC = 0x0010;
        /// Field is initialized from an RVA
        const HAS_FIELD_RVA = 0x0100;
    }
}

/// A row of the `Field` table (ECMA-335 II.22.15).
#[derive(Clone, Debug)]
pub struct FieldRaw {
    /// Row id
    pub rid: u32,
    /// Token of this row
    pub token: Token,
    /// `FieldAttributes` bits
    pub flags: u16,
    /// `#Strings` index of the field name
    pub name: u32,
    /// `#Blob` index of the field signature
    pub signature: u32,
}

impl RowReadable for FieldRaw {
    const TABLE_ID: TableId = TableId::Field;

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfo) -> Result<Self> {
        Ok(FieldRaw {
            rid,
            token: Token::new(0x0400_0000 + rid),
            flags: read_le_at::<u16>(data, offset)?,
            name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            signature: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
        })
    }
}
