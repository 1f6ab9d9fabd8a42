use crate::{
    file::io::{read_le_at, read_le_at_dyn},
    metadata::{
        tables::{RowReadable, TableId, TableInfo},
        token::Token,
    },
    Result,
};

/// A row of the `Module` table (ECMA-335 II.22.30). There is exactly one per image.
#[derive(Clone, Debug)]
pub struct ModuleRaw {
    /// Row id
    pub rid: u32,
    /// Token of this row
    pub token: Token,
    /// Reserved, zero
    pub generation: u32,
    /// `#Strings` index of the module name
    pub name: u32,
    /// `#GUID` index of the module version id
    pub mvid: u32,
}

impl RowReadable for ModuleRaw {
    const TABLE_ID: TableId = TableId::Module;

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfo) -> Result<Self> {
        let generation = u32::from(read_le_at::<u16>(data, offset)?);
        let name = read_le_at_dyn(data, offset, sizes.is_large_str())?;
        let mvid = read_le_at_dyn(data, offset, sizes.is_large_guid())?;

        // EncId, EncBaseId
        read_le_at_dyn(data, offset, sizes.is_large_guid())?;
        read_le_at_dyn(data, offset, sizes.is_large_guid())?;

        Ok(ModuleRaw {
            rid,
            token: Token::new(rid),
            generation,
            name,
            mvid,
        })
    }
}
