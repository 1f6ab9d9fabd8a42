use crate::{
    file::io::{read_le_at, read_le_at_dyn},
    metadata::{
        tables::{RowReadable, TableId, TableInfo},
        token::Token,
    },
    Result,
};

/// A row of the `AssemblyRef` table (ECMA-335 II.22.5).
#[derive(Clone, Debug)]
pub struct AssemblyRefRaw {
    /// Row id
    pub rid: u32,
    /// Token of this row
    pub token: Token,
    /// Major version
    pub major_version: u16,
    /// Minor version
    pub minor_version: u16,
    /// Build number
    pub build_number: u16,
    /// Revision number
    pub revision_number: u16,
    /// `AssemblyFlags` bits
    pub flags: u32,
    /// `#Blob` index of the public key or token
    pub public_key_or_token: u32,
    /// `#Strings` index of the simple name
    pub name: u32,
    /// `#Strings` index of the culture
    pub culture: u32,
    /// `#Blob` index of the hash value
    pub hash_value: u32,
}

impl RowReadable for AssemblyRefRaw {
    const TABLE_ID: TableId = TableId::AssemblyRef;

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfo) -> Result<Self> {
        Ok(AssemblyRefRaw {
            rid,
            token: Token::new(0x2300_0000 + rid),
            major_version: read_le_at::<u16>(data, offset)?,
            minor_version: read_le_at::<u16>(data, offset)?,
            build_number: read_le_at::<u16>(data, offset)?,
            revision_number: read_le_at::<u16>(data, offset)?,
            flags: read_le_at::<u32>(data, offset)?,
            public_key_or_token: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
            name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            culture: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            hash_value: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tables::MetadataTable;

    #[test]
    fn crafted_short() {
        #[rustfmt::skip]
        let data = vec![
            0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // version 4.0.0.0
            0x00, 0x00, 0x00, 0x00, // flags
            0x01, 0x00, // public_key_or_token
            0x42, 0x00, // name
            0x00, 0x00, // culture
            0x00, 0x00, // hash_value
        ];

        let sizes = TableInfo::from_rows(&[(TableId::AssemblyRef, 1)], false, false, false);
        let table = MetadataTable::<AssemblyRefRaw>::new(&data, 1, &sizes);
        assert_eq!(table.row_size(), 20);

        let row = table.get(1).unwrap();
        assert_eq!(row.token.value(), 0x2300_0001);
        assert_eq!(row.major_version, 4);
        assert_eq!(row.public_key_or_token, 1);
        assert_eq!(row.name, 0x42);
    }
}
