use strum::{EnumCount, IntoEnumIterator};

use crate::{
    file::io::read_le,
    metadata::tables::{MetadataTable, RowReadable, TableId, TableInfo},
    Error::OutOfBounds,
    Result,
};

/// The header of the `#~` stream (ECMA-335 II.24.2.6) and the location of every table.
///
/// The header owns only sizes and offsets; typed views are created on demand over the
/// stream bytes with [`TablesHeader::table`].
pub struct TablesHeader {
    /// Major version of the table schema
    pub major_version: u8,
    /// Minor version of the table schema
    pub minor_version: u8,
    /// Bit vector of present tables
    pub valid: u64,
    /// Bit vector of sorted tables
    pub sorted: u64,
    /// Row counts and index widths
    pub info: TableInfo,
    offsets: Vec<usize>,
}

impl TablesHeader {
    /// Parse the tables header and compute the offset of each table.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the tables extend past `data` and
    /// [`crate::Error::NotSupported`] for tables outside the ECMA-335 schema.
    pub fn from(data: &[u8]) -> Result<TablesHeader> {
        if data.len() < 24 {
            return Err(OutOfBounds);
        }

        let valid = read_le::<u64>(&data[8..])?;
        if valid == 0 {
            return Err(malformed_error!("No valid rows in any of the tables"));
        }

        let heap_size_flags = read_le::<u8>(&data[6..])?;
        let (info, tables_offset) = TableInfo::new(data, valid, heap_size_flags)?;

        let mut offsets = vec![0_usize; TableId::COUNT];
        let mut current_offset = tables_offset as u64;
        for table_id in TableId::iter() {
            offsets[table_id as usize] = current_offset as usize;

            let rows = u64::from(info.rows(table_id));
            current_offset += rows * u64::from(info.row_size(table_id));
        }

        if current_offset > data.len() as u64 {
            return Err(OutOfBounds);
        }

        Ok(TablesHeader {
            major_version: read_le::<u8>(&data[4..])?,
            minor_version: read_le::<u8>(&data[5..])?,
            valid,
            sorted: read_le::<u64>(&data[16..])?,
            info,
            offsets,
        })
    }

    /// Number of rows in `table_id`
    #[must_use]
    pub fn rows(&self, table_id: TableId) -> u32 {
        self.info.rows(table_id)
    }

    /// A typed view of table `T` over `data`, the bytes of the `#~` stream.
    ///
    /// Returns `None` if the table is absent.
    #[must_use]
    pub fn table<'a, T: RowReadable>(&'a self, data: &'a [u8]) -> Option<MetadataTable<'a, T>> {
        let rows = self.info.rows(T::TABLE_ID);
        if rows == 0 {
            return None;
        }

        let start = self.offsets[T::TABLE_ID as usize];
        data.get(start..)
            .map(|table_data| MetadataTable::new(table_data, rows, &self.info))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::tables::{ModuleRaw, TypeDefRaw, TypeRefRaw};

    #[test]
    fn offsets() {
        #[rustfmt::skip]
        let mut data = vec![
            0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x01,
            0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00, // Module rows
            0x02, 0x00, 0x00, 0x00, // TypeDef rows
        ];
        // Module: 10 bytes
        data.extend_from_slice(&[0x00, 0x00, 0x07, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00]);
        // TypeDef: 2 x 14 bytes
        data.extend_from_slice(&[0x00; 14]);
        data.extend_from_slice(&[
            0x01, 0x00, 0x00, 0x00, 0x09, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x01, 0x00,
        ]);

        let header = TablesHeader::from(&data).unwrap();
        assert_eq!(header.major_version, 2);
        assert_eq!(header.rows(TableId::Module), 1);
        assert_eq!(header.rows(TableId::TypeDef), 2);

        let module = header.table::<ModuleRaw>(&data).unwrap();
        assert_eq!(module.get(1).unwrap().name, 7);

        let typedefs = header.table::<TypeDefRaw>(&data).unwrap();
        let second = typedefs.get(2).unwrap();
        assert_eq!(second.flags, 1);
        assert_eq!(second.type_name, 9);

        assert!(header.table::<TypeRefRaw>(&data).is_none());
    }

    #[test]
    fn truncated() {
        #[rustfmt::skip]
        let data = vec![
            0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x01,
            0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00,
            0x00, 0x00,
        ];

        assert!(matches!(TablesHeader::from(&data), Err(OutOfBounds)));
    }
}
