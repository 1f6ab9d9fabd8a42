use strum::{EnumCount, IntoEnumIterator};

use crate::{
    file::io::read_le_at,
    metadata::tables::{CodedIndexType, TableId},
    Error::{NotSupported, OutOfBounds},
    Result,
};

/// Row count of a single table and the width of an index into it.
#[derive(Clone, Copy, Default, PartialEq, Debug)]
pub struct TableRowInfo {
    /// Number of rows
    pub rows: u32,
    /// Bits needed to address every row
    pub bits: u8,
    /// Whether a simple index into this table takes 4 bytes
    pub is_large: bool,
}

impl TableRowInfo {
    /// Size information for a table with `rows` rows
    #[must_use]
    pub fn new(rows: u32) -> Self {
        let bits = if rows == 0 {
            1
        } else {
            (32 - rows.leading_zeros()) as u8
        };

        Self {
            rows,
            bits,
            is_large: bits > 16,
        }
    }
}

/// Everything needed to compute row layouts: per-table row counts and heap index widths.
#[derive(Clone, Default, Debug)]
pub struct TableInfo {
    rows: Vec<TableRowInfo>,
    coded_indexes: Vec<u8>,
    is_large_index_str: bool,
    is_large_index_guid: bool,
    is_large_index_blob: bool,
}

impl TableInfo {
    /// Read the row counts that follow the fixed part of the tables header.
    ///
    /// `data` starts at the tables header. On success the returned offset points at the
    /// first byte of the first table.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] if a table outside `0x00..=0x2C` is present
    /// and [`crate::Error::OutOfBounds`] on truncated input.
    pub fn new(data: &[u8], valid_bitvec: u64, heap_size_flags: u8) -> Result<(Self, usize)> {
        let mut rows = vec![TableRowInfo::default(); TableId::COUNT];
        let mut next_row_offset = 24;

        for bit in 0..64_u8 {
            if valid_bitvec & (1_u64 << bit) == 0 {
                continue;
            }

            let Some(table_id) = TableId::from_u8(bit) else {
                return Err(NotSupported);
            };

            let row_count = read_le_at::<u32>(data, &mut next_row_offset)?;
            rows[table_id as usize] = TableRowInfo::new(row_count);
        }

        // Extra data flag: a 4 byte field follows the row counts
        if heap_size_flags & 0x40 != 0 {
            next_row_offset += 4;
        }

        if next_row_offset > data.len() {
            return Err(OutOfBounds);
        }

        let mut table_info = TableInfo {
            rows,
            coded_indexes: vec![0; CodedIndexType::COUNT],
            is_large_index_str: heap_size_flags & 1 == 1,
            is_large_index_guid: heap_size_flags & 2 == 2,
            is_large_index_blob: heap_size_flags & 4 == 4,
        };
        table_info.calculate_coded_index_bits();

        Ok((table_info, next_row_offset))
    }

    /// Build size information directly from row counts
    #[must_use]
    pub fn from_rows(
        valid_tables: &[(TableId, u32)],
        large_str: bool,
        large_blob: bool,
        large_guid: bool,
    ) -> Self {
        let mut table_info = TableInfo {
            rows: vec![TableRowInfo::default(); TableId::COUNT],
            coded_indexes: vec![0; CodedIndexType::COUNT],
            is_large_index_str: large_str,
            is_large_index_guid: large_guid,
            is_large_index_blob: large_blob,
        };

        for (table_id, rows) in valid_tables {
            table_info.rows[*table_id as usize] = TableRowInfo::new(*rows);
        }

        table_info.calculate_coded_index_bits();
        table_info
    }

    /// Split a coded index value into its target table and row.
    ///
    /// # Errors
    /// Returns [`crate::Error::Invariant`] if the tag does not name a table of `coded_index_type`.
    pub fn decode_coded_index(
        &self,
        value: u32,
        coded_index_type: CodedIndexType,
    ) -> Result<(TableId, u32)> {
        let tables = coded_index_type.tables();
        let tag_bits = coded_index_type.tag_bits();
        let tag_mask = (1_u32 << tag_bits) - 1;

        let tag = value & tag_mask;
        let row = value >> tag_bits;

        match tables.get(tag as usize) {
            Some(table) => Ok((*table, row)),
            None => Err(invariant_error!(
                "Unknown {:?} coded index tag {}",
                coded_index_type,
                tag
            )),
        }
    }

    /// Row information for `table`
    #[must_use]
    pub fn get(&self, table: TableId) -> &TableRowInfo {
        &self.rows[table as usize]
    }

    /// Number of rows in `table`
    #[must_use]
    pub fn rows(&self, table: TableId) -> u32 {
        self.rows[table as usize].rows
    }

    /// Whether a simple index into `table` is 4 bytes
    #[must_use]
    pub fn is_large(&self, table: TableId) -> bool {
        self.rows[table as usize].is_large
    }

    /// Whether `#Strings` indexes are 4 bytes
    #[must_use]
    pub fn is_large_str(&self) -> bool {
        self.is_large_index_str
    }

    /// Whether `#GUID` indexes are 4 bytes
    #[must_use]
    pub fn is_large_guid(&self) -> bool {
        self.is_large_index_guid
    }

    /// Whether `#Blob` indexes are 4 bytes
    #[must_use]
    pub fn is_large_blob(&self) -> bool {
        self.is_large_index_blob
    }

    /// Width of a `#Strings` index
    #[must_use]
    pub fn str_bytes(&self) -> u8 {
        if self.is_large_index_str {
            4
        } else {
            2
        }
    }

    /// Width of a `#GUID` index
    #[must_use]
    pub fn guid_bytes(&self) -> u8 {
        if self.is_large_index_guid {
            4
        } else {
            2
        }
    }

    /// Width of a `#Blob` index
    #[must_use]
    pub fn blob_bytes(&self) -> u8 {
        if self.is_large_index_blob {
            4
        } else {
            2
        }
    }

    /// Width of a simple index into `table_id`
    #[must_use]
    pub fn table_index_bytes(&self, table_id: TableId) -> u8 {
        if self.rows[table_id as usize].is_large {
            4
        } else {
            2
        }
    }

    /// Whether a coded index of this kind is 4 bytes
    #[must_use]
    pub fn is_large_coded(&self, coded_index_type: CodedIndexType) -> bool {
        self.coded_indexes[coded_index_type as usize] > 16
    }

    /// Width of a coded index of this kind
    #[must_use]
    pub fn coded_index_bytes(&self, coded_index_type: CodedIndexType) -> u8 {
        if self.is_large_coded(coded_index_type) {
            4
        } else {
            2
        }
    }

    /// Size in bytes of one row of `table`.
    #[rustfmt::skip]
    #[must_use]
    pub fn row_size(&self, table: TableId) -> u32 {
        use CodedIndexType as C;
        use TableId as T;

        let s = self.str_bytes();
        let g = self.guid_bytes();
        let b = self.blob_bytes();
        let t = |id: TableId| self.table_index_bytes(id);
        let c = |ci: CodedIndexType| self.coded_index_bytes(ci);

        let size = match table {
            T::Module                 => 2 + s + g + g + g,
            T::TypeRef                => c(C::ResolutionScope) + s + s,
            T::TypeDef                => 4 + s + s + c(C::TypeDefOrRef) + t(T::Field) + t(T::MethodDef),
            T::FieldPtr               => t(T::Field),
            T::Field                  => 2 + s + b,
            T::MethodPtr              => t(T::MethodDef),
            T::MethodDef              => 4 + 2 + 2 + s + b + t(T::Param),
            T::ParamPtr               => t(T::Param),
            T::Param                  => 2 + 2 + s,
            T::InterfaceImpl          => t(T::TypeDef) + c(C::TypeDefOrRef),
            T::MemberRef              => c(C::MemberRefParent) + s + b,
            T::Constant               => 2 + c(C::HasConstant) + b,
            T::CustomAttribute        => c(C::HasCustomAttribute) + c(C::CustomAttributeType) + b,
            T::FieldMarshal           => c(C::HasFieldMarshal) + b,
            T::DeclSecurity           => 2 + c(C::HasDeclSecurity) + b,
            T::ClassLayout            => 2 + 4 + t(T::TypeDef),
            T::FieldLayout            => 4 + t(T::Field),
            T::StandAloneSig          => b,
            T::EventMap               => t(T::TypeDef) + t(T::Event),
            T::EventPtr               => t(T::Event),
            T::Event                  => 2 + s + c(C::TypeDefOrRef),
            T::PropertyMap            => t(T::TypeDef) + t(T::Property),
            T::PropertyPtr            => t(T::Property),
            T::Property               => 2 + s + b,
            T::MethodSemantics        => 2 + t(T::MethodDef) + c(C::HasSemantics),
            T::MethodImpl             => t(T::TypeDef) + c(C::MethodDefOrRef) + c(C::MethodDefOrRef),
            T::ModuleRef              => s,
            T::TypeSpec               => b,
            T::ImplMap                => 2 + c(C::MemberForwarded) + s + t(T::ModuleRef),
            T::FieldRVA               => 4 + t(T::Field),
            T::EncLog                 => 4 + 4,
            T::EncMap                 => 4,
            T::Assembly               => 4 + 2 + 2 + 2 + 2 + 4 + b + s + s,
            T::AssemblyProcessor      => 4,
            T::AssemblyOS             => 4 + 4 + 4,
            T::AssemblyRef            => 2 + 2 + 2 + 2 + 4 + b + s + s + b,
            T::AssemblyRefProcessor   => 4 + t(T::AssemblyRef),
            T::AssemblyRefOS          => 4 + 4 + 4 + t(T::AssemblyRef),
            T::File                   => 4 + s + b,
            T::ExportedType           => 4 + 4 + s + s + c(C::Implementation),
            T::ManifestResource       => 4 + 4 + s + c(C::Implementation),
            T::NestedClass            => t(T::TypeDef) + t(T::TypeDef),
            T::GenericParam           => 2 + 2 + c(C::TypeOrMethodDef) + s,
            T::MethodSpec             => c(C::MethodDefOrRef) + b,
            T::GenericParamConstraint => t(T::GenericParam) + c(C::TypeDefOrRef),
        };

        u32::from(size)
    }

    fn calculate_coded_index_bits(&mut self) {
        for coded_index in CodedIndexType::iter() {
            let max_bits = coded_index
                .tables()
                .iter()
                .map(|table| self.rows[*table as usize].bits)
                .max()
                .unwrap_or(1);

            self.coded_indexes[coded_index as usize] = max_bits + coded_index.tag_bits();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_info() {
        assert_eq!(TableRowInfo::new(0).bits, 1);
        assert_eq!(TableRowInfo::new(1).bits, 1);
        assert_eq!(TableRowInfo::new(0xFFFF).bits, 16);
        assert!(!TableRowInfo::new(0xFFFF).is_large);
        assert!(TableRowInfo::new(0x1_0000).is_large);
    }

    #[test]
    fn small_layouts() {
        let rows = [(TableId::TypeRef, 10), (TableId::TypeDef, 5)];
        let info = TableInfo::from_rows(&rows, false, false, false);

        assert_eq!(info.row_size(TableId::Module), 10);
        assert_eq!(info.row_size(TableId::TypeRef), 6);
        assert_eq!(info.row_size(TableId::TypeDef), 14);
        assert_eq!(info.row_size(TableId::MethodDef), 14);
        assert_eq!(info.row_size(TableId::MemberRef), 6);
        assert_eq!(info.row_size(TableId::Assembly), 22);
        assert_eq!(info.row_size(TableId::AssemblyRef), 20);
        assert_eq!(info.row_size(TableId::CustomAttribute), 6);
    }

    #[test]
    fn large_heaps_and_coded_indexes() {
        // ResolutionScope has a 2 bit tag: 2^14 TypeRef rows overflow the 16 bit form
        let info = TableInfo::from_rows(&[(TableId::TypeRef, 0x4000)], true, true, true);

        assert!(info.is_large_coded(CodedIndexType::ResolutionScope));
        assert!(!info.is_large_coded(CodedIndexType::HasConstant));
        assert_eq!(info.row_size(TableId::TypeRef), 4 + 4 + 4);
        assert_eq!(info.row_size(TableId::Module), 2 + 4 + 4 + 4 + 4);

        let info = TableInfo::from_rows(&[(TableId::TypeRef, 0x3FFF)], false, false, false);
        assert!(!info.is_large_coded(CodedIndexType::ResolutionScope));
    }

    #[test]
    fn decode() {
        let info = TableInfo::from_rows(&[], false, false, false);

        assert_eq!(
            info.decode_coded_index(0x0E, CodedIndexType::ResolutionScope).unwrap(),
            (TableId::AssemblyRef, 3)
        );
        assert_eq!(
            info.decode_coded_index(0x09, CodedIndexType::MemberRefParent).unwrap(),
            (TableId::TypeRef, 1)
        );
        assert!(matches!(
            info.decode_coded_index(0x07, CodedIndexType::MemberRefParent),
            Err(crate::Error::Invariant(_))
        ));
    }

    #[test]
    fn header_row_counts() {
        #[rustfmt::skip]
        let data = [
            0x00, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x01,
            0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00,
            0x03, 0x00, 0x00, 0x00,
        ];

        let (info, offset) = TableInfo::new(&data, 0x05, 0).unwrap();
        assert_eq!(offset, 32);
        assert_eq!(info.rows(TableId::Module), 1);
        assert_eq!(info.rows(TableId::TypeDef), 3);
        assert_eq!(info.rows(TableId::TypeRef), 0);

        assert!(matches!(
            TableInfo::new(&data, 1_u64 << 0x30, 0),
            Err(NotSupported)
        ));
    }
}
