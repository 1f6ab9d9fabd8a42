use crate::{
    file::io::read_le_at_dyn,
    metadata::{
        tables::{CodedIndex, CodedIndexType, RowReadable, TableId, TableInfo},
        token::Token,
    },
    Result,
};

/// A row of the `MemberRef` table (ECMA-335 II.22.25).
#[derive(Clone, Debug)]
pub struct MemberRefRaw {
    /// Row id
    pub rid: u32,
    /// Token of this row
    pub token: Token,
    /// The type (or module, or vararg method) the member belongs to
    pub class: CodedIndex,
    /// `#Strings` index of the member name
    pub name: u32,
    /// `#Blob` index of the field or method signature
    pub signature: u32,
}

impl RowReadable for MemberRefRaw {
    const TABLE_ID: TableId = TableId::MemberRef;

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfo) -> Result<Self> {
        Ok(MemberRefRaw {
            rid,
            token: Token::new(0x0A00_0000 + rid),
            class: CodedIndex::read(data, offset, sizes, CodedIndexType::MemberRefParent)?,
            name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            signature: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
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
            0x09, 0x00, // class: TypeRef 1
            0x42, 0x00, // name
            0x43, 0x00, // signature
            0x0C, 0x00, // class: TypeSpec 1
            0x44, 0x00,
            0x45, 0x00,
        ];

        let sizes = TableInfo::from_rows(&[(TableId::MemberRef, 2)], false, false, false);
        let table = MetadataTable::<MemberRefRaw>::new(&data, 2, &sizes);

        let rows: Vec<_> = table.iter().map(Result::unwrap).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].class, CodedIndex::new(TableId::TypeRef, 1));
        assert_eq!(rows[0].name, 0x42);
        assert_eq!(rows[0].signature, 0x43);
        assert_eq!(rows[1].class, CodedIndex::new(TableId::TypeSpec, 1));
        assert_eq!(rows[1].token.value(), 0x0A00_0002);

        let parallel = table.par_collect().unwrap();
        assert_eq!(parallel.len(), 2);
        assert_eq!(parallel[1].signature, 0x45);
    }
}
