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
    /// `MethodAttributes` (ECMA-335 II.23.1.10), the subset the sandbox inspects.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MethodAttributes: u16 {
        /// Method is static
        const STATIC = 0x0010;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method has no body
        const ABSTRACT = 0x0400;
        /// Implementation is forwarded through P/Invoke
        const PINVOKE_IMPL = 0x2000;
        /// Method is exported as unmanaged code
        const UNMANAGED_EXPORT = 0x0008;
    }
}

bitflags! {
    /// `MethodImplAttributes` (ECMA-335 II.23.1.11).
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct MethodImplAttributes: u16 {
        /// Code type mask
        const CODE_TYPE_MASK = 0x0003;
        /// Body is CIL
        const IL = 0x0000;
        /// Body is native code
        const NATIVE = 0x0001;
        /// Body is optimized IL
        const OPTIL = 0x0002;
        /// Body is provided by the runtime
        const RUNTIME = 0x0003;
        /// Body is unmanaged
        const UNMANAGED = 0x0004;
        /// Method is an internal call into the runtime
        const INTERNAL_CALL = 0x1000;
    }
}

/// A row of the `MethodDef` table (ECMA-335 II.22.26).
#[derive(Clone, Debug)]
pub struct MethodDefRaw {
    /// Row id
    pub rid: u32,
    /// Token of this row
    pub token: Token,
    /// RVA of the method body, 0 for methods without one
    pub rva: u32,
    /// `MethodImplAttributes` bits
    pub impl_flags: u16,
    /// `MethodAttributes` bits
    pub flags: u16,
    /// `#Strings` index of the method name
    pub name: u32,
    /// `#Blob` index of the method signature
    pub signature: u32,
    /// First row of this method's run in the `Param` table
    pub param_list: u32,
}

impl MethodDefRaw {
    /// Attribute bits as [`MethodAttributes`]
    #[must_use]
    pub fn attributes(&self) -> MethodAttributes {
        MethodAttributes::from_bits_retain(self.flags)
    }

    /// Implementation bits as [`MethodImplAttributes`]
    #[must_use]
    pub fn impl_attributes(&self) -> MethodImplAttributes {
        MethodImplAttributes::from_bits_retain(self.impl_flags)
    }

    /// The code type (`IL`, `NATIVE`, `OPTIL` or `RUNTIME`)
    #[must_use]
    pub fn code_type(&self) -> MethodImplAttributes {
        MethodImplAttributes::from_bits_retain(
            self.impl_flags & MethodImplAttributes::CODE_TYPE_MASK.bits(),
        )
    }
}

impl RowReadable for MethodDefRaw {
    const TABLE_ID: TableId = TableId::MethodDef;

    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfo) -> Result<Self> {
        Ok(MethodDefRaw {
            rid,
            token: Token::new(0x0600_0000 + rid),
            rva: read_le_at::<u32>(data, offset)?,
            impl_flags: read_le_at::<u16>(data, offset)?,
            flags: read_le_at::<u16>(data, offset)?,
            name: read_le_at_dyn(data, offset, sizes.is_large_str())?,
            signature: read_le_at_dyn(data, offset, sizes.is_large_blob())?,
            param_list: read_le_at_dyn(data, offset, sizes.is_large(TableId::Param))?,
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
            0x50, 0x20, 0x00, 0x00, // rva
            0x04, 0x00, // impl_flags
            0x16, 0x20, // flags
            0x42, 0x00, // name
            0x10, 0x00, // signature
            0x01, 0x00, // param_list
        ];

        let sizes = TableInfo::from_rows(&[(TableId::MethodDef, 1)], false, false, false);
        let table = MetadataTable::<MethodDefRaw>::new(&data, 1, &sizes);
        assert_eq!(table.row_size(), 14);

        let row = table.get(1).unwrap();
        assert_eq!(row.token.value(), 0x0600_0001);
        assert_eq!(row.rva, 0x2050);
        assert!(row.impl_attributes().contains(MethodImplAttributes::UNMANAGED));
        assert_eq!(row.code_type(), MethodImplAttributes::IL);
        assert!(row.attributes().contains(MethodAttributes::PINVOKE_IMPL));
        assert!(row.attributes().contains(MethodAttributes::STATIC));
        assert_eq!(row.name, 0x42);
        assert_eq!(row.signature, 0x10);
        assert_eq!(row.param_list, 1);
    }
}
