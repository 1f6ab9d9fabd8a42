use strum::{EnumCount, EnumIter};

use crate::{
    file::io::read_le_at_dyn,
    metadata::{
        tables::{TableId, TableInfo},
        token::Token,
    },
    Result,
};

/// The coded index kinds of ECMA-335 II.24.2.6.
///
/// Each kind packs a tag selecting one of several tables into the low bits of the value.
#[derive(Debug, Hash, Eq, PartialEq, Clone, Copy, EnumIter, EnumCount)]
#[repr(usize)]
#[allow(missing_docs)]
pub enum CodedIndexType {
    TypeDefOrRef,
    HasConstant,
    HasCustomAttribute,
    HasFieldMarshal,
    HasDeclSecurity,
    MemberRefParent,
    HasSemantics,
    MethodDefOrRef,
    MemberForwarded,
    Implementation,
    CustomAttributeType,
    ResolutionScope,
    TypeOrMethodDef,
}

impl CodedIndexType {
    /// The tables this coded index can point to, in tag order
    #[must_use]
    pub fn tables(&self) -> &'static [TableId] {
        match self {
            CodedIndexType::TypeDefOrRef => {
                &[TableId::TypeDef, TableId::TypeRef, TableId::TypeSpec]
            }
            CodedIndexType::HasConstant => &[TableId::Field, TableId::Param, TableId::Property],
            CodedIndexType::HasCustomAttribute => &[
                TableId::MethodDef,
                TableId::Field,
                TableId::TypeRef,
                TableId::TypeDef,
                TableId::Param,
                TableId::InterfaceImpl,
                TableId::MemberRef,
                TableId::Module,
                TableId::DeclSecurity,
                TableId::Property,
                TableId::Event,
                TableId::StandAloneSig,
                TableId::ModuleRef,
                TableId::TypeSpec,
                TableId::Assembly,
                TableId::AssemblyRef,
                TableId::File,
                TableId::ExportedType,
                TableId::ManifestResource,
                TableId::GenericParam,
                TableId::GenericParamConstraint,
                TableId::MethodSpec,
            ],
            CodedIndexType::HasFieldMarshal => &[TableId::Field, TableId::Param],
            CodedIndexType::HasDeclSecurity => {
                &[TableId::TypeDef, TableId::MethodDef, TableId::Assembly]
            }
            CodedIndexType::MemberRefParent => &[
                TableId::TypeDef,
                TableId::TypeRef,
                TableId::ModuleRef,
                TableId::MethodDef,
                TableId::TypeSpec,
            ],
            CodedIndexType::HasSemantics => &[TableId::Event, TableId::Property],
            CodedIndexType::MethodDefOrRef => &[TableId::MethodDef, TableId::MemberRef],
            CodedIndexType::MemberForwarded => &[TableId::Field, TableId::MethodDef],
            CodedIndexType::Implementation => {
                &[TableId::File, TableId::AssemblyRef, TableId::ExportedType]
            }
            // Tags 0, 1 and 4 are unused; only MethodDef (2) and MemberRef (3) are valid
            CodedIndexType::CustomAttributeType => &[
                TableId::MethodDef,
                TableId::MethodDef,
                TableId::MethodDef,
                TableId::MemberRef,
                TableId::MemberRef,
            ],
            CodedIndexType::ResolutionScope => &[
                TableId::Module,
                TableId::ModuleRef,
                TableId::AssemblyRef,
                TableId::TypeRef,
            ],
            CodedIndexType::TypeOrMethodDef => &[TableId::TypeDef, TableId::MethodDef],
        }
    }

    /// Number of low bits used for the tag
    #[must_use]
    pub fn tag_bits(&self) -> u8 {
        let count = self.tables().len();
        // ceil(log2(count))
        (usize::BITS - (count - 1).leading_zeros()) as u8
    }
}

/// A decoded coded index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodedIndex {
    /// The table the index points into
    pub tag: TableId,
    /// 1-based row, 0 for a nil reference
    pub row: u32,
    /// The equivalent metadata token
    pub token: Token,
}

impl CodedIndex {
    /// Read and decode a coded index of kind `ci_type` at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated input and
    /// [`crate::Error::Invariant`] for an unknown tag.
    pub fn read(
        data: &[u8],
        offset: &mut usize,
        info: &TableInfo,
        ci_type: CodedIndexType,
    ) -> Result<Self> {
        let coded_index = read_le_at_dyn(data, offset, info.is_large_coded(ci_type))?;
        let (tag, row) = info.decode_coded_index(coded_index, ci_type)?;

        Ok(CodedIndex::new(tag, row))
    }

    /// Build a coded index for `row` of `tag`
    #[must_use]
    pub fn new(tag: TableId, row: u32) -> CodedIndex {
        CodedIndex {
            tag,
            row,
            token: Token::new(tag.token_prefix() | row),
        }
    }

    /// Returns `true` for a nil reference
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.row == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_bits() {
        assert_eq!(CodedIndexType::TypeDefOrRef.tag_bits(), 2);
        assert_eq!(CodedIndexType::HasFieldMarshal.tag_bits(), 1);
        assert_eq!(CodedIndexType::ResolutionScope.tag_bits(), 2);
        assert_eq!(CodedIndexType::MemberRefParent.tag_bits(), 3);
        assert_eq!(CodedIndexType::CustomAttributeType.tag_bits(), 3);
        assert_eq!(CodedIndexType::HasCustomAttribute.tag_bits(), 5);
    }

    #[test]
    fn read_small_and_large() {
        let info = TableInfo::from_rows(&[], false, false, false);
        let data = [0x0D, 0x00];
        let mut offset = 0;

        let index =
            CodedIndex::read(&data, &mut offset, &info, CodedIndexType::TypeDefOrRef).unwrap();
        assert_eq!(offset, 2);
        assert_eq!(index.tag, TableId::TypeRef);
        assert_eq!(index.row, 3);
        assert_eq!(index.token.value(), 0x0100_0003);

        let info = TableInfo::from_rows(&[(TableId::TypeSpec, 0x1_0000)], false, false, false);
        let data = [0x06, 0x00, 0x01, 0x00];
        let mut offset = 0;

        let index =
            CodedIndex::read(&data, &mut offset, &info, CodedIndexType::TypeDefOrRef).unwrap();
        assert_eq!(offset, 4);
        assert_eq!(index.tag, TableId::TypeSpec);
        assert_eq!(index.row, 0x4001);
    }

    #[test]
    fn nil() {
        assert!(CodedIndex::new(TableId::TypeDef, 0).is_nil());
        assert!(!CodedIndex::new(TableId::TypeDef, 1).is_nil());
    }
}
