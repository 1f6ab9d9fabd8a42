//! Builds [`MType`] values from the tables and signatures of the scanned assembly.
//!
//! `TypeRef` rows become [`MType::Referenced`] with their complete scope chain, `TypeDef` rows
//! become [`MType::Defined`] and `TypeSpec` rows are decoded recursively. Resolution scopes the
//! sandbox refuses to model (forwarded types, other modules of a multi-module assembly) are
//! reported as [`Error::UnsupportedMetadata`] so the scanners can turn them into violations.

use dashmap::DashMap;

use crate::{
    metadata::{
        reader::MetadataReader,
        signatures::{decode_type_spec, ArrayShape, MethodSignature, PrimitiveType, TypeProvider},
        tables::{AssemblyRefRaw, TableId, TypeDefRaw, TypeRefRaw, TypeSpecRaw},
        token::Token,
    },
    sandbox::types::{MType, ResolutionScope, TypeReference},
    Error::{RecursionLimit, UnsupportedMetadata},
    Result,
};

/// Maximum depth of nested scopes and type specifications
const MAX_NESTING_DEPTH: usize = 50;

/// Resolves metadata handles of one assembly to [`MType`].
///
/// Cheap to copy; an optional cache shares `TypeRef` resolutions across threads.
#[derive(Clone, Copy)]
pub struct MetadataTypeProvider<'r> {
    reader: &'r MetadataReader,
    cache: Option<&'r DashMap<u32, TypeReference>>,
    depth: usize,
}

impl<'r> MetadataTypeProvider<'r> {
    /// A provider without a cache
    #[must_use]
    pub fn new(reader: &'r MetadataReader) -> Self {
        MetadataTypeProvider {
            reader,
            cache: None,
            depth: 0,
        }
    }

    /// A provider that memoizes `TypeRef` resolutions in `cache`
    #[must_use]
    pub fn with_cache(reader: &'r MetadataReader, cache: &'r DashMap<u32, TypeReference>) -> Self {
        MetadataTypeProvider {
            reader,
            cache: Some(cache),
            depth: 0,
        }
    }

    /// The reader this provider resolves against
    #[must_use]
    pub fn reader(&self) -> &'r MetadataReader {
        self.reader
    }

    /// Resolve `TypeRef` row `rid` with its full resolution scope chain.
    ///
    /// # Errors
    /// Returns [`crate::Error::UnsupportedMetadata`] for nil, module and module reference
    /// scopes, and [`crate::Error::Invariant`] for cyclic scope chains.
    pub fn type_reference(&self, rid: u32) -> Result<TypeReference> {
        let mut chain = Vec::new();
        self.type_reference_in(rid, &mut chain)
    }

    fn type_reference_in(&self, rid: u32, chain: &mut Vec<u32>) -> Result<TypeReference> {
        if let Some(cached) = self.cache.and_then(|cache| cache.get(&rid)) {
            return Ok(cached.value().clone());
        }

        if chain.contains(&rid) {
            return Err(invariant_error!(
                "TypeRef {} is part of a cyclic resolution scope chain",
                Token::from_parts(TableId::TypeRef as u8, rid)
            ));
        }
        if chain.len() >= MAX_NESTING_DEPTH {
            return Err(RecursionLimit(MAX_NESTING_DEPTH));
        }
        chain.push(rid);

        let row = self.reader.row::<TypeRefRaw>(rid)?;
        let name = self.reader.string(row.type_name as usize)?;
        let namespace = self.reader.string_opt(row.type_namespace as usize)?;
        let display = match namespace {
            Some(namespace) => format!("{namespace}.{name}"),
            None => name.to_string(),
        };

        let scope = &row.resolution_scope;
        if scope.is_nil() {
            return Err(UnsupportedMetadata(format!(
                "Null resolution scope on type Name: {display}. \
                 This indicates exported/forwarded types"
            )));
        }

        let scope = match scope.tag {
            TableId::AssemblyRef => {
                let assembly = self.reader.row::<AssemblyRefRaw>(scope.row)?;
                ResolutionScope::Assembly(self.reader.string(assembly.name as usize)?.to_string())
            }
            TableId::TypeRef => {
                let parent = self.type_reference_in(scope.row, chain)?;
                ResolutionScope::Type(Box::new(MType::Referenced(parent)))
            }
            TableId::ModuleRef => {
                return Err(UnsupportedMetadata(format!(
                    "Cross-module reference to type {display}. "
                )));
            }
            other => {
                return Err(UnsupportedMetadata(format!(
                    "TypeRef to {other:?} for type {display}"
                )));
            }
        };

        chain.pop();
        let reference = TypeReference {
            scope,
            name: name.to_string(),
            namespace: namespace.map(str::to_string),
        };

        if let Some(cache) = self.cache {
            cache.entry(rid).or_insert_with(|| reference.clone());
        }

        Ok(reference)
    }

    /// Resolve `TypeDef` row `rid`, including the chain of enclosing types.
    ///
    /// # Errors
    /// Returns an error for unreadable rows and [`crate::Error::Invariant`] for a cyclic
    /// `NestedClass` chain.
    pub fn type_definition(&self, rid: u32) -> Result<MType> {
        let mut chain = Vec::new();
        self.type_definition_in(rid, &mut chain)
    }

    fn type_definition_in(&self, rid: u32, chain: &mut Vec<u32>) -> Result<MType> {
        if chain.contains(&rid) {
            return Err(invariant_error!(
                "TypeDef {} is part of a cyclic NestedClass chain",
                Token::from_parts(TableId::TypeDef as u8, rid)
            ));
        }
        if chain.len() >= MAX_NESTING_DEPTH {
            return Err(RecursionLimit(MAX_NESTING_DEPTH));
        }
        chain.push(rid);

        let row = self.reader.row::<TypeDefRaw>(rid)?;
        let enclosing = match self.reader.enclosing_type(rid) {
            Some(enclosing) => Some(Box::new(self.type_definition_in(enclosing, chain)?)),
            None => None,
        };
        chain.pop();

        Ok(MType::Defined {
            name: self.reader.string(row.type_name as usize)?.to_string(),
            namespace: self
                .reader
                .string_opt(row.type_namespace as usize)?
                .map(str::to_string),
            enclosing,
        })
    }

    /// Decode the signature of `TypeSpec` row `rid`.
    ///
    /// # Errors
    /// Returns an error for malformed signatures and [`crate::Error::RecursionLimit`] for
    /// type specifications that keep referring to each other.
    pub fn type_specification(&self, rid: u32) -> Result<MType> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(RecursionLimit(MAX_NESTING_DEPTH));
        }

        let row = self.reader.row::<TypeSpecRaw>(rid)?;
        let signature = self.reader.blob_at(row.signature as usize)?;
        let nested = MetadataTypeProvider {
            depth: self.depth + 1,
            ..*self
        };

        decode_type_spec(signature, &nested)
    }

    /// Resolve a `TypeDefOrRef` token.
    ///
    /// # Errors
    /// Returns [`crate::Error::Invariant`] for tokens of any other table.
    pub fn resolve(&self, token: Token) -> Result<MType> {
        match TableId::from_u8(token.table()) {
            Some(TableId::TypeDef) => self.type_definition(token.row()),
            Some(TableId::TypeRef) => Ok(MType::Referenced(self.type_reference(token.row())?)),
            Some(TableId::TypeSpec) => self.type_specification(token.row()),
            _ => Err(invariant_error!(
                "Token {} is not a TypeDef, TypeRef or TypeSpec",
                token
            )),
        }
    }
}

impl TypeProvider for MetadataTypeProvider<'_> {
    type Type = MType;

    fn primitive(&self, primitive: PrimitiveType) -> MType {
        MType::Primitive(primitive)
    }

    fn type_from_handle(&self, token: Token, _is_value_type: bool) -> Result<MType> {
        self.resolve(token)
    }

    fn sz_array(&self, element: MType) -> MType {
        MType::SzArray(Box::new(element))
    }

    fn array(&self, element: MType, shape: ArrayShape) -> MType {
        MType::IrregularArray {
            element: Box::new(element),
            rank: shape.rank,
        }
    }

    fn pointer(&self, element: MType) -> MType {
        MType::Pointer(Box::new(element))
    }

    fn by_ref(&self, element: MType) -> MType {
        MType::ByRef(Box::new(element))
    }

    fn generic_instantiation(&self, definition: MType, arguments: Vec<MType>) -> MType {
        MType::Generic {
            definition: Box::new(definition),
            arguments,
        }
    }

    fn generic_type_parameter(&self, index: u32) -> MType {
        MType::GenericTypeParameter(index)
    }

    fn generic_method_parameter(&self, index: u32) -> MType {
        MType::GenericMethodParameter(index)
    }

    fn modified(&self, modifier: MType, unmodified: MType, required: bool) -> MType {
        MType::Modified {
            underlying: Box::new(unmodified),
            modifier: Box::new(modifier),
            required,
        }
    }

    fn function_pointer(&self, signature: MethodSignature<MType>) -> MType {
        MType::FunctionPointer(Box::new(signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::tables::TypeAttributes,
        test::MetadataBuilder,
        Error,
    };

    #[test]
    fn nested_reference_chain() {
        let mut builder = MetadataBuilder::new("Mod");
        let lib = builder.assembly_ref("Lib");
        let outer = builder.type_ref_in_assembly(lib, "Game", "Outer");
        let inner = builder.type_ref_nested(outer, "Inner");
        let reader = MetadataReader::from_metadata(builder.build()).unwrap();

        let provider = MetadataTypeProvider::new(&reader);
        let reference = provider.type_reference(inner.row()).unwrap();
        assert_eq!(reference.to_string(), "[Lib]Game.Outer/Inner");
        assert_eq!(reference.namespace, None);
        let ResolutionScope::Type(parent) = &reference.scope else {
            panic!("expected a nested scope");
        };
        assert_eq!(
            **parent,
            MType::Referenced(TypeReference::in_assembly("Lib", Some("Game"), "Outer"))
        );
    }

    #[test]
    fn unsupported_scopes() {
        let mut builder = MetadataBuilder::new("Mod");
        let forwarded = builder.type_ref(None, "System", "Forwarded");
        let module = builder.module_ref("Other.netmodule");
        let cross = builder.type_ref(Some(module), "Other", "Type");
        let reader = MetadataReader::from_metadata(builder.build()).unwrap();
        let provider = MetadataTypeProvider::new(&reader);

        match provider.type_reference(forwarded.row()) {
            Err(Error::UnsupportedMetadata(message)) => assert_eq!(
                message,
                "Null resolution scope on type Name: System.Forwarded. \
                 This indicates exported/forwarded types"
            ),
            other => panic!("unexpected {other:?}"),
        }
        match provider.type_reference(cross.row()) {
            Err(Error::UnsupportedMetadata(message)) => {
                assert_eq!(message, "Cross-module reference to type Other.Type. ")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cyclic_scope_is_fatal() {
        let mut builder = MetadataBuilder::new("Mod");
        let lib = builder.assembly_ref("Lib");
        // row 1 names row 2 as its scope and row 2 names row 1
        let first = Token::from_parts(TableId::TypeRef as u8, 1);
        let second = Token::from_parts(TableId::TypeRef as u8, 2);
        builder.type_ref(Some(second), "", "A");
        builder.type_ref(Some(first), "", "B");
        builder.type_ref_in_assembly(lib, "Game", "Unrelated");
        let reader = MetadataReader::from_metadata(builder.build()).unwrap();

        let provider = MetadataTypeProvider::new(&reader);
        assert!(matches!(provider.type_reference(1), Err(Error::Invariant(_))));
        assert!(provider.type_reference(3).is_ok());
    }

    #[test]
    fn definitions_and_specs() {
        let mut builder = MetadataBuilder::new("Mod");
        let lib = builder.assembly_ref("Lib");
        let list = builder.type_ref_in_assembly(lib, "System.Collections.Generic", "List`1");
        let outer = builder.type_def("Game", "Outer", 0, None);
        let inner = builder.type_def("", "Inner", TypeAttributes::NESTED_PUBLIC.bits(), None);
        builder.nested(inner, outer);

        // GENERICINST CLASS List`1<Inner>
        let list_coded = ((list.row() << 2) | 1) as u8;
        let inner_coded = (inner.row() << 2) as u8;
        let spec = builder.type_spec(&[0x15, 0x12, list_coded, 0x01, 0x12, inner_coded]);
        let reader = MetadataReader::from_metadata(builder.build()).unwrap();

        let cache = DashMap::new();
        let provider = MetadataTypeProvider::with_cache(&reader, &cache);
        assert_eq!(provider.resolve(inner).unwrap().to_string(), "Game.Outer/Inner");

        let decoded = provider.resolve(spec).unwrap();
        assert_eq!(
            decoded.to_string(),
            "[Lib]System.Collections.Generic.List`1<Game.Outer/Inner>"
        );
        assert!(cache.contains_key(&list.row()));

        assert!(matches!(
            provider.resolve(Token::new(0x0600_0001)),
            Err(Error::Invariant(_))
        ));
    }
}
