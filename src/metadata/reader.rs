//! Read-only access to the metadata of one managed image.
//!
//! [`MetadataReader`] owns the image bytes and remembers where the CLI header, the metadata
//! root, the heaps and the tables live. Heaps and tables are handed out as short-lived
//! zero-copy views, so the reader itself is `Send + Sync` and can be shared by the parallel
//! scanners without further wrapping.
//!
//! # Examples
//!
//! ```rust,no_run
//! use cilguard::MetadataReader;
//! use cilguard::metadata::tables::TypeRefRaw;
//! use std::path::Path;
//!
//! let reader = MetadataReader::from_file(Path::new("Mod.dll"))?;
//! println!("{} ({} types)", reader.assembly_name()?, reader.type_def_count());
//!
//! if let Some(type_refs) = reader.table::<TypeRefRaw>() {
//!     for type_ref in type_refs.iter() {
//!         let type_ref = type_ref?;
//!         println!("{}", reader.string(type_ref.type_name as usize)?);
//!     }
//! }
//! # Ok::<(), cilguard::Error>(())
//! ```

use std::{collections::HashMap, ops::Range, path::Path};

use log::debug;

use crate::{
    file::File,
    metadata::{
        cor20header::{Cor20Header, COR20_HEADER_SIZE},
        root::Root,
        streams::{Blob, Strings, TablesHeader, UserStrings},
        tables::{
            AssemblyRaw, CodedIndex, InterfaceImplRaw, MetadataTable, MethodDefRaw, ModuleRaw,
            NestedClassRaw, RowReadable, TableId, TypeDefRaw,
        },
    },
    Error::{NotSupported, OutOfBounds},
    Result,
};

enum Source {
    Image(File),
    Metadata(Vec<u8>),
}

impl Source {
    fn data(&self) -> &[u8] {
        match self {
            Source::Image(file) => file.data(),
            Source::Metadata(data) => data,
        }
    }
}

/// Parsed metadata of a managed PE image, or of a bare metadata blob.
pub struct MetadataReader {
    source: Source,
    cor20: Option<Cor20Header>,
    metadata: Range<usize>,
    root: Root,
    strings: Range<usize>,
    blob: Option<Range<usize>>,
    user_strings: Option<Range<usize>>,
    tables_stream: Range<usize>,
    tables: TablesHeader,
    enclosing: HashMap<u32, u32>,
}

impl MetadataReader {
    /// Memory-map and parse the image at `path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be read, or a parse error if it is
    /// not a well-formed managed image.
    pub fn from_file(path: &Path) -> Result<MetadataReader> {
        Self::from_image(File::from_file(path)?)
    }

    /// Parse an image from an owned buffer.
    ///
    /// # Errors
    /// Returns a parse error if `data` is not a well-formed managed image.
    pub fn from_mem(data: Vec<u8>) -> Result<MetadataReader> {
        Self::from_image(File::from_mem(data)?)
    }

    /// Parse a bare metadata blob, starting with the `BSJB` root.
    ///
    /// Method bodies are not reachable through a reader built this way.
    ///
    /// # Errors
    /// Returns a parse error if `data` is not well-formed metadata.
    pub fn from_metadata(data: Vec<u8>) -> Result<MetadataReader> {
        let range = 0..data.len();
        Self::load(Source::Metadata(data), None, range)
    }

    fn from_image(file: File) -> Result<MetadataReader> {
        let (clr_rva, clr_size) = file.clr()?;
        if clr_size < COR20_HEADER_SIZE {
            return Err(malformed_error!(
                "CLR runtime header directory too small - {}",
                clr_size
            ));
        }

        let clr_offset = file.rva_to_offset(clr_rva)?;
        let cor20 = Cor20Header::read(file.data_slice(clr_offset, COR20_HEADER_SIZE)?)?;

        let metadata_offset = file.rva_to_offset(cor20.meta_data_rva as usize)?;
        let metadata_end = metadata_offset
            .checked_add(cor20.meta_data_size as usize)
            .ok_or(OutOfBounds)?;
        if metadata_end > file.len() {
            return Err(OutOfBounds);
        }

        Self::load(Source::Image(file), Some(cor20), metadata_offset..metadata_end)
    }

    fn load(
        source: Source,
        cor20: Option<Cor20Header>,
        metadata: Range<usize>,
    ) -> Result<MetadataReader> {
        let meta_bytes = source.data().get(metadata.clone()).ok_or(OutOfBounds)?;
        let root = Root::read(meta_bytes)?;

        let stream_range = |name: &str| {
            root.stream(name)
                .map(|header| header.offset as usize..(header.offset + header.size) as usize)
        };

        if root.stream("#-").is_some() {
            return Err(NotSupported);
        }

        let Some(tables_stream) = stream_range("#~") else {
            return Err(malformed_error!("Metadata has no #~ stream"));
        };
        let Some(strings) = stream_range("#Strings") else {
            return Err(malformed_error!("Metadata has no #Strings stream"));
        };
        let blob = stream_range("#Blob");
        let user_strings = stream_range("#US");

        // Validate heap headers once so the accessors below only fail on bad indices
        Strings::from(&meta_bytes[strings.clone()])?;
        if let Some(blob) = &blob {
            Blob::from(&meta_bytes[blob.clone()])?;
        }
        if let Some(user_strings) = &user_strings {
            UserStrings::from(&meta_bytes[user_strings.clone()])?;
        }

        let tables = TablesHeader::from(&meta_bytes[tables_stream.clone()])?;

        let mut enclosing = HashMap::new();
        if let Some(nested) = tables.table::<NestedClassRaw>(&meta_bytes[tables_stream.clone()]) {
            for row in nested.iter() {
                let row = row?;
                enclosing.insert(row.nested_class, row.enclosing_class);
            }
        }

        debug!(
            "Loaded metadata {} ({} bytes, {} TypeDefs, {} TypeRefs, {} MemberRefs)",
            root.version,
            metadata.len(),
            tables.rows(TableId::TypeDef),
            tables.rows(TableId::TypeRef),
            tables.rows(TableId::MemberRef),
        );

        Ok(MetadataReader {
            source,
            cor20,
            metadata,
            root,
            strings,
            blob,
            user_strings,
            tables_stream,
            tables,
            enclosing,
        })
    }

    /// The CLI header, `None` for a reader built from a bare metadata blob
    #[must_use]
    pub fn cor20(&self) -> Option<&Cor20Header> {
        self.cor20.as_ref()
    }

    /// Returns `true` if the image carries a managed native (ReadyToRun / NGEN) header
    #[must_use]
    pub fn has_native_code(&self) -> bool {
        self.cor20.as_ref().is_some_and(Cor20Header::has_native_code)
    }

    /// The metadata root
    #[must_use]
    pub fn root(&self) -> &Root {
        &self.root
    }

    /// The raw metadata blob
    #[must_use]
    pub fn metadata(&self) -> &[u8] {
        &self.source.data()[self.metadata.clone()]
    }

    /// The tables header, with row counts and index sizes
    #[must_use]
    pub fn tables(&self) -> &TablesHeader {
        &self.tables
    }

    /// A typed view of table `T`, `None` if the table is absent
    #[must_use]
    pub fn table<T: RowReadable>(&self) -> Option<MetadataTable<'_, T>> {
        self.tables
            .table::<T>(&self.metadata()[self.tables_stream.clone()])
    }

    /// Number of rows in `table_id`
    #[must_use]
    pub fn row_count(&self, table_id: TableId) -> u32 {
        self.tables.rows(table_id)
    }

    /// Number of rows in the `TypeDef` table, including `<Module>`
    #[must_use]
    pub fn type_def_count(&self) -> u32 {
        self.row_count(TableId::TypeDef)
    }

    /// Read row `rid` of table `T`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Invariant`] if the table is absent or `rid` is out of range.
    pub fn row<T: RowReadable>(&self, rid: u32) -> Result<T> {
        match self.table::<T>() {
            Some(table) => table.get(rid),
            None => Err(invariant_error!(
                "Row {} of empty table {:?}",
                rid,
                T::TABLE_ID
            )),
        }
    }

    /// The `#Strings` heap.
    ///
    /// # Errors
    /// Never fails for a reader that loaded successfully.
    pub fn strings(&self) -> Result<Strings<'_>> {
        Strings::from(&self.metadata()[self.strings.clone()])
    }

    /// The `#Blob` heap.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the metadata has no `#Blob` stream.
    pub fn blob(&self) -> Result<Blob<'_>> {
        match &self.blob {
            Some(range) => Blob::from(&self.metadata()[range.clone()]),
            None => Err(malformed_error!("Metadata has no #Blob stream")),
        }
    }

    /// The `#US` heap, `None` if the metadata has none
    #[must_use]
    pub fn user_strings(&self) -> Option<UserStrings<'_>> {
        self.user_strings
            .as_ref()
            .and_then(|range| UserStrings::from(&self.metadata()[range.clone()]).ok())
    }

    /// The identifier at `index` in `#Strings`.
    ///
    /// # Errors
    /// Returns an error for an out-of-range index or malformed data.
    pub fn string(&self, index: usize) -> Result<&str> {
        self.strings()?.get(index)
    }

    /// Like [`MetadataReader::string`], but index 0 and the empty string map to `None`.
    ///
    /// # Errors
    /// Returns an error for an out-of-range index or malformed data.
    pub fn string_opt(&self, index: usize) -> Result<Option<&str>> {
        self.strings()?.get_opt(index)
    }

    /// The blob at `index` in `#Blob`.
    ///
    /// # Errors
    /// Returns an error for an out-of-range index or a missing heap.
    pub fn blob_at(&self, index: usize) -> Result<&[u8]> {
        self.blob()?.get(index)
    }

    /// Name of the assembly, falling back to the module name for a netmodule.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if neither row is present.
    pub fn assembly_name(&self) -> Result<&str> {
        if let Some(assembly) = self.table::<AssemblyRaw>() {
            return self.string(assembly.get(1)?.name as usize);
        }

        if let Some(module) = self.table::<ModuleRaw>() {
            return self.string(module.get(1)?.name as usize);
        }

        Err(malformed_error!("Metadata has neither Assembly nor Module row"))
    }

    /// The row range of `Field` owned by TypeDef `rid`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the `FieldList` columns are out of order or point
    /// past the table.
    pub fn type_fields(&self, rid: u32) -> Result<Range<u32>> {
        self.owned_range(rid, TableId::Field, |row| row.field_list)
    }

    /// The row range of `MethodDef` owned by TypeDef `rid`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the `MethodList` columns are out of order or point
    /// past the table.
    pub fn type_methods(&self, rid: u32) -> Result<Range<u32>> {
        self.owned_range(rid, TableId::MethodDef, |row| row.method_list)
    }

    fn owned_range(
        &self,
        rid: u32,
        target: TableId,
        list: impl Fn(&TypeDefRaw) -> u32,
    ) -> Result<Range<u32>> {
        let target_end = self.row_count(target) + 1;

        let start = list(&self.row::<TypeDefRaw>(rid)?);
        let end = if rid < self.type_def_count() {
            list(&self.row::<TypeDefRaw>(rid + 1)?)
        } else {
            target_end
        };

        if start == 0 || start > end || end > target_end {
            return Err(malformed_error!(
                "TypeDef {} owns an invalid {:?} range {}..{}",
                rid,
                target,
                start,
                end
            ));
        }

        Ok(start..end)
    }

    /// The methods of TypeDef `rid`.
    ///
    /// # Errors
    /// Returns an error if the method range is invalid.
    pub fn methods_of(&self, rid: u32) -> Result<Vec<MethodDefRaw>> {
        self.type_methods(rid)?
            .map(|method| self.row::<MethodDefRaw>(method))
            .collect()
    }

    /// The TypeDef that encloses nested TypeDef `rid`
    #[must_use]
    pub fn enclosing_type(&self, rid: u32) -> Option<u32> {
        self.enclosing.get(&rid).copied()
    }

    /// Interfaces implemented by each TypeDef, keyed by TypeDef row.
    ///
    /// # Errors
    /// Returns an error if an `InterfaceImpl` row cannot be read.
    pub fn interface_impls(&self) -> Result<HashMap<u32, Vec<CodedIndex>>> {
        let mut impls: HashMap<u32, Vec<CodedIndex>> = HashMap::new();
        if let Some(table) = self.table::<InterfaceImplRaw>() {
            for row in table.iter() {
                let row = row?;
                impls.entry(row.class).or_default().push(row.interface);
            }
        }

        Ok(impls)
    }

    /// The bytes from RVA `rva` to the end of the image, where a method body starts.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for a reader built from a bare metadata blob and
    /// [`crate::Error::Malformed`] if no section maps `rva`.
    pub fn method_body(&self, rva: u32) -> Result<&[u8]> {
        match &self.source {
            Source::Image(file) => {
                let offset = file.rva_to_offset(rva as usize)?;
                file.data().get(offset..).ok_or(OutOfBounds)
            }
            Source::Metadata(_) => Err(NotSupported),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::tables::{TypeAttributes, TypeRefRaw},
        test::{MetadataBuilder, PeBuilder},
        Error,
    };

    fn sample() -> MetadataBuilder {
        let mut builder = MetadataBuilder::new("Sample");
        let system = builder.assembly_ref("System.Runtime");
        let object = builder.type_ref_in_assembly(system, "System", "Object");

        let sequential = TypeAttributes::SEQUENTIAL_LAYOUT.bits();
        let point = builder.type_def("Game", "Point", sequential, Some(object));
        builder.field(point, "X", &[0x06, 0x08]);
        builder.field(point, "Y", &[0x06, 0x08]);
        builder.method(point, "Length", &[0x20, 0x00, 0x0C], 0);

        let nested = TypeAttributes::NESTED_PUBLIC.bits();
        let inner = builder.type_def("", "Inner", nested, Some(object));
        builder.nested(inner, point);
        builder.method(inner, "Run", &[0x20, 0x00, 0x01], 0);
        builder
    }

    #[test]
    fn bare_metadata() {
        let reader = MetadataReader::from_metadata(sample().build()).unwrap();

        assert_eq!(reader.assembly_name().unwrap(), "Sample");
        assert!(reader.cor20().is_none());
        assert!(!reader.has_native_code());
        // <Module>, Point, Inner
        assert_eq!(reader.type_def_count(), 3);
        assert_eq!(reader.row_count(TableId::TypeRef), 1);

        let type_ref = reader.row::<TypeRefRaw>(1).unwrap();
        assert_eq!(reader.string(type_ref.type_name as usize).unwrap(), "Object");
        assert_eq!(type_ref.resolution_scope.tag, TableId::AssemblyRef);

        assert_eq!(reader.type_fields(1).unwrap(), 1..1);
        assert_eq!(reader.type_fields(2).unwrap(), 1..3);
        assert_eq!(reader.type_fields(3).unwrap(), 3..3);
        assert_eq!(reader.type_methods(2).unwrap(), 1..2);
        assert_eq!(reader.type_methods(3).unwrap(), 2..3);
        assert_eq!(reader.methods_of(3).unwrap().len(), 1);

        assert_eq!(reader.enclosing_type(3), Some(2));
        assert_eq!(reader.enclosing_type(2), None);

        assert!(matches!(reader.method_body(0x2000), Err(Error::NotSupported)));
        assert!(reader.row::<TypeRefRaw>(2).is_err());
    }

    #[test]
    fn netmodule_falls_back_to_module_name() {
        let mut builder = sample();
        builder.netmodule();
        let reader = MetadataReader::from_metadata(builder.build()).unwrap();

        assert_eq!(reader.row_count(TableId::Assembly), 0);
        assert_eq!(reader.assembly_name().unwrap(), "Sample.dll");
    }

    #[test]
    fn pe_image() {
        let image = PeBuilder::new(sample().build()).build();
        let reader = MetadataReader::from_mem(image).unwrap();

        assert_eq!(reader.assembly_name().unwrap(), "Sample");
        assert_eq!(reader.type_def_count(), 3);
        assert!(reader.cor20().is_some());
        assert!(!reader.has_native_code());
        assert_eq!(reader.root().version, "v4.0.30319");
    }

    #[test]
    fn native_header() {
        let image = PeBuilder::new(sample().build())
            .managed_native_header(0x40)
            .build();
        let reader = MetadataReader::from_mem(image).unwrap();

        assert!(reader.has_native_code());
    }

    #[test]
    fn uncompressed_tables() {
        let mut builder = sample();
        builder.uncompressed_tables();

        assert!(matches!(
            MetadataReader::from_metadata(builder.build()),
            Err(Error::NotSupported)
        ));
    }

    #[test]
    fn garbage() {
        assert!(MetadataReader::from_metadata(vec![0x00; 64]).is_err());
        assert!(MetadataReader::from_mem(Vec::new()).is_err());
        assert!(MetadataReader::from_mem(vec![0x4D, 0x5A, 0x00, 0x00]).is_err());
    }
}
