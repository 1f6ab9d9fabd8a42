//! PE image access.
//!
//! A [`File`] owns the raw bytes of an assembly (either a heap buffer or a read-only memory
//! mapping) together with the `goblin` view of its PE headers. Loading fails early for
//! anything that is not a managed image: the optional header and the CLR runtime header
//! data directory must both be present.
//!
//! Everything after that point works on file offsets; [`File::rva_to_offset`] maps the
//! relative virtual addresses found in the CLI header and in the `MethodDef` table onto
//! the raw section data.

pub mod io;
pub mod parser;

mod memory;
mod physical;

use std::path::Path;

use crate::{
    Error::{Empty, GoblinErr},
    Result,
};
use goblin::pe::{section_table::SectionTable, PE};
use memory::Memory;
use ouroboros::self_referencing;
use physical::Physical;

/// Storage behind a [`File`]
pub trait Backend: Send + Sync {
    /// Borrow `len` bytes starting at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range is not fully inside the image.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// The complete image
    fn data(&self) -> &[u8];

    /// Size of the image in bytes
    fn len(&self) -> usize;
}

/// A loaded PE image with a CLR runtime header.
#[self_referencing]
pub struct File {
    data: Box<dyn Backend>,
    #[borrows(data)]
    #[not_covariant]
    pe: PE<'this>,
}

impl File {
    /// Memory-map and parse the image at `file`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be read, or a parse error if it
    /// is not a managed PE image.
    pub fn from_file(file: &Path) -> Result<File> {
        let input = Physical::new(file)?;

        Self::load(input)
    }

    /// Parse an image from an owned buffer.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] for an empty buffer, or a parse error if it is not a
    /// managed PE image.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        let input = Memory::new(data);

        Self::load(input)
    }

    fn load<T: Backend + 'static>(data: T) -> Result<File> {
        if data.len() == 0 {
            return Err(Empty);
        }

        let data = Box::new(data);

        File::try_new(data, |data| {
            let data = data.as_ref();
            let pe = PE::parse(data.data()).map_err(GoblinErr)?;

            let Some(optional_header) = pe.header.optional_header else {
                return Err(malformed_error!("File does not have an OptionalHeader"));
            };

            if optional_header
                .data_directories
                .get_clr_runtime_header()
                .is_none()
            {
                return Err(malformed_error!(
                    "File does not have a CLR runtime header directory"
                ));
            }

            Ok(pe)
        })
    }

    /// Size of the image in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data().len()
    }

    /// RVA and size of the CLR runtime header directory.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the directory is missing.
    pub fn clr(&self) -> Result<(usize, usize)> {
        self.with_pe(|pe| {
            pe.header
                .optional_header
                .and_then(|optional_header| {
                    optional_header
                        .data_directories
                        .get_clr_runtime_header()
                        .map(|dir| (dir.virtual_address as usize, dir.size as usize))
                })
                .ok_or_else(|| {
                    malformed_error!("File does not have a CLR runtime header directory")
                })
        })
    }

    /// Iterate the section headers
    pub fn sections(&self) -> impl Iterator<Item = &SectionTable> {
        self.with_pe(|pe| pe.sections.iter())
    }

    /// The raw image bytes
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.with_data(|data| data.data())
    }

    /// Borrow `len` bytes at file `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range is not inside the image.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.with_data(|data| data.data_slice(offset, len))
    }

    /// Translate a relative virtual address into a file offset.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if no section maps `rva`.
    pub fn rva_to_offset(&self, rva: usize) -> Result<usize> {
        let rva_u32 = u32::try_from(rva)
            .map_err(|_| malformed_error!("RVA too large to fit in u32: {}", rva))?;

        self.with_pe(|pe| {
            for section in &pe.sections {
                let Some(section_max) = section.virtual_address.checked_add(section.virtual_size)
                else {
                    return Err(malformed_error!(
                        "Section malformed, causing integer overflow - {} + {}",
                        section.virtual_address,
                        section.virtual_size
                    ));
                };

                if section.virtual_address <= rva_u32 && section_max > rva_u32 {
                    return Ok((rva - section.virtual_address as usize)
                        + section.pointer_to_raw_data as usize);
                }
            }

            Err(malformed_error!(
                "RVA could not be converted to offset - {}",
                rva
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{MetadataBuilder, PeBuilder};

    #[test]
    fn load_minimal_image() {
        let metadata = MetadataBuilder::new("Content.Client").build();
        let image = PeBuilder::new(metadata).build();
        let file = File::from_mem(image).unwrap();

        let (clr_rva, clr_size) = file.clr().unwrap();
        assert_eq!(clr_rva, PeBuilder::TEXT_RVA as usize);
        assert_eq!(clr_size, 72);
        assert_eq!(file.sections().count(), 1);

        let offset = file.rva_to_offset(PeBuilder::TEXT_RVA as usize).unwrap();
        assert_eq!(offset, PeBuilder::TEXT_OFFSET as usize);
        assert!(file.rva_to_offset(0x10).is_err());
    }

    #[test]
    fn empty_input() {
        assert!(matches!(File::from_mem(Vec::new()), Err(Empty)));
    }

    #[test]
    fn garbage_metadata_is_rejected() {
        let image = PeBuilder::new(vec![0xAA; 0x40]).build();
        assert!(File::from_mem(image).is_err());
    }

    #[test]
    fn not_a_pe() {
        assert!(File::from_mem(vec![0x00; 256]).is_err());
    }
}
