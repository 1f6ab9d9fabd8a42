//! Memory-mapped file backend.
//!
//! Mod archives are scanned straight from disk; mapping the file avoids copying the whole
//! image into the heap before the PE headers have even been validated.

use super::Backend;
use crate::{Error::FileError, Result};

use memmap2::Mmap;
use std::{fs, path::Path};

/// A read-only memory mapping of an assembly on disk.
#[derive(Debug)]
pub struct Physical {
    data: Mmap,
}

impl Physical {
    /// Open and map the file at `path`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or mapped.
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let file = fs::File::open(path).map_err(FileError)?;

        // SAFETY: the mapping is read-only and lives as long as `Physical`.
        let mmap = unsafe { Mmap::map(&file) }.map_err(FileError)?;

        Ok(Physical { data: mmap })
    }
}

impl Backend for Physical {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let Some(offset_end) = offset.checked_add(len) else {
            return Err(out_of_bounds_error!());
        };

        if offset_end > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        Ok(&self.data[offset..offset_end])
    }

    fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn physical() {
        let path =
            std::env::temp_dir().join(format!("cilguard_physical_{}.bin", std::process::id()));
        {
            let mut file = fs::File::create(&path).unwrap();
            file.write_all(b"MZ\x90\x00cilguard").unwrap();
        }

        let physical = Physical::new(&path).unwrap();
        assert_eq!(physical.len(), 12);
        assert_eq!(physical.data_slice(0, 2).unwrap(), b"MZ");
        assert_eq!(physical.data_slice(4, 8).unwrap(), b"cilguard");
        assert!(physical.data_slice(10, 3).is_err());

        drop(physical);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            Physical::new("/definitely/not/here.dll"),
            Err(FileError(_))
        ));
    }
}
