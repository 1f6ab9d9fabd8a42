//! The CLI header (ECMA-335 II.25.3.3), pointed to by the CLR runtime header data directory.

use crate::{file::parser::Parser, Error::OutOfBounds, Result};

/// Size of the CLI header in bytes
pub const COR20_HEADER_SIZE: usize = 72;

/// `COMIMAGE_FLAGS_ILONLY`
pub const COMIMAGE_FLAGS_ILONLY: u32 = 0x0000_0001;

/// The parsed CLI header.
///
/// Only the directories the sandbox cares about are kept: metadata (where everything else
/// lives), the managed native header (ahead-of-time compiled code, rejected outright) and
/// the VTable fixups (unmanaged exports).
#[derive(Debug, Clone)]
pub struct Cor20Header {
    /// Size of the header, always 72
    pub cb: u32,
    /// Runtime major version
    pub major_runtime_version: u16,
    /// Runtime minor version
    pub minor_runtime_version: u16,
    /// RVA of the metadata root
    pub meta_data_rva: u32,
    /// Size of the metadata
    pub meta_data_size: u32,
    /// `COMIMAGE_FLAGS_*`
    pub flags: u32,
    /// Entry point token or native entry RVA
    pub entry_point_token: u32,
    /// RVA of the VTable fixup table
    pub vtable_fixups_rva: u32,
    /// Size of the VTable fixup table
    pub vtable_fixups_size: u32,
    /// RVA of the managed native (ReadyToRun / NGEN) header
    pub managed_native_header_rva: u32,
    /// Size of the managed native header
    pub managed_native_header_size: u32,
}

impl Cor20Header {
    /// Parse the header from `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for short input and [`crate::Error::Malformed`]
    /// if `cb` is not 72 or the metadata directory is empty.
    pub fn read(data: &[u8]) -> Result<Cor20Header> {
        if data.len() < COR20_HEADER_SIZE {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(data);

        let cb = parser.read_le::<u32>()?;
        if cb as usize != COR20_HEADER_SIZE {
            return Err(malformed_error!(
                "Invalid CLR header size: expected 72, got {}",
                cb
            ));
        }

        let major_runtime_version = parser.read_le::<u16>()?;
        let minor_runtime_version = parser.read_le::<u16>()?;

        let meta_data_rva = parser.read_le::<u32>()?;
        let meta_data_size = parser.read_le::<u32>()?;
        if meta_data_rva == 0 || meta_data_size == 0 {
            return Err(malformed_error!("Metadata directory cannot be empty"));
        }

        let flags = parser.read_le::<u32>()?;
        let entry_point_token = parser.read_le::<u32>()?;

        // Resources, strong name signature, code manager table
        parser.advance_by(24)?;

        let vtable_fixups_rva = parser.read_le::<u32>()?;
        let vtable_fixups_size = parser.read_le::<u32>()?;

        // Export address table jumps
        parser.advance_by(8)?;

        let managed_native_header_rva = parser.read_le::<u32>()?;
        let managed_native_header_size = parser.read_le::<u32>()?;

        Ok(Cor20Header {
            cb,
            major_runtime_version,
            minor_runtime_version,
            meta_data_rva,
            meta_data_size,
            flags,
            entry_point_token,
            vtable_fixups_rva,
            vtable_fixups_size,
            managed_native_header_rva,
            managed_native_header_size,
        })
    }

    /// Returns `true` if the image carries precompiled native code
    #[must_use]
    pub fn has_native_code(&self) -> bool {
        self.managed_native_header_size != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[rustfmt::skip]
    fn header_bytes() -> Vec<u8> {
        vec![
            0x48, 0x00, 0x00, 0x00,
            0x02, 0x00,
            0x05, 0x00,
            0x00, 0x20, 0x00, 0x00,
            0x40, 0x01, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x00,
            0x01, 0x00, 0x00, 0x06,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
        ]
    }

    #[test]
    fn crafted() {
        let header = Cor20Header::read(&header_bytes()).unwrap();

        assert_eq!(header.cb, 72);
        assert_eq!(header.major_runtime_version, 2);
        assert_eq!(header.minor_runtime_version, 5);
        assert_eq!(header.meta_data_rva, 0x2000);
        assert_eq!(header.meta_data_size, 0x140);
        assert_eq!(header.flags, COMIMAGE_FLAGS_ILONLY);
        assert_eq!(header.entry_point_token, 0x0600_0001);
        assert!(!header.has_native_code());
    }

    #[test]
    fn native_header() {
        let mut data = header_bytes();
        data[64..68].copy_from_slice(&0x3000_u32.to_le_bytes());
        data[68..72].copy_from_slice(&0x50_u32.to_le_bytes());

        let header = Cor20Header::read(&data).unwrap();
        assert_eq!(header.managed_native_header_rva, 0x3000);
        assert!(header.has_native_code());
    }

    #[test]
    fn invalid() {
        let mut data = header_bytes();
        data[0] = 0x40;
        assert!(matches!(
            Cor20Header::read(&data),
            Err(crate::Error::Malformed { .. })
        ));

        assert!(matches!(Cor20Header::read(&header_bytes()[..40]), Err(OutOfBounds)));
    }
}
