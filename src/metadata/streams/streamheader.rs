use crate::{file::io::read_le, Error::OutOfBounds, Result};

/// An entry of the stream directory in the metadata root.
#[derive(Clone, Debug)]
pub struct StreamHeader {
    /// Offset of the stream from the start of the metadata root
    pub offset: u32,
    /// Size of the stream in bytes
    pub size: u32,
    /// Stream name, e.g. `#~`
    pub name: String,
}

impl StreamHeader {
    /// Parse a stream header at the start of `data`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for short input and [`crate::Error::Malformed`]
    /// for an unknown or unterminated stream name.
    pub fn from(data: &[u8]) -> Result<StreamHeader> {
        if data.len() < 9 {
            return Err(OutOfBounds);
        }

        let name_bytes = &data[8..data.len().min(8 + 32)];
        let Some(name_len) = name_bytes.iter().position(|byte| *byte == 0) else {
            return Err(malformed_error!("Unterminated stream header name"));
        };
        let name = String::from_utf8_lossy(&name_bytes[..name_len]).to_string();

        if !["#Strings", "#US", "#Blob", "#GUID", "#~", "#-", "#Pdb"]
            .iter()
            .any(|valid_name| name == *valid_name)
        {
            return Err(malformed_error!("Invalid stream header name - {}", name));
        }

        Ok(StreamHeader {
            offset: read_le::<u32>(data)?,
            size: read_le::<u32>(&data[4..])?,
            name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let header_bytes = [
            0x6C, 0x00, 0x00, 0x00,
            0xA4, 0x45, 0x00, 0x00,
            0x23, 0x7E, 0x00,
        ];

        let parsed_header = StreamHeader::from(&header_bytes).unwrap();

        assert_eq!(parsed_header.offset, 0x6C);
        assert_eq!(parsed_header.size, 0x45A4);
        assert_eq!(parsed_header.name, "#~");
    }

    #[test]
    fn crafted_invalid() {
        #[rustfmt::skip]
        let header_bytes = [
            0x6C, 0x00, 0x00, 0x00,
            0xA4, 0x45, 0x00, 0x00,
            0x24, 0x7E, 0x00,
        ];
        assert!(StreamHeader::from(&header_bytes).is_err());

        let unterminated = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x23, 0x7E];
        assert!(StreamHeader::from(&unterminated).is_err());
    }
}
