//! The metadata root (ECMA-335 II.24.2.1): signature, version string and stream directory.

use crate::{
    file::io::{read_le, read_le_at},
    metadata::streams::StreamHeader,
    Error::OutOfBounds,
    Result,
};

/// `BSJB`
pub const CIL_HEADER_MAGIC: u32 = 0x424A_5342;

/// The parsed metadata root.
pub struct Root {
    /// Always [`CIL_HEADER_MAGIC`]
    pub signature: u32,
    /// Major version, ignored by the runtime
    pub major_version: u16,
    /// Minor version, ignored by the runtime
    pub minor_version: u16,
    /// Padded length of the version string
    pub length: u32,
    /// Runtime version string, e.g. `v4.0.30319`
    pub version: String,
    /// The stream directory
    pub stream_headers: Vec<StreamHeader>,
}

impl Root {
    /// Parse the root at the start of the metadata blob.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a bad signature or stream directory, and
    /// [`crate::Error::OutOfBounds`] if any stream lies outside `data`.
    pub fn read(data: &[u8]) -> Result<Root> {
        if data.len() < 32 {
            return Err(OutOfBounds);
        }

        let signature = read_le::<u32>(data)?;
        if signature != CIL_HEADER_MAGIC {
            return Err(malformed_error!(
                "CIL_HEADER_MAGIC does not match - {}",
                signature
            ));
        }

        let length = read_le_at::<u32>(data, &mut 12)?;
        let version_end = (length as usize)
            .checked_add(16)
            .ok_or_else(|| malformed_error!("Version string length overflow - {}", length))?;
        if version_end + 4 > data.len() {
            return Err(OutOfBounds);
        }

        let version = String::from_utf8_lossy(&data[16..version_end])
            .trim_end_matches('\0')
            .to_string();

        let stream_count = read_le_at::<u16>(data, &mut (version_end + 2))?;
        if stream_count == 0 || stream_count > 6 {
            return Err(malformed_error!("Invalid stream count - {}", stream_count));
        }

        let mut stream_headers = Vec::with_capacity(stream_count as usize);
        let mut stream_offset = version_end + 4;
        for _ in 0..stream_count {
            if stream_offset > data.len() {
                return Err(OutOfBounds);
            }

            let header = StreamHeader::from(&data[stream_offset..])?;
            match header.offset.checked_add(header.size) {
                Some(end) if end as usize <= data.len() => {}
                Some(_) => return Err(OutOfBounds),
                None => {
                    return Err(malformed_error!(
                        "Stream offset and size cause integer overflow - {} + {}",
                        header.offset,
                        header.size
                    ))
                }
            }

            if stream_headers
                .iter()
                .any(|existing: &StreamHeader| existing.name == header.name)
            {
                return Err(malformed_error!("Duplicate stream - {}", header.name));
            }

            let name_aligned = ((header.name.len() + 1) + 3) & !3;
            stream_offset += 8 + name_aligned;

            stream_headers.push(header);
        }

        Ok(Root {
            signature,
            major_version: read_le::<u16>(&data[4..])?,
            minor_version: read_le::<u16>(&data[6..])?,
            length,
            version,
            stream_headers,
        })
    }

    /// Find a stream header by name
    #[must_use]
    pub fn stream(&self, name: &str) -> Option<&StreamHeader> {
        self.stream_headers.iter().find(|header| header.name == name)
    }
}
