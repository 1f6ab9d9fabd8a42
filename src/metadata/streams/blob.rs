use crate::{file::parser::Parser, Error::OutOfBounds, Result};

/// The `#Blob` heap: length-prefixed byte sequences (signatures, public keys, ...).
pub struct Blob<'a> {
    data: &'a [u8],
}

impl<'a> Blob<'a> {
    /// Wrap the raw heap.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap does not start with the empty blob.
    pub fn from(data: &'a [u8]) -> Result<Blob<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Invalid memory for #Blob heap"));
        }

        Ok(Blob { data })
    }

    /// The blob starting at `index`, without its length prefix.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the blob extends past the heap.
    pub fn get(&self, index: usize) -> Result<&'a [u8]> {
        if index >= self.data.len() {
            return Err(OutOfBounds);
        }

        let mut parser = Parser::new(&self.data[index..]);
        let len = parser.read_compressed_uint()? as usize;
        let data_start = index + parser.pos();

        let Some(data_end) = data_start.checked_add(len) else {
            return Err(OutOfBounds);
        };

        if data_end > self.data.len() {
            return Err(OutOfBounds);
        }

        Ok(&self.data[data_start..data_end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        #[rustfmt::skip]
        let data = [
            0x00,
            0x03, 0x06, 0x08, 0x0A,
            0x02, 0x20, 0x00,
            0x00,
        ];

        let blob = Blob::from(&data).unwrap();
        assert_eq!(blob.get(1).unwrap(), &[0x06, 0x08, 0x0A]);
        assert_eq!(blob.get(5).unwrap(), &[0x20, 0x00]);
        assert!(blob.get(8).unwrap().is_empty());
        assert!(blob.get(0).unwrap().is_empty());
        assert!(blob.get(9).is_err());
    }

    #[test]
    fn truncated() {
        let data = [0x00, 0x05, 0x01, 0x02];
        let blob = Blob::from(&data).unwrap();
        assert!(matches!(blob.get(1), Err(OutOfBounds)));
        assert!(Blob::from(&[0x01]).is_err());
    }
}
