use std::{ffi::CStr, str};

use crate::{Error::OutOfBounds, Result};

/// The `#Strings` heap: NUL-terminated UTF-8 identifiers.
pub struct Strings<'a> {
    data: &'a [u8],
}

impl<'a> Strings<'a> {
    /// Wrap the raw heap.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap does not start with the empty string.
    pub fn from(data: &'a [u8]) -> Result<Strings<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Provided #Strings heap is empty"));
        }

        Ok(Strings { data })
    }

    /// The string starting at `index`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] for an index past the heap and
    /// [`crate::Error::Malformed`] for unterminated or non UTF-8 data.
    pub fn get(&self, index: usize) -> Result<&'a str> {
        if index >= self.data.len() {
            return Err(OutOfBounds);
        }

        CStr::from_bytes_until_nul(&self.data[index..])
            .ok()
            .and_then(|result| result.to_str().ok())
            .ok_or_else(|| malformed_error!("Invalid string at index - {}", index))
    }

    /// Like [`Strings::get`], but maps index 0 (and the empty string) to `None`.
    ///
    /// # Errors
    /// Same as [`Strings::get`].
    pub fn get_opt(&self, index: usize) -> Result<Option<&'a str>> {
        if index == 0 {
            return Ok(None);
        }

        let value = self.get(index)?;
        Ok((!value.is_empty()).then_some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crafted() {
        let data = b"\0<Module>\0System.Console\0WriteLine\0";
        let strings = Strings::from(data).unwrap();

        assert_eq!(strings.get(1).unwrap(), "<Module>");
        assert_eq!(strings.get(10).unwrap(), "System.Console");
        assert_eq!(strings.get(17).unwrap(), "Console");
        assert_eq!(strings.get(25).unwrap(), "WriteLine");
        assert_eq!(strings.get(0).unwrap(), "");
        assert_eq!(strings.get_opt(0).unwrap(), None);
        assert_eq!(strings.get_opt(10).unwrap(), Some("System.Console"));
        assert!(strings.get(data.len()).is_err());
    }

    #[test]
    fn invalid() {
        assert!(Strings::from(b"").is_err());
        assert!(Strings::from(b"A\0").is_err());

        let strings = Strings::from(b"\0abc").unwrap();
        assert!(strings.get(1).is_err());
    }
}
