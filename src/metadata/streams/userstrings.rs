use crate::Result;

/// The `#US` heap: length-prefixed UTF-16 string literals referenced by `ldstr`.
///
/// Only bounds are needed to validate `ldstr` operands; the contents are never decoded.
pub struct UserStrings<'a> {
    data: &'a [u8],
}

impl<'a> UserStrings<'a> {
    /// Wrap the raw heap.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the heap does not start with the empty entry.
    pub fn from(data: &'a [u8]) -> Result<UserStrings<'a>> {
        if data.is_empty() || data[0] != 0 {
            return Err(malformed_error!("Invalid memory for #US heap"));
        }

        Ok(UserStrings { data })
    }

    /// Returns `true` if `index` points inside the heap (and is not the leading empty entry)
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        index != 0 && index < self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds() {
        let heap = UserStrings::from(&[0x00, 0x03, 0x41, 0x00, 0x00]).unwrap();

        assert!(heap.contains(1));
        assert!(heap.contains(4));
        assert!(!heap.contains(0));
        assert!(!heap.contains(5));

        assert!(UserStrings::from(&[]).is_err());
        assert!(UserStrings::from(&[0x01]).is_err());
    }
}
