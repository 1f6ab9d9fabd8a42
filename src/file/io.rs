//! Bounds-checked little-endian reads over raw image bytes.
//!
//! Every multi-byte quantity in a PE image and in ECMA-335 metadata is stored little-endian.
//! The helpers here are the single place where raw slices are turned into integers; all
//! of them fail with [`crate::Error::OutOfBounds`] instead of panicking on truncated input.
//!
//! ```rust,ignore
//! use cilguard::file::io::read_le_at;
//!
//! let data = [0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x00, 0x00];
//! let mut offset = 0;
//!
//! let first: u16 = read_le_at(&data, &mut offset)?;  // offset: 0 -> 2
//! let second: u16 = read_le_at(&data, &mut offset)?; // offset: 2 -> 4
//! let third: u32 = read_le_at(&data, &mut offset)?;  // offset: 4 -> 8
//! assert_eq!((first, second, third, offset), (1, 2, 3, 8));
//! # Ok::<(), cilguard::Error>(())
//! ```

use crate::{Error::OutOfBounds, Result};

/// Primitive types that can be decoded from a fixed-size little-endian byte array.
pub trait CilIO: Sized {
    /// The fixed-size byte representation, e.g. `[u8; 4]` for `u32`
    type Bytes: Sized + for<'a> TryFrom<&'a [u8]>;

    /// Convert from the little-endian byte representation
    fn from_le_bytes(bytes: Self::Bytes) -> Self;
}

macro_rules! impl_cil_io {
    ($($ty:ty),* $(,)?) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }
            }
        )*
    };
}

impl_cil_io!(u8, i8, u16, i16, u32, i32, u64, i64);

/// Read a `T` from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than `T`.
pub fn read_le<T: CilIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Read a `T` at `offset` and advance `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the read would pass the end of `data`.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(OutOfBounds);
    };

    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;

    Ok(T::from_le_bytes(read))
}

/// Read a heap or table index that is either 2 or 4 bytes wide.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the read would pass the end of `data`.
pub fn read_le_at_dyn(data: &[u8], offset: &mut usize, is_large: bool) -> Result<u32> {
    let res = if is_large {
        read_le_at::<u32>(data, offset)?
    } else {
        u32::from(read_le_at::<u16>(data, offset)?)
    };

    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_BUFFER: [u8; 8] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

    #[test]
    fn read_le_values() {
        assert_eq!(read_le::<u8>(&TEST_BUFFER).unwrap(), 0x01);
        assert_eq!(read_le::<u16>(&TEST_BUFFER).unwrap(), 0x0201);
        assert_eq!(read_le::<u32>(&TEST_BUFFER).unwrap(), 0x0403_0201);
        assert_eq!(read_le::<u64>(&TEST_BUFFER).unwrap(), 0x0807_0605_0403_0201);
        assert_eq!(read_le::<i8>(&[0xFF]).unwrap(), -1);
    }

    #[test]
    fn read_le_at_advances() {
        let mut offset = 2;
        assert_eq!(read_le_at::<u16>(&TEST_BUFFER, &mut offset).unwrap(), 0x0403);
        assert_eq!(offset, 4);
        assert_eq!(read_le_at::<u32>(&TEST_BUFFER, &mut offset).unwrap(), 0x0807_0605);
        assert_eq!(offset, 8);
    }

    #[test]
    fn read_le_at_dyn_widths() {
        let mut offset = 0;
        assert_eq!(read_le_at_dyn(&TEST_BUFFER, &mut offset, false).unwrap(), 0x0201);
        assert_eq!(read_le_at_dyn(&TEST_BUFFER, &mut offset, true).unwrap(), 0x0605_0403);
        assert_eq!(offset, 6);
    }

    #[test]
    fn errors() {
        assert!(matches!(read_le::<u64>(&TEST_BUFFER[..7]), Err(OutOfBounds)));

        let mut offset = 7;
        assert!(read_le_at::<u16>(&TEST_BUFFER, &mut offset).is_err());
        assert_eq!(offset, 7);

        let mut offset = usize::MAX;
        assert!(read_le_at::<u8>(&TEST_BUFFER, &mut offset).is_err());
    }
}
