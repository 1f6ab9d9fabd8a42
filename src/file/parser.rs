//! Cursor-based reader for metadata blobs and method bodies.
//!
//! [`Parser`] walks a byte slice with bounds-checked reads. On top of the plain little-endian
//! primitives it understands the ECMA-335 II.23.2 compressed encodings used throughout
//! signature blobs.
//!
//! ```rust,ignore
//! use cilguard::file::parser::Parser;
//!
//! // Compressed uint 0x2E followed by a compressed TypeRef token (row 3)
//! let data = [0x2E, 0x0D];
//! let mut parser = Parser::new(&data);
//!
//! assert_eq!(parser.read_compressed_uint()?, 0x2E);
//! assert_eq!(parser.read_compressed_token()?.value(), 0x0100_0003);
//! # Ok::<(), cilguard::Error>(())
//! ```

use crate::{
    file::io::{read_le_at, CilIO},
    metadata::token::Token,
    Result,
};

/// A forward-only cursor over a byte slice.
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new [`Parser`] positioned at the start of `data`
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns `true` while the cursor has not reached the end of the buffer
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Move the cursor to `pos`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` is past the end of the buffer.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = pos;
        Ok(())
    }

    /// Move the cursor forward by one byte.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the cursor is already at the end.
    pub fn advance(&mut self) -> Result<()> {
        self.advance_by(1)
    }

    /// Move the cursor forward by `step` bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if advancing would pass the end of the buffer.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        match self.position.checked_add(step) {
            Some(end) if end <= self.data.len() => {
                self.position = end;
                Ok(())
            }
            _ => Err(out_of_bounds_error!()),
        }
    }

    /// Current cursor position
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Look at the next byte without consuming it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the cursor is at the end.
    pub fn peek_byte(&self) -> Result<u8> {
        self.data
            .get(self.position)
            .copied()
            .ok_or(out_of_bounds_error!())
    }

    /// Move the cursor to the next multiple of `alignment`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the aligned position is past the end.
    pub fn align(&mut self, alignment: usize) -> Result<()> {
        let padding = (alignment - (self.position % alignment)) % alignment;
        self.advance_by(padding)
    }

    /// Read a little-endian `T` and advance past it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if reading would pass the end of the buffer.
    pub fn read_le<T: CilIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Borrow the next `length` bytes and advance past them.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `length` bytes remain.
    pub fn read_bytes(&mut self, length: usize) -> Result<&'a [u8]> {
        let start = self.position;
        self.advance_by(length)?;
        Ok(&self.data[start..self.position])
    }

    /// Read a compressed unsigned integer (ECMA-335 II.23.2).
    ///
    /// - `0xxxxxxx`: 1 byte, values up to 0x7F
    /// - `10xxxxxx xxxxxxxx`: 2 bytes, values up to 0x3FFF
    /// - `110xxxxx` + 3 bytes: 4 bytes, values up to 0x1FFF_FFFF
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated input, or [`crate::Error::Malformed`]
    /// if the lead byte is not a valid encoding.
    pub fn read_compressed_uint(&mut self) -> Result<u32> {
        let first_byte = self.read_le::<u8>()?;

        if (first_byte & 0x80) == 0 {
            return Ok(u32::from(first_byte));
        }

        if (first_byte & 0xC0) == 0x80 {
            let second_byte = self.read_le::<u8>()?;
            return Ok(((u32::from(first_byte) & 0x3F) << 8) | u32::from(second_byte));
        }

        if (first_byte & 0xE0) == 0xC0 {
            let b1 = u32::from(self.read_le::<u8>()?);
            let b2 = u32::from(self.read_le::<u8>()?);
            let b3 = u32::from(self.read_le::<u8>()?);
            return Ok(((u32::from(first_byte) & 0x1F) << 24) | (b1 << 16) | (b2 << 8) | b3);
        }

        Err(malformed_error!("Invalid compressed uint - {}", first_byte))
    }

    /// Read a `TypeDefOrRefOrSpecEncoded` token (ECMA-335 II.23.2.8).
    ///
    /// The two low bits select the table (0 = TypeDef, 1 = TypeRef, 2 = TypeSpec), the
    /// remaining bits are the row.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for the reserved tag `3`.
    pub fn read_compressed_token(&mut self) -> Result<Token> {
        let compressed_token = self.read_compressed_uint()?;

        let table: u32 = match compressed_token & 0x3 {
            0x0 => 0x0200_0000,
            0x1 => 0x0100_0000,
            0x2 => 0x1B00_0000,
            _ => {
                return Err(malformed_error!(
                    "Invalid compressed token - {}",
                    compressed_token
                ))
            }
        };

        Ok(Token::new(table | (compressed_token >> 2)))
    }
}
