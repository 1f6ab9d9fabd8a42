use std::marker::PhantomData;

use rayon::prelude::*;

use crate::{
    metadata::tables::{TableId, TableInfo},
    Result,
};

/// A row type that can be decoded from its on-disk representation.
pub trait RowReadable: Sized + Send {
    /// The table this row type belongs to
    const TABLE_ID: TableId;

    /// Decode the row `rid` starting at `offset`, advancing `offset` past it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncated input.
    fn row_read(data: &[u8], offset: &mut usize, rid: u32, sizes: &TableInfo) -> Result<Self>;
}

/// A zero-copy view over one metadata table.
pub struct MetadataTable<'a, T> {
    data: &'a [u8],
    row_count: u32,
    row_size: u32,
    sizes: &'a TableInfo,
    _phantom: PhantomData<fn() -> T>,
}

impl<'a, T: RowReadable> MetadataTable<'a, T> {
    /// Create a view over `row_count` rows laid out at the start of `data`
    #[must_use]
    pub fn new(data: &'a [u8], row_count: u32, sizes: &'a TableInfo) -> Self {
        MetadataTable {
            data,
            row_count,
            row_size: sizes.row_size(T::TABLE_ID),
            sizes,
            _phantom: PhantomData,
        }
    }

    /// Size of the table in bytes
    #[must_use]
    pub fn size(&self) -> u64 {
        u64::from(self.row_count) * u64::from(self.row_size)
    }

    /// Size of one row in bytes
    #[must_use]
    pub fn row_size(&self) -> u32 {
        self.row_size
    }

    /// Number of rows
    #[must_use]
    pub fn row_count(&self) -> u32 {
        self.row_count
    }

    /// Read row `rid` (1-based).
    ///
    /// # Errors
    /// Returns [`crate::Error::Invariant`] if `rid` is outside the table, or a read error if
    /// the row is truncated.
    pub fn get(&self, rid: u32) -> Result<T> {
        if rid == 0 || rid > self.row_count {
            return Err(invariant_error!(
                "Row {} out of range for {:?} ({} rows)",
                rid,
                T::TABLE_ID,
                self.row_count
            ));
        }

        let mut offset = (rid as usize - 1) * self.row_size as usize;
        T::row_read(self.data, &mut offset, rid, self.sizes)
    }

    /// Iterate all rows in order
    #[must_use]
    pub fn iter(&self) -> TableIterator<'_, 'a, T> {
        TableIterator {
            table: self,
            current_row: 0,
            current_offset: 0,
        }
    }

    /// Read all rows on the rayon pool. Row order is preserved in the result.
    ///
    /// # Errors
    /// Returns the first read error encountered.
    pub fn par_collect(&self) -> Result<Vec<T>>
    where
        T: Send,
    {
        (1..=self.row_count)
            .into_par_iter()
            .map(|rid| self.get(rid))
            .collect()
    }
}

/// Sequential row iterator; yields `Err` once and stops on a truncated row.
pub struct TableIterator<'t, 'a, T> {
    table: &'t MetadataTable<'a, T>,
    current_row: u32,
    current_offset: usize,
}

impl<T: RowReadable> Iterator for TableIterator<'_, '_, T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_row >= self.table.row_count {
            return None;
        }

        let row = T::row_read(
            self.table.data,
            &mut self.current_offset,
            self.current_row + 1,
            self.table.sizes,
        );

        self.current_row = if row.is_ok() {
            self.current_row + 1
        } else {
            self.table.row_count
        };

        Some(row)
    }
}
