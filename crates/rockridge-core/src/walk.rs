//! Directory extent walker: iterates the `DirectoryRecord`s inside one
//! directory's extent, tolerating the zero-length padding record ISO-9660
//! writers use to fill out the tail of each logical sector.

use crate::security::{checked_mul_u64, require_in_bounds, u64_to_usize};
use crate::volume::{record_at, DirectoryRecord};
use crate::Error;

/// Lazily yields the non-padding [`DirectoryRecord`]s of one directory
/// extent, sector by sector.
pub struct DirectoryIter<'a> {
    data: &'a [u8],
    extent_start: usize,
    extent_end: usize,
    block_size: usize,
    cursor: usize,
}

impl<'a> DirectoryIter<'a> {
    pub fn new(data: &'a [u8], record: &DirectoryRecord<'a>, block_size: u32) -> Result<Self, Error> {
        let start = checked_mul_u64(record.extent_location as u64, block_size as u64, "directory extent")?;
        require_in_bounds(start, record.extent_length as u64, data.len() as u64, "directory extent")?;
        let start = u64_to_usize(start, "directory extent start")?;
        let end = start + record.extent_length as usize;
        Ok(Self {
            data,
            extent_start: start,
            extent_end: end,
            block_size: block_size as usize,
            cursor: start,
        })
    }

    /// Advance `cursor` to the start of the next sector within the extent.
    fn skip_to_next_sector(&mut self) {
        let sectors_in = (self.cursor - self.extent_start) / self.block_size;
        self.cursor = self.extent_start + (sectors_in + 1) * self.block_size;
    }
}

impl<'a> Iterator for DirectoryIter<'a> {
    type Item = Result<DirectoryRecord<'a>, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.cursor >= self.extent_end {
                return None;
            }
            let record = match record_at(self.data, self.cursor) {
                Ok(r) => r,
                Err(e) => return Some(Err(e)),
            };

            if record.is_padding() {
                // Zero-length record marks the unused tail of this sector;
                // resume scanning at the next sector boundary.
                self.skip_to_next_sector();
                continue;
            }

            self.cursor += record.length as usize;
            return Some(Ok(record));
        }
    }
}

/// Iterate the children of `directory`, in on-disc order (this always
/// yields `.` and `..` first, since ISO-9660 writers place them first in
/// the extent).
pub fn children<'a>(
    data: &'a [u8],
    directory: &DirectoryRecord<'a>,
    block_size: u32,
) -> Result<DirectoryIter<'a>, Error> {
    DirectoryIter::new(data, directory, block_size)
}
