//! Memory-mapped disc image: opens a file read-only and exposes its bytes
//! as an immutable slice for [`rockridge_core`] to parse directly, with no
//! copying and no internal cursor — the decoder is a pure function over
//! `&[u8]`, so there's nothing here to seek.

use crate::error::{Error, Result};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// Upper bound on how large a file this crate will map. Prevents a hostile
/// or corrupt "image" path (e.g. a block device or sparse file) from
/// exhausting address space.
pub const MAX_MMAP_SIZE: u64 = 16 * 1024 * 1024 * 1024;

/// A read-only memory-mapped disc image.
pub struct MappedImage {
    mmap: Mmap,
}

fn validate_metadata(metadata: &std::fs::Metadata) -> Result<()> {
    if !metadata.is_file() {
        return Err(Error::NotARegularFile);
    }
    if metadata.len() > MAX_MMAP_SIZE {
        return Err(Error::TooLarge {
            size: metadata.len(),
            limit: MAX_MMAP_SIZE,
        });
    }
    Ok(())
}

impl MappedImage {
    /// Open and map `path` read-only.
    ///
    /// # Safety
    ///
    /// `Mmap::map` is unsafe because the file could be truncated or
    /// modified by another process while mapped, which would turn the
    /// resulting out-of-bounds access into undefined behavior rather than a
    /// bounds-checked error. The caller is responsible for not doing that to
    /// a mounted image; every read this crate performs on top of the
    /// mapping is still bounds-checked against the mapped length as
    /// recorded at open time.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_file(&file)
    }

    /// Map an already-open file read-only. See [`Self::open`] for the
    /// safety rationale.
    pub fn from_file(file: &File) -> Result<Self> {
        let metadata = file.metadata()?;
        validate_metadata(&metadata)?;
        let mmap = unsafe { Mmap::map(file)? };
        Ok(Self { mmap })
    }

    pub fn data(&self) -> &[u8] {
        &self.mmap
    }

    pub fn len(&self) -> u64 {
        self.mmap.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn maps_file_contents() {
        let mut tmpfile = NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..100).collect();
        tmpfile.write_all(&data).unwrap();
        tmpfile.flush().unwrap();

        let mapped = MappedImage::open(tmpfile.path()).unwrap();
        assert_eq!(mapped.len(), 100);
        assert!(!mapped.is_empty());
        assert_eq!(mapped.data(), data.as_slice());
    }

    #[test]
    fn rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(MappedImage::open(dir.path()), Err(Error::NotARegularFile)));
    }
}
