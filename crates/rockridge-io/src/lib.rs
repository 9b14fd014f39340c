//! # rockridge-io
//!
//! Opens a disc image file as a read-only memory-mapped byte region. This
//! crate has no knowledge of ISO-9660 or Rock Ridge; it exists purely to get
//! a validated `&[u8]` in front of [`rockridge_core`] with as little
//! overhead as possible.

pub mod error;
pub mod mapped;

pub use error::{Error, Result};
pub use mapped::{MappedImage, MAX_MMAP_SIZE};
