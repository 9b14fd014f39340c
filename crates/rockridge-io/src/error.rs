//! Errors raised while opening a disc image for mapping.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("only regular files can be memory-mapped")]
    NotARegularFile,

    #[error("file size {size} exceeds memory mapping limit {limit}")]
    TooLarge { size: u64, limit: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;
