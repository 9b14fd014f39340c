//! Error taxonomy for the Rock Ridge / ISO-9660 core.

use thiserror::Error;

/// Errors the core can raise. Every variant corresponds to an error kind in
/// the host callback surface (see [`crate::callbacks`]); there is no
/// `OutOfMemory` variant here because that condition belongs to the host's
/// directory filler, not to this crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A path component did not match any child.
    #[error("not found: {0}")]
    NotFound(String),

    /// An interior component (or a trailing-slash final component) resolved
    /// to a non-directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// A file-opening operation targeted a directory.
    #[error("is a directory: {0}")]
    IsADirectory(String),

    /// The access check failed for the caller's credentials.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A write-ish operation was attempted against this read-only filesystem.
    #[error("read-only filesystem")]
    ReadOnly,

    /// A path component exceeded 255 bytes, or a path exceeded 32 components.
    #[error("name too long: {0}")]
    NameTooLong(String),

    /// A structural check failed: bad descriptor, missing PVD, unterminated
    /// descriptor chain, extent out of range, or a CE field pointing outside
    /// the image.
    #[error("malformed volume: {0}")]
    MalformedVolume(String),
}

/// Result type alias for this crate's operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    pub fn not_a_directory(msg: impl Into<String>) -> Self {
        Error::NotADirectory(msg.into())
    }

    pub fn is_a_directory(msg: impl Into<String>) -> Self {
        Error::IsADirectory(msg.into())
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Error::PermissionDenied(msg.into())
    }

    pub fn name_too_long(msg: impl Into<String>) -> Self {
        Error::NameTooLong(msg.into())
    }

    pub fn malformed_volume(msg: impl Into<String>) -> Self {
        Error::MalformedVolume(msg.into())
    }
}
