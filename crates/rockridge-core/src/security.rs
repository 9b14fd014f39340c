//! Bounds and overflow validation helpers.
//!
//! A malformed image must never cause a read outside the mapped region or an
//! arithmetic overflow to wrap into a false-positive bounds check. Every
//! offset/length computation in [`crate::volume`], [`crate::walk`], and
//! [`crate::susp`] goes through one of these helpers instead of raw
//! arithmetic.

use crate::error::Error;

/// Logical block size in practice; read from the PVD but sanity-checked
/// against this upper bound before being used to scale any offset.
pub const MAX_BLOCK_SIZE: u32 = 8192;

/// Upper bound on path components, matching spec's `PathComponents` limit.
pub const MAX_PATH_COMPONENTS: usize = 32;

/// Upper bound on a single path component's byte length.
pub const MAX_COMPONENT_LEN: usize = 255;

/// Cap on the approximate file count `statfs` derives from the path table.
pub const MAX_STATFS_FILE_COUNT: usize = 65_536;

/// Multiply two `u64` values, failing on overflow instead of wrapping.
pub fn checked_mul_u64(a: u64, b: u64, context: &str) -> Result<u64, Error> {
    a.checked_mul(b)
        .ok_or_else(|| Error::malformed_volume(format!("{context}: multiplication overflow")))
}

/// Add two `u64` values, failing on overflow instead of wrapping.
pub fn checked_add_u64(a: u64, b: u64, context: &str) -> Result<u64, Error> {
    a.checked_add(b)
        .ok_or_else(|| Error::malformed_volume(format!("{context}: addition overflow")))
}

/// Convert a `u64` to `usize`, failing rather than truncating on 32-bit
/// platforms.
pub fn u64_to_usize(value: u64, context: &str) -> Result<usize, Error> {
    value
        .try_into()
        .map_err(|_| Error::malformed_volume(format!("{context}: value {value} exceeds usize")))
}

/// Require that `[offset, offset+len)` lies within `image_len`.
pub fn require_in_bounds(offset: u64, len: u64, image_len: u64, context: &str) -> Result<(), Error> {
    let end = checked_add_u64(offset, len, context)?;
    if end > image_len {
        return Err(Error::malformed_volume(format!(
            "{context}: range [{offset}, {end}) exceeds image length {image_len}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checked_mul_overflow_fails() {
        assert!(checked_mul_u64(u64::MAX, 2, "test").is_err());
    }

    #[test]
    fn checked_mul_ok() {
        assert_eq!(checked_mul_u64(2048, 40, "test").unwrap(), 81_920);
    }

    #[test]
    fn bounds_check_rejects_out_of_range() {
        assert!(require_in_bounds(1000, 100, 1050, "extent").is_err());
        assert!(require_in_bounds(1000, 50, 1050, "extent").is_ok());
    }

    #[test]
    fn bounds_check_rejects_offset_overflow() {
        assert!(require_in_bounds(u64::MAX - 10, 100, u64::MAX, "extent").is_err());
    }
}
