//! Binary view layer: bounds-checked typed accessors over a byte region.
//!
//! Every read here is validated against the slice length before any
//! arithmetic happens, per the bounds-safety testable property in the
//! specification this crate implements. Grounded in the
//! `BothEndian<T>`/`IsoDateTime`/`IsoAsciiDateTime` pattern of the example
//! this crate was adapted from, generalized from struct-copying accessors to
//! free functions so a truncated slice never causes an out-of-bounds panic.

use crate::error::Error;

/// Five-byte ISO-9660 standard identifier, required on every volume
/// descriptor.
pub const STANDARD_IDENTIFIER: &[u8; 5] = b"CD001";

fn require_len(data: &[u8], offset: usize, len: usize, context: &str) -> Result<(), Error> {
    if offset.checked_add(len).map_or(true, |end| end > data.len()) {
        return Err(Error::malformed_volume(format!(
            "{context}: need {len} bytes at offset {offset}, have {}",
            data.len()
        )));
    }
    Ok(())
}

pub fn read_u8(data: &[u8], offset: usize) -> Result<u8, Error> {
    require_len(data, offset, 1, "u8")?;
    Ok(data[offset])
}

pub fn read_u16_le(data: &[u8], offset: usize) -> Result<u16, Error> {
    require_len(data, offset, 2, "u16")?;
    Ok(u16::from_le_bytes([data[offset], data[offset + 1]]))
}

pub fn read_u32_le(data: &[u8], offset: usize) -> Result<u32, Error> {
    require_len(data, offset, 4, "u32")?;
    Ok(u32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ]))
}

/// Read the little-endian half of a both-endian `u16` field. The field
/// occupies 4 bytes on disc (2 LE + 2 BE); the BE half is skipped but still
/// accounted for in the bounds check, per the "both-endian integer" note in
/// the binary view contract.
pub fn read_both_endian_u16(data: &[u8], offset: usize) -> Result<u16, Error> {
    require_len(data, offset, 4, "both-endian u16")?;
    read_u16_le(data, offset)
}

/// Read the little-endian half of a both-endian `u32` field (8 bytes on
/// disc: 4 LE + 4 BE).
pub fn read_both_endian_u32(data: &[u8], offset: usize) -> Result<u32, Error> {
    require_len(data, offset, 8, "both-endian u32")?;
    read_u32_le(data, offset)
}

/// Read a fixed-width byte slice without copying.
pub fn read_bytes<'a>(data: &'a [u8], offset: usize, len: usize) -> Result<&'a [u8], Error> {
    require_len(data, offset, len, "bytes")?;
    Ok(&data[offset..offset + len])
}

/// Decode a pad-right ISO-9660 string field (a-characters or d-characters),
/// trimming trailing spaces.
pub fn read_padded_str(data: &[u8], offset: usize, len: usize) -> Result<String, Error> {
    let raw = read_bytes(data, offset, len)?;
    Ok(String::from_utf8_lossy(raw).trim_end().to_string())
}

/// Header common to every volume descriptor: type code, standard identifier,
/// and version.
#[derive(Debug, Clone, Copy)]
pub struct VolumeDescriptorHeader {
    pub descriptor_type: u8,
    pub version: u8,
}

/// Validate and read the 7-byte header at the start of a 2048-byte sector.
/// Fails with `MalformedVolume` if the sector is truncated, the identifier
/// isn't `CD001`, or the version isn't 1.
pub fn read_volume_descriptor_header(
    data: &[u8],
    offset: usize,
) -> Result<VolumeDescriptorHeader, Error> {
    require_len(data, offset, 7, "volume descriptor header")?;
    let descriptor_type = data[offset];
    let identifier = &data[offset + 1..offset + 6];
    if identifier != STANDARD_IDENTIFIER {
        return Err(Error::malformed_volume(format!(
            "bad standard identifier {:?}",
            identifier
        )));
    }
    let version = data[offset + 6];
    if version != 1 {
        return Err(Error::malformed_volume(format!(
            "unsupported volume descriptor version {version}"
        )));
    }
    Ok(VolumeDescriptorHeader {
        descriptor_type,
        version,
    })
}

/// Compact 7-byte date/time used by directory records.
#[derive(Debug, Clone, Copy)]
pub struct CompactDateTime {
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    /// Offset from GMT-12 in 15-minute intervals. Preserved but never
    /// applied (documented deviation: conversion uses host local time).
    pub tz_offset: i8,
}

impl CompactDateTime {
    pub fn from_bytes(data: &[u8], offset: usize) -> Result<Self, Error> {
        require_len(data, offset, 7, "compact datetime")?;
        Ok(Self {
            year: data[offset],
            month: data[offset + 1],
            day: data[offset + 2],
            hour: data[offset + 3],
            minute: data[offset + 4],
            second: data[offset + 5],
            tz_offset: data[offset + 6] as i8,
        })
    }

    /// Convert to a Unix timestamp using the host's local time zone,
    /// ignoring `tz_offset` (matches the documented source behavior).
    pub fn to_unix_timestamp(&self) -> Option<i64> {
        use chrono::{NaiveDate, NaiveDateTime};
        let year = 1900 + self.year as i32;
        let date = NaiveDate::from_ymd_opt(year, self.month as u32, self.day as u32)?;
        let dt: NaiveDateTime = date.and_hms_opt(
            self.hour as u32,
            self.minute as u32,
            self.second as u32,
        )?;
        Some(dt.and_utc().timestamp())
    }
}

/// Decimal 17-byte date/time used by the Primary Volume Descriptor and by
/// long-form Rock Ridge timestamps. All-space digit fields with a zero
/// timezone mean "unspecified".
#[derive(Debug, Clone)]
pub struct DecimalDateTime {
    pub year: Option<u32>,
    pub month: Option<u32>,
    pub day: Option<u32>,
    pub hour: Option<u32>,
    pub minute: Option<u32>,
    pub second: Option<u32>,
    pub hundredths: Option<u32>,
    pub tz_offset: i8,
}

fn lenient_digits(raw: &[u8]) -> Option<u32> {
    let text = std::str::from_utf8(raw).ok()?;
    if text.chars().all(|c| c == ' ') {
        return None;
    }
    text.trim().parse().ok()
}

impl DecimalDateTime {
    pub fn from_bytes(data: &[u8], offset: usize) -> Result<Self, Error> {
        require_len(data, offset, 17, "decimal datetime")?;
        let field = |start: usize, len: usize| lenient_digits(&data[offset + start..offset + start + len]);
        Ok(Self {
            year: field(0, 4),
            month: field(4, 2),
            day: field(6, 2),
            hour: field(8, 2),
            minute: field(10, 2),
            second: field(12, 2),
            hundredths: field(14, 2),
            tz_offset: data[offset + 16] as i8,
        })
    }

    /// True if every digit field is unspecified and the timezone byte is 0.
    pub fn is_unspecified(&self) -> bool {
        self.tz_offset == 0
            && self.year.is_none()
            && self.month.is_none()
            && self.day.is_none()
            && self.hour.is_none()
            && self.minute.is_none()
            && self.second.is_none()
    }

    /// Convert to a Unix timestamp using the host's local time zone,
    /// ignoring `tz_offset`. Returns `None` if unspecified or any required
    /// field failed to parse.
    pub fn to_unix_timestamp(&self) -> Option<i64> {
        use chrono::NaiveDate;
        if self.is_unspecified() {
            return None;
        }
        let date = NaiveDate::from_ymd_opt(self.year? as i32, self.month?, self.day?)?;
        let dt = date.and_hms_opt(self.hour?, self.minute?, self.second?)?;
        Some(dt.and_utc().timestamp())
    }
}
