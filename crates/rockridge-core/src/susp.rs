//! SUSP / Rock Ridge system-use field walker.
//!
//! Walks the system-use area of a directory record, decoding the handful of
//! signatures this crate understands (`SP`, `ST`, `CE`, `PX`, `NM`, `TF`) and
//! skipping everything else (`ER`, `ES`, `PN`, `SL`, `CL`, `PD`, `RR`, and any
//! other two-byte signature) rather than failing on it.
//!
//! This walker never fails: a malformed entry (bad length, a `CE` pointing
//! outside the image, a truncated timestamp) silently terminates the walk
//! for that record and whatever attributes were already parsed are returned.
//! A corrupt Rock Ridge extension degrades a record to its plain ISO-9660
//! attributes; it never fails the surrounding `resolve`/`readdir`/`getattr`.

use crate::view::{read_both_endian_u32 as both_endian_u32, CompactDateTime, DecimalDateTime};

const SIG_SP: [u8; 2] = *b"SP";
const SIG_ST: [u8; 2] = *b"ST";
const SIG_CE: [u8; 2] = *b"CE";
const SIG_PX: [u8; 2] = *b"PX";
const SIG_NM: [u8; 2] = *b"NM";
const SIG_TF: [u8; 2] = *b"TF";

/// Check bytes that follow an `SP` entry's 4-byte header, per SUSP.
const SP_CHECK_BYTES: [u8; 2] = [0xBE, 0xEF];

const NM_CONTINUE: u8 = 0x01;

const TF_CREATION: u8 = 0x01;
const TF_MODIFY: u8 = 0x02;
const TF_ACCESS: u8 = 0x04;
const TF_ATTRIBUTES: u8 = 0x08;
const TF_BACKUP: u8 = 0x10;
const TF_EXPIRATION: u8 = 0x20;
const TF_EFFECTIVE: u8 = 0x40;
const TF_LONG_FORM: u8 = 0x80;

/// Rock Ridge attributes accumulated from the system-use area of one
/// directory record. Any field left `None` means the corresponding SUSP
/// entry was absent; callers fall back to the plain ISO-9660 directory
/// record fields in that case.
#[derive(Debug, Clone, Default)]
pub struct RockRidgeAttributes {
    pub mode: Option<u32>,
    pub nlinks: Option<u32>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub inode: Option<u64>,
    /// Alternate filename, concatenated across continued `NM` entries. A
    /// deliberate deviation from the reference decoder, which overwrites
    /// rather than concatenates; concatenation is what the `NM` continuation
    /// bit is documented to mean.
    pub name: Option<Vec<u8>>,
    pub creation_time: Option<i64>,
    pub modification_time: Option<i64>,
    pub access_time: Option<i64>,
    pub backup_time: Option<i64>,
    pub expiration_time: Option<i64>,
    pub effective_time: Option<i64>,
}

impl RockRidgeAttributes {
    pub fn has_mode(&self) -> bool {
        self.mode.is_some()
    }
}

struct EntryHeader {
    signature: [u8; 2],
    length: u8,
    #[allow(dead_code)]
    version: u8,
}

/// Read one entry's header. Returns `None` both for ordinary end-of-area
/// padding (a zero byte, or a truncated tail) and for a malformed header
/// (implausible length) — either way, the walk above simply stops.
fn read_entry_header(buf: &[u8], offset: usize) -> Option<EntryHeader> {
    if offset + 4 > buf.len() {
        return None;
    }
    if buf[offset] == 0 {
        return None;
    }
    let signature = [buf[offset], buf[offset + 1]];
    let length = buf[offset + 2];
    let version = buf[offset + 3];
    if length < 4 || offset + length as usize > buf.len() {
        return None;
    }
    Some(EntryHeader {
        signature,
        length,
        version,
    })
}

/// Extract `len_skp` from a root record's `SP` entry, if `system_use`'s very
/// first entry is a well-formed `SP`. Returns `None` otherwise (no skip).
pub fn detect_len_skp(system_use: &[u8]) -> Option<u32> {
    let header = read_entry_header(system_use, 0)?;
    if header.signature != SIG_SP || header.length < 7 {
        return None;
    }
    if system_use.get(4..6)? != SP_CHECK_BYTES {
        return None;
    }
    Some(*system_use.get(6)? as u32)
}

/// Returns `None` if the entry is malformed, signaling the walk should stop.
fn parse_px(attrs: &mut RockRidgeAttributes, buf: &[u8], offset: usize, length: u8) -> Option<()> {
    // Header (4 bytes) + mode/nlinks/uid/gid (8 bytes each) = 36; + inode = 44.
    if length < 36 {
        return None;
    }
    let body = offset + 4;
    attrs.mode = Some(both_endian_u32(buf, body).ok()?);
    attrs.nlinks = Some(both_endian_u32(buf, body + 8).ok()?);
    attrs.uid = Some(both_endian_u32(buf, body + 16).ok()?);
    attrs.gid = Some(both_endian_u32(buf, body + 24).ok()?);
    if length as usize >= 44 {
        attrs.inode = Some(both_endian_u32(buf, body + 32).ok()? as u64);
    }
    Some(())
}

/// Returns the continuation flag, or `None` if the entry is malformed.
fn parse_nm(attrs: &mut RockRidgeAttributes, buf: &[u8], offset: usize, length: u8) -> Option<bool> {
    if length < 5 {
        return None;
    }
    let flags = buf[offset + 4];
    let payload = buf.get(offset + 5..offset + length as usize)?;

    if flags & 0x02 != 0 {
        attrs.name = Some(b".".to_vec());
        return Some(false);
    }
    if flags & 0x04 != 0 {
        attrs.name = Some(b"..".to_vec());
        return Some(false);
    }

    match attrs.name.as_mut() {
        Some(existing) => existing.extend_from_slice(payload),
        None => attrs.name = Some(payload.to_vec()),
    }
    Some(flags & NM_CONTINUE != 0)
}

fn parse_timestamp(buf: &[u8], offset: usize, long_form: bool) -> Option<(Option<i64>, usize)> {
    if long_form {
        let dt = DecimalDateTime::from_bytes(buf, offset).ok()?;
        Some((dt.to_unix_timestamp(), 17))
    } else {
        let dt = CompactDateTime::from_bytes(buf, offset).ok()?;
        Some((dt.to_unix_timestamp(), 7))
    }
}

/// Returns `None` if the entry or any timestamp inside it is malformed.
fn parse_tf(attrs: &mut RockRidgeAttributes, buf: &[u8], offset: usize, length: u8) -> Option<()> {
    if length < 5 {
        return None;
    }
    let flags = buf[offset + 4];
    let long_form = flags & TF_LONG_FORM != 0;
    let mut cursor = offset + 5;
    let end = offset + length as usize;

    // Timestamps are present in a fixed bit order, each field only emitted
    // if its flag bit is set.
    for (bit, slot) in [
        (TF_CREATION, 0u8),
        (TF_MODIFY, 1),
        (TF_ACCESS, 2),
        (TF_ATTRIBUTES, 3),
        (TF_BACKUP, 4),
        (TF_EXPIRATION, 5),
        (TF_EFFECTIVE, 6),
    ] {
        if flags & bit == 0 {
            continue;
        }
        if cursor > end {
            return None;
        }
        let (value, width) = parse_timestamp(buf, cursor, long_form)?;
        match slot {
            0 => attrs.creation_time = value,
            1 => attrs.modification_time = value,
            2 => attrs.access_time = value,
            4 => attrs.backup_time = value,
            5 => attrs.expiration_time = value,
            6 => attrs.effective_time = value,
            _ => {}
        }
        cursor += width;
    }
    Some(())
}

struct Continuation {
    block_location: u32,
    offset: u32,
    length: u32,
}

fn parse_ce(buf: &[u8], offset: usize, length: u8) -> Option<Continuation> {
    if length < 28 {
        return None;
    }
    let body = offset + 4;
    Some(Continuation {
        block_location: both_endian_u32(buf, body).ok()?,
        offset: both_endian_u32(buf, body + 8).ok()?,
        length: both_endian_u32(buf, body + 16).ok()?,
    })
}

/// Resolve a `CE` continuation area to a byte range within `image_data`,
/// bounds-checked. Returns `None` (rather than failing) if the area doesn't
/// fit, matching this walker's fail-open contract.
fn continuation_area<'a>(image_data: &'a [u8], ce: &Continuation, block_size: u32) -> Option<&'a [u8]> {
    let block_offset = (ce.block_location as u64).checked_mul(block_size as u64)?;
    let area_offset = block_offset.checked_add(ce.offset as u64)?;
    let end = area_offset.checked_add(ce.length as u64)?;
    if end > image_data.len() as u64 {
        return None;
    }
    let start = usize::try_from(area_offset).ok()?;
    let end = usize::try_from(end).ok()?;
    image_data.get(start..end)
}

/// Walk the system-use area of a directory record, decoding Rock Ridge
/// fields and following `CE` continuation areas elsewhere in `image_data`.
/// `block_size` is needed to turn a `CE` block location into a byte offset.
/// `skip` bytes are dropped from the head of `system_use` before the walk
/// begins (the `len_skp` established by a root record's `SP` field applies
/// to every other record's system-use area; pass `0` for the root record
/// itself, since that's where the `SP` field is found).
///
/// Never fails: a malformed entry silently terminates the walk, and
/// whatever attributes were parsed before the fault are returned.
pub fn read_attributes<'a>(
    image_data: &'a [u8],
    system_use: &'a [u8],
    block_size: u32,
    skip: u32,
) -> RockRidgeAttributes {
    let mut attrs = RockRidgeAttributes::default();

    let mut current: &'a [u8] = system_use.get(skip as usize..).unwrap_or(&[]);

    loop {
        let mut offset = 0usize;
        let mut pending_ce: Option<Continuation> = None;
        let mut malformed = false;

        while let Some(header) = read_entry_header(current, offset) {
            let ok = match header.signature {
                SIG_ST => {
                    offset = current.len();
                    break;
                }
                SIG_SP => Some(()),
                SIG_PX => parse_px(&mut attrs, current, offset, header.length),
                SIG_NM => parse_nm(&mut attrs, current, offset, header.length).map(|_| ()),
                SIG_TF => parse_tf(&mut attrs, current, offset, header.length),
                SIG_CE => match parse_ce(current, offset, header.length) {
                    Some(ce) => {
                        pending_ce = Some(ce);
                        Some(())
                    }
                    None => None,
                },
                _ => {
                    // Unknown signature (ER, ES, PN, SL, CL, PD, RR, ...):
                    // skip its payload entirely.
                    Some(())
                }
            };
            if ok.is_none() {
                malformed = true;
                break;
            }
            offset += header.length as usize;
        }

        if malformed {
            break;
        }

        match pending_ce {
            Some(ce) => match continuation_area(image_data, &ce, block_size) {
                Some(area) => current = area,
                None => break,
            },
            None => break,
        }
    }

    attrs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn px_entry(mode: u32, uid: u32, gid: u32) -> Vec<u8> {
        let mut entry = vec![b'P', b'X', 36, 1];
        entry.extend_from_slice(&mode.to_le_bytes());
        entry.extend_from_slice(&mode.to_be_bytes());
        entry.extend_from_slice(&1u32.to_le_bytes());
        entry.extend_from_slice(&1u32.to_be_bytes());
        entry.extend_from_slice(&uid.to_le_bytes());
        entry.extend_from_slice(&uid.to_be_bytes());
        entry.extend_from_slice(&gid.to_le_bytes());
        entry.extend_from_slice(&gid.to_be_bytes());
        entry
    }

    fn nm_entry(name: &[u8], continue_flag: bool) -> Vec<u8> {
        let length = 5 + name.len();
        let mut entry = vec![b'N', b'M', length as u8, 1, if continue_flag { 0x01 } else { 0x00 }];
        entry.extend_from_slice(name);
        entry
    }

    #[test]
    fn decodes_px_and_nm() {
        let mut system_use = px_entry(0o755, 1000, 1000);
        system_use.extend(nm_entry(b"hello.txt", false));
        let attrs = read_attributes(&[], &system_use, 2048, 0);
        assert_eq!(attrs.mode, Some(0o755));
        assert_eq!(attrs.uid, Some(1000));
        assert_eq!(attrs.name.as_deref(), Some(b"hello.txt".as_slice()));
    }

    #[test]
    fn concatenates_continued_nm_entries() {
        let mut system_use = nm_entry(b"part-one-", true);
        system_use.extend(nm_entry(b"part-two", false));
        let attrs = read_attributes(&[], &system_use, 2048, 0);
        assert_eq!(attrs.name.as_deref(), Some(b"part-one-part-two".as_slice()));
    }

    #[test]
    fn unknown_signature_is_skipped_not_fatal() {
        let mut system_use = vec![b'R', b'R', 5, 1, 0x00];
        system_use.extend(px_entry(0o644, 0, 0));
        let attrs = read_attributes(&[], &system_use, 2048, 0);
        assert_eq!(attrs.mode, Some(0o644));
    }

    #[test]
    fn follows_ce_continuation_area() {
        let mut image = vec![0u8; 4096];
        let continuation_area_offset = 2048usize;
        let nm = nm_entry(b"continued-name", false);
        image[continuation_area_offset..continuation_area_offset + nm.len()].copy_from_slice(&nm);

        let mut ce = vec![b'C', b'E', 28, 1];
        ce.extend_from_slice(&1u32.to_le_bytes()); // block_location = 1 (* 2048 = 2048)
        ce.extend_from_slice(&1u32.to_be_bytes());
        ce.extend_from_slice(&0u32.to_le_bytes()); // offset within block
        ce.extend_from_slice(&0u32.to_be_bytes());
        ce.extend_from_slice(&(nm.len() as u32).to_le_bytes());
        ce.extend_from_slice(&(nm.len() as u32).to_be_bytes());

        let attrs = read_attributes(&image, &ce, 2048, 0);
        assert_eq!(attrs.name.as_deref(), Some(b"continued-name".as_slice()));
    }

    #[test]
    fn ce_pointing_out_of_bounds_fails_open() {
        let image = vec![0u8; 64];
        let mut system_use = px_entry(0o600, 1, 1);
        system_use.extend(vec![b'C', b'E', 28, 1]);
        system_use.extend(1000u32.to_le_bytes());
        system_use.extend(1000u32.to_be_bytes());
        system_use.extend(0u32.to_le_bytes());
        system_use.extend(0u32.to_be_bytes());
        system_use.extend(16u32.to_le_bytes());
        system_use.extend(16u32.to_be_bytes());

        // The CE field points outside the image, but the PX field parsed
        // before it must still be returned — a malformed SUSP field loses
        // only the attributes after the fault, never the whole record.
        let attrs = read_attributes(&image, &system_use, 2048, 0);
        assert_eq!(attrs.mode, Some(0o600));
    }

    #[test]
    fn st_terminates_area_early() {
        let mut system_use = px_entry(0o600, 0, 0);
        system_use.extend(vec![b'S', b'T', 4, 1]);
        system_use.extend(px_entry(0o777, 5, 5)); // must not be reached
        let attrs = read_attributes(&[], &system_use, 2048, 0);
        assert_eq!(attrs.mode, Some(0o600));
    }

    #[test]
    fn detects_len_skp_from_root_sp_entry() {
        let mut system_use = vec![b'S', b'P', 7, 1, 0xBE, 0xEF, 5];
        system_use.extend(px_entry(0o755, 0, 0));
        assert_eq!(detect_len_skp(&system_use), Some(5));
    }

    #[test]
    fn skip_is_applied_before_walking_non_root_records() {
        let mut system_use = vec![0u8; 5]; // 5 bytes of unrelated padding/extension data
        system_use.extend(px_entry(0o750, 42, 42));
        let attrs = read_attributes(&[], &system_use, 2048, 5);
        assert_eq!(attrs.mode, Some(0o750));
    }

    #[test]
    fn no_sp_entry_means_no_skip() {
        let system_use = px_entry(0o644, 0, 0);
        assert_eq!(detect_len_skp(&system_use), None);
    }
}
