//! Volume loader: scans the volume descriptor set, locates the Primary
//! Volume Descriptor, and defines the `Image` + `DirectoryRecord` types that
//! every other layer of this crate borrows from.

use crate::security::{checked_mul_u64, require_in_bounds, u64_to_usize, MAX_BLOCK_SIZE};
use crate::susp::detect_len_skp;
use crate::view::{
    read_both_endian_u16, read_both_endian_u32, read_bytes, read_padded_str, read_u32_le,
    read_u8, read_volume_descriptor_header, CompactDateTime, DecimalDateTime,
};
use crate::Error;

/// Logical sector size for the volume descriptor set itself. The PVD's own
/// `logical_block_size` field governs everything after loading.
pub const SECTOR_SIZE: u64 = 2048;

/// Volume descriptors begin at byte offset 0x8000 (sector 16).
pub const VOLUME_DESCRIPTOR_START: u64 = 0x8000;

const TYPE_BOOT_RECORD: u8 = 0x00;
const TYPE_PRIMARY: u8 = 0x01;
const TYPE_SUPPLEMENTARY: u8 = 0x02;
const TYPE_PARTITION: u8 = 0x03;
const TYPE_TERMINATOR: u8 = 0xFF;

/// A variable-length ISO-9660 directory record, borrowed from the mapped
/// image. `filename` and `system_use` are non-owning slices into the same
/// region as the containing [`Image`].
#[derive(Debug, Clone, Copy)]
pub struct DirectoryRecord<'a> {
    pub length: u8,
    pub extent_location: u32,
    pub extent_length: u32,
    pub recording_date: CompactDateTime,
    pub file_flags: u8,
    pub filename: &'a [u8],
    pub system_use: &'a [u8],
}

impl<'a> DirectoryRecord<'a> {
    pub const FLAG_HIDDEN: u8 = 0x01;
    pub const FLAG_DIRECTORY: u8 = 0x02;
    pub const FLAG_ASSOCIATED: u8 = 0x04;

    pub fn is_directory(&self) -> bool {
        self.file_flags & Self::FLAG_DIRECTORY != 0
    }

    pub fn is_hidden(&self) -> bool {
        self.file_flags & Self::FLAG_HIDDEN != 0
    }

    /// True for the zero-length padding record marking end-of-sector inside
    /// a directory extent.
    pub fn is_padding(&self) -> bool {
        self.length == 0
    }

    /// Offset in the image, in bytes, where this record's extent begins.
    pub fn extent_offset(&self, block_size: u32) -> Result<u64, Error> {
        checked_mul_u64(self.extent_location as u64, block_size as u64, "extent offset")
    }
}

/// Parse the directory record at `offset`. A zero length byte yields a
/// sentinel record (`is_padding() == true`) without reading further fields —
/// callers (the directory walker) are responsible for treating that as
/// end-of-sector padding rather than a real entry.
pub fn record_at<'a>(data: &'a [u8], offset: usize) -> Result<DirectoryRecord<'a>, Error> {
    let length = read_u8(data, offset)?;
    if length == 0 {
        return Ok(DirectoryRecord {
            length: 0,
            extent_location: 0,
            extent_length: 0,
            recording_date: CompactDateTime {
                year: 0,
                month: 0,
                day: 0,
                hour: 0,
                minute: 0,
                second: 0,
                tz_offset: 0,
            },
            file_flags: 0,
            filename: &[],
            system_use: &[],
        });
    }

    if (length as usize) < 33 {
        return Err(Error::malformed_volume(format!(
            "directory record length {length} below minimum 33"
        )));
    }
    require_in_bounds(offset as u64, length as u64, data.len() as u64, "directory record")?;

    let extent_location = read_both_endian_u32(data, offset + 2)?;
    let extent_length = read_both_endian_u32(data, offset + 10)?;
    let recording_date = CompactDateTime::from_bytes(data, offset + 18)?;
    let file_flags = read_u8(data, offset + 25)?;
    let filename_length = read_u8(data, offset + 32)? as usize;

    let name_start = offset + 33;
    let record_end = offset + length as usize;
    if name_start + filename_length > record_end {
        return Err(Error::malformed_volume(
            "directory record filename overruns record length".to_string(),
        ));
    }
    let filename = read_bytes(data, name_start, filename_length)?;

    // System-use area begins after the filename, padded to even alignment.
    let pad = 1 - (filename_length & 1);
    let su_start = name_start + filename_length + pad;
    let system_use = if su_start < record_end {
        read_bytes(data, su_start, record_end - su_start)?
    } else {
        &[]
    };

    Ok(DirectoryRecord {
        length,
        extent_location,
        extent_length,
        recording_date,
        file_flags,
        filename,
        system_use,
    })
}

/// The Primary Volume Descriptor, plus the handful of fields the rest of
/// this crate needs from it.
#[derive(Debug, Clone)]
pub struct PrimaryVolumeDescriptor<'a> {
    pub volume_identifier: String,
    pub volume_space_size: u32,
    pub logical_block_size: u32,
    pub path_table_size: u32,
    pub path_table_location: u32,
    pub root_directory_record: DirectoryRecord<'a>,
    pub creation_date: DecimalDateTime,
    pub modification_date: DecimalDateTime,
    pub expiration_date: DecimalDateTime,
    pub effective_date: DecimalDateTime,
}

fn parse_pvd<'a>(sector: &'a [u8]) -> Result<PrimaryVolumeDescriptor<'a>, Error> {
    let volume_identifier = read_padded_str(sector, 40, 32)?;
    let volume_space_size = read_both_endian_u32(sector, 80)?;
    let logical_block_size = read_both_endian_u16(sector, 128)? as u32;
    if logical_block_size == 0 || logical_block_size > MAX_BLOCK_SIZE {
        return Err(Error::malformed_volume(format!(
            "implausible logical block size {logical_block_size}"
        )));
    }
    let path_table_size = read_both_endian_u32(sector, 132)?;
    let path_table_location = read_u32_le(sector, 140)?;
    let root_directory_record = record_at(sector, 156)?;
    let creation_date = DecimalDateTime::from_bytes(sector, 813)?;
    let modification_date = DecimalDateTime::from_bytes(sector, 830)?;
    let expiration_date = DecimalDateTime::from_bytes(sector, 847)?;
    let effective_date = DecimalDateTime::from_bytes(sector, 864)?;

    Ok(PrimaryVolumeDescriptor {
        volume_identifier,
        volume_space_size,
        logical_block_size,
        path_table_size,
        path_table_location,
        root_directory_record,
        creation_date,
        modification_date,
        expiration_date,
        effective_date,
    })
}

/// The loaded image: an immutable byte region plus the resolved PVD and the
/// logical block size the rest of the crate uses to scale extent offsets.
#[derive(Debug, Clone)]
pub struct Image<'a> {
    data: &'a [u8],
    pvd: PrimaryVolumeDescriptor<'a>,
    /// `len_skp` established from the root record's `SP` system-use field, if
    /// any. Every other directory record's system-use area must skip this
    /// many bytes before the field walk begins (the root record's own area is
    /// where the `SP` field itself is found, so it is never skipped).
    system_use_skip: u32,
}

impl<'a> Image<'a> {
    /// Scan the volume descriptor set starting at 0x8000, one 2048-byte
    /// sector at a time, validating each descriptor header and recording the
    /// first Primary Volume Descriptor seen (first-wins; later PVDs are
    /// ignored). Stops at a terminator descriptor. Fails if the chain runs
    /// past the end of `data` before a terminator is seen, or if no PVD was
    /// ever recorded.
    pub fn load(data: &'a [u8]) -> Result<Self, Error> {
        let mut offset = VOLUME_DESCRIPTOR_START;
        let mut pvd: Option<PrimaryVolumeDescriptor<'a>> = None;

        loop {
            require_in_bounds(offset, SECTOR_SIZE, data.len() as u64, "volume descriptor sector")?;
            let sector_start = u64_to_usize(offset, "volume descriptor offset")?;
            let sector = &data[sector_start..sector_start + SECTOR_SIZE as usize];
            let header = read_volume_descriptor_header(sector, 0)?;

            tracing::debug!(offset, descriptor_type = header.descriptor_type, "volume descriptor");

            match header.descriptor_type {
                TYPE_PRIMARY if pvd.is_none() => {
                    pvd = Some(parse_pvd(sector)?);
                }
                TYPE_TERMINATOR => break,
                // Every other descriptor type (including ones this crate
                // doesn't special-case) is simply skipped.
                TYPE_BOOT_RECORD | TYPE_PRIMARY | TYPE_SUPPLEMENTARY | TYPE_PARTITION => {}
                _ => {}
            }

            offset = offset
                .checked_add(SECTOR_SIZE)
                .ok_or_else(|| Error::malformed_volume("volume descriptor offset overflow".to_string()))?;
        }

        let pvd = pvd.ok_or_else(|| {
            Error::malformed_volume("no primary volume descriptor found before terminator".to_string())
        })?;
        let system_use_skip = detect_len_skp(pvd.root_directory_record.system_use).unwrap_or(0);

        Ok(Self {
            data,
            pvd,
            system_use_skip,
        })
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn block_size(&self) -> u32 {
        self.pvd.logical_block_size
    }

    pub fn volume_label(&self) -> &str {
        &self.pvd.volume_identifier
    }

    pub fn volume_space_size(&self) -> u32 {
        self.pvd.volume_space_size
    }

    pub fn path_table_location(&self) -> u32 {
        self.pvd.path_table_location
    }

    pub fn path_table_size(&self) -> u32 {
        self.pvd.path_table_size
    }

    pub fn root(&self) -> DirectoryRecord<'a> {
        self.pvd.root_directory_record
    }

    /// Bytes to skip at the head of every non-root directory record's
    /// system-use area, established from the root record's `SP` field. `0`
    /// if no `SP` field was present.
    pub fn system_use_skip(&self) -> u32 {
        self.system_use_skip
    }

    pub fn pvd(&self) -> &PrimaryVolumeDescriptor<'a> {
        &self.pvd
    }
}

#[cfg(test)]
pub(crate) mod test_fixture {
    /// Build a minimal valid image: PVD at 0x8000 with a root directory
    /// extent at block 20, terminator at 0x8800. Used by every layer's
    /// tests in this crate.
    pub fn minimal_image() -> Vec<u8> {
        let mut iso = vec![0u8; 64 * 1024];
        let pvd_offset = 0x8000usize;

        iso[pvd_offset] = 1; // PRIMARY
        iso[pvd_offset + 1..pvd_offset + 6].copy_from_slice(b"CD001");
        iso[pvd_offset + 6] = 1; // version

        let volume_id = b"TESTVOL                         ";
        iso[pvd_offset + 40..pvd_offset + 72].copy_from_slice(volume_id);

        let volume_size = 32u32;
        iso[pvd_offset + 80..pvd_offset + 84].copy_from_slice(&volume_size.to_le_bytes());
        iso[pvd_offset + 84..pvd_offset + 88].copy_from_slice(&volume_size.to_be_bytes());

        let block_size = 2048u16;
        iso[pvd_offset + 128..pvd_offset + 130].copy_from_slice(&block_size.to_le_bytes());
        iso[pvd_offset + 130..pvd_offset + 132].copy_from_slice(&block_size.to_be_bytes());

        iso[pvd_offset + 132..pvd_offset + 136].copy_from_slice(&0u32.to_le_bytes());
        iso[pvd_offset + 136..pvd_offset + 140].copy_from_slice(&0u32.to_be_bytes());
        iso[pvd_offset + 140..pvd_offset + 144].copy_from_slice(&19u32.to_le_bytes());

        // Root directory record (34 bytes) at offset 156, extent at block 20.
        let root_offset = pvd_offset + 156;
        iso[root_offset] = 34;
        let root_extent = 20u32;
        iso[root_offset + 2..root_offset + 6].copy_from_slice(&root_extent.to_le_bytes());
        iso[root_offset + 6..root_offset + 10].copy_from_slice(&root_extent.to_be_bytes());
        iso[root_offset + 10..root_offset + 14].copy_from_slice(&2048u32.to_le_bytes());
        iso[root_offset + 14..root_offset + 18].copy_from_slice(&2048u32.to_be_bytes());
        iso[root_offset + 18] = 124; // year 2024
        iso[root_offset + 19] = 1;
        iso[root_offset + 20] = 1;
        iso[root_offset + 25] = 0x02; // FLAG_DIRECTORY
        iso[root_offset + 32] = 1;
        iso[root_offset + 33] = 0x00; // "."

        for i in 0..17 {
            iso[pvd_offset + 813 + i] = b' ';
            iso[pvd_offset + 830 + i] = b' ';
            iso[pvd_offset + 847 + i] = b' ';
            iso[pvd_offset + 864 + i] = b' ';
        }
        iso[pvd_offset + 829] = 0; // tz bytes already zero from fill; kept explicit for clarity

        // Terminator at the next sector.
        let term_offset = pvd_offset + SECTOR_SIZE as usize;
        iso[term_offset] = 0xFF;
        iso[term_offset + 1..term_offset + 6].copy_from_slice(b"CD001");
        iso[term_offset + 6] = 1;

        iso
    }
}
