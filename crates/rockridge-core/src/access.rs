//! POSIX-style access checks over Rock Ridge `PX` attributes.
//!
//! Ownership is taken from the record's own Rock Ridge `PX` uid/gid when
//! present; records without one fall back to the configured "mount owner"
//! identity (Rock Ridge images are typically produced by and mounted for one
//! user, so most records have no `PX` uid/gid of their own). One addition
//! beyond the reference decoder: every ancestor directory on the path must
//! also grant execute to the caller, matching ordinary POSIX path traversal
//! semantics, which the reference only checked at the leaf.

use crate::resolve::ResolvedRecord;
use crate::susp::RockRidgeAttributes;

pub const R_OK: u8 = 0b100;
pub const W_OK: u8 = 0b010;
pub const X_OK: u8 = 0b001;

/// The caller's identity, as supplied by the host callback surface for a
/// single operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credentials {
    pub uid: u32,
    pub gid: u32,
}

/// Compute the effective access bits available to `caller` for one record,
/// then check `mask` against them. Records without a Rock Ridge `PX` entry
/// fall back to read-only (read+execute for directories, read-only for
/// files), since no mode is available to restrict further. Ownership is the
/// record's own `PX` uid/gid, falling back to `mount_owner` when the record
/// carries none.
pub fn may_access(
    caller: Credentials,
    mount_owner: Credentials,
    rr: &RockRidgeAttributes,
    is_directory: bool,
    mask: u8,
) -> bool {
    let owner_uid = rr.uid.unwrap_or(mount_owner.uid);
    let owner_gid = rr.gid.unwrap_or(mount_owner.gid);

    let is_root = caller.uid == 0;
    let is_user = caller.uid == owner_uid;
    let is_group = caller.gid == owner_gid;

    let access: u8 = match rr.mode {
        None => {
            if is_directory {
                R_OK | X_OK
            } else {
                R_OK
            }
        }
        Some(mode) => {
            if is_root {
                if mode & 0o111 != 0 {
                    0o7
                } else {
                    0o6
                }
            } else {
                let shift = if is_user {
                    6
                } else if is_group {
                    3
                } else {
                    0
                };
                ((mode >> shift) & 0o7) as u8
            }
        }
    };

    access & mask == mask
}

/// Require execute access on every ancestor directory of a resolved path,
/// in addition to whatever check the caller runs against the leaf record.
pub fn may_traverse(resolved: &ResolvedRecord<'_>, caller: Credentials, mount_owner: Credentials) -> bool {
    resolved
        .ancestors
        .iter()
        .all(|(record, rr)| may_access(caller, mount_owner, rr, record.is_directory(), X_OK))
}
