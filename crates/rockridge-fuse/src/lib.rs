//! # rockridge-fuse
//!
//! Adapts [`rockridge_core::callbacks::RockRidgeFs`]'s path-based host
//! callback surface to `fuser::Filesystem`'s inode-based one. This crate
//! owns all of the FUSE/kernel-specific plumbing (inode table, errno
//! mapping, file-handle bookkeeping) so the core stays free of any FUSE
//! dependency.

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyStatfs, Request,
};
use rockridge_core::access::Credentials;
use rockridge_core::callbacks::{Attributes, FileHandle, RockRidgeFs};
use rockridge_core::Error;
use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Attribute cache lifetime handed back to the kernel. The image never
/// changes underneath a mount, so a generous TTL just avoids needless
/// re-lookups.
const ATTR_TTL: Duration = Duration::from_secs(3600);

const ROOT_INODE: u64 = 1;

fn errno_for(err: &Error) -> i32 {
    match err {
        Error::NotFound(_) => libc::ENOENT,
        Error::NotADirectory(_) => libc::ENOTDIR,
        Error::IsADirectory(_) => libc::EISDIR,
        Error::PermissionDenied(_) => libc::EACCES,
        Error::ReadOnly => libc::EROFS,
        Error::NameTooLong(_) => libc::ENAMETOOLONG,
        Error::MalformedVolume(_) => libc::EIO,
    }
}

fn system_time(ts: Option<i64>) -> SystemTime {
    match ts {
        Some(secs) if secs >= 0 => UNIX_EPOCH + Duration::from_secs(secs as u64),
        _ => UNIX_EPOCH,
    }
}

fn file_attr(attrs: &Attributes) -> FileAttr {
    FileAttr {
        ino: attrs.inode,
        size: attrs.size,
        blocks: attrs.size.div_ceil(512),
        atime: system_time(attrs.access_time),
        mtime: system_time(attrs.modification_time),
        ctime: system_time(attrs.modification_time),
        crtime: system_time(attrs.creation_time),
        kind: if attrs.is_directory {
            FileType::Directory
        } else {
            FileType::RegularFile
        },
        perm: (attrs.mode & 0o7777) as u16,
        nlink: attrs.nlinks,
        uid: attrs.uid,
        gid: attrs.gid,
        rdev: 0,
        blksize: 2048,
        flags: 0,
    }
}

/// `fuser::Filesystem` implementation backed by a [`RockRidgeFs`]. Paths are
/// tracked in an inode table populated as the kernel walks the tree via
/// `lookup`/`readdir`; inode numbers are whatever [`RockRidgeFs`] itself
/// synthesizes (the root is remapped to FUSE's reserved inode 1).
pub struct RockRidgeFuse<'a> {
    fs: RockRidgeFs<'a>,
    paths: HashMap<u64, PathBuf>,
    open_files: HashMap<u64, FileHandle<'a>>,
    next_fh: u64,
}

impl<'a> RockRidgeFuse<'a> {
    pub fn new(fs: RockRidgeFs<'a>) -> Self {
        let mut paths = HashMap::new();
        paths.insert(ROOT_INODE, PathBuf::from("/"));
        Self {
            fs,
            paths,
            open_files: HashMap::new(),
            next_fh: 1,
        }
    }

    fn path_for(&self, ino: u64) -> Option<PathBuf> {
        self.paths.get(&ino).cloned()
    }

    fn remember(&mut self, path: PathBuf, attrs: &Attributes) -> u64 {
        let ino = if path == Path::new("/") { ROOT_INODE } else { attrs.inode };
        self.paths.entry(ino).or_insert(path);
        ino
    }

    fn credentials(req: &Request<'_>) -> Credentials {
        Credentials {
            uid: req.uid(),
            gid: req.gid(),
        }
    }

    fn child_path(parent: &Path, name: &OsStr) -> PathBuf {
        parent.join(name)
    }
}

impl<'a> Filesystem for RockRidgeFuse<'a> {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(parent_path) = self.path_for(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let path = Self::child_path(&parent_path, name);
        let path_str = path.to_string_lossy().to_string();

        match self.fs.getattr(&path_str) {
            Ok(attrs) => {
                let ino = self.remember(path, &attrs);
                let mut attrs = attrs;
                attrs.inode = ino;
                reply.entry(&ATTR_TTL, &file_attr(&attrs), 0);
            }
            Err(e) => {
                tracing::debug!(?path_str, error = %e, "lookup failed");
                reply.error(errno_for(&e));
            }
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.getattr(&path.to_string_lossy()) {
            Ok(mut attrs) => {
                attrs.inode = ino;
                reply.attr(&ATTR_TTL, &file_attr(&attrs));
            }
            Err(e) => reply.error(errno_for(&e)),
        }
    }

    fn access(&mut self, req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.access(&path.to_string_lossy(), Self::credentials(req), mask as u8) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno_for(&e)),
        }
    }

    fn opendir(&mut self, req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.opendir(&path.to_string_lossy(), Self::credentials(req)) {
            Ok(()) => reply.opened(0, 0),
            Err(e) => reply.error(errno_for(&e)),
        }
    }

    fn readdir(&mut self, req: &Request<'_>, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let entries = match self.fs.readdir(&path.to_string_lossy(), Self::credentials(req)) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(errno_for(&e));
                return;
            }
        };

        for (i, entry) in entries.into_iter().enumerate().skip(offset as usize) {
            let name = String::from_utf8_lossy(&entry.name).to_string();
            if name != "." && name != ".." {
                let child_path = path.join(&name);
                self.paths.entry(entry.inode).or_insert(child_path);
            }
            let kind = if entry.is_directory {
                FileType::Directory
            } else {
                FileType::RegularFile
            };
            if reply.add(entry.inode, (i + 1) as i64, kind, &name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        reply.ok();
    }

    fn open(&mut self, req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        if flags & (libc::O_WRONLY | libc::O_RDWR) != 0 {
            reply.error(libc::EACCES);
            return;
        }
        let Some(path) = self.path_for(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.fs.open(&path.to_string_lossy(), Self::credentials(req)) {
            Ok(handle) => {
                let fh = self.next_fh;
                self.next_fh += 1;
                self.open_files.insert(fh, handle);
                reply.opened(fh, 0);
            }
            Err(e) => reply.error(errno_for(&e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(handle) = self.open_files.get(&fh) else {
            reply.error(libc::EBADF);
            return;
        };
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        match self.fs.read(handle, offset as u64, size) {
            Ok(data) => reply.data(data),
            Err(e) => reply.error(errno_for(&e)),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        if let Some(handle) = self.open_files.remove(&fh) {
            self.fs.release(handle);
        }
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        match self.fs.statfs() {
            Ok(stats) => reply.statfs(
                stats.total_blocks,
                0,
                0,
                stats.entry_count,
                0,
                stats.block_size,
                255,
                stats.block_size,
            ),
            Err(_) => reply.error(libc::EIO),
        }
    }
}
