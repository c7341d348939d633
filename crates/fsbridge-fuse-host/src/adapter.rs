// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! FUSE adapter implementation
//!
//! Maps FUSE callbacks to bridge operations. Every callback resolves the
//! kernel's inode to a path, posts one operation through the gateway and
//! blocks until the handler side releases it; the session is
//! single-threaded, so the gateway borrow lasts for the whole mount.

#[cfg(not(all(feature = "fuse", target_os = "linux")))]
compile_error!("This module requires the 'fuse' feature on Linux");

use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fsbridge_core::{EntrySink, FileStat, Gateway, Operation, ReplyPayload, SinkStatus};
use fuser::{
    FileAttr, FileType, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use libc::{c_int, EINVAL, EIO, ENAMETOOLONG, ENOENT, ENOSYS};
use tracing::info;

use crate::inodes::{child_path, InodeTable};

/// Maximum single path component length to guard against overly long names
const NAME_MAX: usize = 255;

pub struct BridgeFs<'a> {
    gateway: &'a mut Gateway,
    inodes: Arc<Mutex<InodeTable>>,
    attr_ttl: Duration,
    entry_ttl: Duration,
}

impl<'a> BridgeFs<'a> {
    pub fn new(gateway: &'a mut Gateway, attr_ttl: Duration, entry_ttl: Duration) -> Self {
        BridgeFs {
            gateway,
            inodes: Arc::new(Mutex::new(InodeTable::new())),
            attr_ttl,
            entry_ttl,
        }
    }

    /// Get the path for a given inode
    fn resolve(&self, ino: u64) -> Result<String, c_int> {
        match self.inodes.lock().unwrap().path(ino) {
            Some(path) => Ok(path.to_string()),
            None => Err(ENOENT),
        }
    }

    /// Bridge a getattr for `path`, surfacing the handler's errno on
    /// failure.
    fn stat_path(&mut self, path: String) -> Result<FileStat, c_int> {
        let result = self.gateway.call(Operation::Getattr { path });
        if result.retval < 0 {
            return Err(-result.retval);
        }
        match result.payload {
            ReplyPayload::Attrs(stat) => Ok(stat),
            _ => Err(EIO),
        }
    }

    /// Stat `path` and answer a lookup-shaped reply with its attributes.
    fn entry_for(&mut self, path: String, reply: ReplyEntry) {
        match self.stat_path(path.clone()) {
            Ok(stat) => {
                let ino = self.inodes.lock().unwrap().get_or_alloc(&path);
                reply.entry(&self.entry_ttl, &file_attr(ino, &stat), 0);
            }
            Err(errno) => reply.error(errno),
        }
    }
}

/// EntrySink feeding the kernel's directory buffer. Entry types are
/// reported as regular files; the kernel refines them through lookup.
struct DirFill {
    reply: Arc<Mutex<Option<ReplyDirectory>>>,
    inodes: Arc<Mutex<InodeTable>>,
    dir: String,
    skip: usize,
    index: usize,
}

impl EntrySink for DirFill {
    fn push(&mut self, name: &str) -> SinkStatus {
        self.index += 1;
        // Resume after the entries a previous readdir call consumed.
        if self.index <= self.skip {
            return SinkStatus::Accepted;
        }

        let ino = self
            .inodes
            .lock()
            .unwrap()
            .get_or_alloc(&child_path(&self.dir, name));
        let mut slot = self.reply.lock().unwrap();
        let reply = match slot.as_mut() {
            Some(reply) => reply,
            None => return SinkStatus::Full,
        };
        if reply.add(ino, self.index as i64, FileType::RegularFile, name) {
            SinkStatus::Full
        } else {
            SinkStatus::Accepted
        }
    }
}

/// Convert bridge attributes to FUSE FileAttr
fn file_attr(ino: u64, stat: &FileStat) -> FileAttr {
    let kind = match stat.mode & libc::S_IFMT {
        m if m == libc::S_IFDIR => FileType::Directory,
        m if m == libc::S_IFLNK => FileType::Symlink,
        m if m == libc::S_IFCHR => FileType::CharDevice,
        m if m == libc::S_IFBLK => FileType::BlockDevice,
        m if m == libc::S_IFIFO => FileType::NamedPipe,
        m if m == libc::S_IFSOCK => FileType::Socket,
        _ => FileType::RegularFile,
    };

    FileAttr {
        ino,
        size: stat.size,
        blocks: stat.size.div_ceil(512),
        atime: epoch_secs(stat.atime),
        mtime: epoch_secs(stat.mtime),
        ctime: epoch_secs(stat.ctime),
        crtime: epoch_secs(stat.ctime),
        kind,
        perm: (stat.mode & 0o7777) as u16,
        nlink: stat.nlink.max(1),
        uid: stat.uid,
        gid: stat.gid,
        rdev: 0,
        blksize: 512,
        flags: 0,
    }
}

fn epoch_secs(secs: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs.max(0) as u64)
}

/// Validate one path component, mirroring kernel-side limits.
fn validate_name(name: &OsStr) -> Result<&str, c_int> {
    if name.as_bytes().len() > NAME_MAX {
        return Err(ENAMETOOLONG);
    }
    name.to_str().ok_or(EINVAL)
}

impl<'a> fuser::Filesystem for BridgeFs<'a> {
    fn init(&mut self, _req: &Request, _config: &mut fuser::KernelConfig) -> Result<(), c_int> {
        self.gateway.call(Operation::Init);
        info!("FUSE bridge adapter initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        self.gateway.call(Operation::Destroy);
        info!("FUSE bridge adapter destroyed");
    }

    fn forget(&mut self, _req: &Request, ino: u64, _nlookup: u64) {
        self.inodes.lock().unwrap().forget(ino);
    }

    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let name = match validate_name(name) {
            Ok(name) => name,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        let parent_path = match self.resolve(parent) {
            Ok(path) => path,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        self.entry_for(child_path(&parent_path, name), reply);
    }

    fn getattr(&mut self, _req: &Request, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let path = match self.resolve(ino) {
            Ok(path) => path,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        match self.stat_path(path) {
            Ok(stat) => reply.attr(&self.attr_ttl, &file_attr(ino, &stat)),
            Err(errno) => reply.error(errno),
        }
    }

    fn open(&mut self, _req: &Request, ino: u64, _flags: i32, reply: ReplyOpen) {
        let path = match self.resolve(ino) {
            Ok(path) => path,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        let result = self.gateway.call(Operation::Open { path });
        if result.retval < 0 {
            reply.error(-result.retval);
        } else {
            // The bridge is path-based; no handle state to carry.
            reply.opened(0, 0);
        }
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let path = match self.resolve(ino) {
            Ok(path) => path,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        let result = self.gateway.call(Operation::Read {
            path,
            offset: offset.max(0) as u64,
            len: size as u64,
        });
        if result.retval < 0 {
            reply.error(-result.retval);
            return;
        }
        match result.payload {
            ReplyPayload::Data(data) => reply.data(&data),
            _ => reply.data(&[]),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let path = match self.resolve(ino) {
            Ok(path) => path,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        let result = self.gateway.call(Operation::Write {
            path,
            offset: offset.max(0) as u64,
            data: data.to_vec(),
        });
        if result.retval < 0 {
            reply.error(-result.retval);
        } else {
            reply.written(result.retval as u32);
        }
    }

    fn readdir(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        reply: ReplyDirectory,
    ) {
        let dir = match self.resolve(ino) {
            Ok(path) => path,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };

        let slot = Arc::new(Mutex::new(Some(reply)));
        let sink = DirFill {
            reply: slot.clone(),
            inodes: self.inodes.clone(),
            dir: dir.clone(),
            skip: offset.max(0) as usize,
            index: 0,
        };
        let result = self.gateway.call(Operation::Readdir {
            path: dir,
            sink: Box::new(sink),
        });

        let pending = slot.lock().unwrap().take();
        if let Some(reply) = pending {
            if result.retval < 0 {
                reply.error(-result.retval);
            } else {
                reply.ok();
            }
        }
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let name = match validate_name(name) {
            Ok(name) => name,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        let parent_path = match self.resolve(parent) {
            Ok(path) => path,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        let path = child_path(&parent_path, name);
        let result = self.gateway.call(Operation::Create { path: path.clone() });
        if result.retval < 0 {
            reply.error(-result.retval);
            return;
        }
        match self.stat_path(path.clone()) {
            Ok(stat) => {
                let ino = self.inodes.lock().unwrap().get_or_alloc(&path);
                reply.created(&self.entry_ttl, &file_attr(ino, &stat), 0, 0, 0);
            }
            Err(errno) => reply.error(errno),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let name = match validate_name(name) {
            Ok(name) => name,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        let parent_path = match self.resolve(parent) {
            Ok(path) => path,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        let path = child_path(&parent_path, name);
        let result = self.gateway.call(Operation::Mkdir { path: path.clone() });
        if result.retval < 0 {
            reply.error(-result.retval);
        } else {
            self.entry_for(path, reply);
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name = match validate_name(name) {
            Ok(name) => name,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        let parent_path = match self.resolve(parent) {
            Ok(path) => path,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        let result = self.gateway.call(Operation::Unlink {
            path: child_path(&parent_path, name),
        });
        if result.retval < 0 {
            reply.error(-result.retval);
        } else {
            reply.ok();
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let name = match validate_name(name) {
            Ok(name) => name,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        let parent_path = match self.resolve(parent) {
            Ok(path) => path,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        let result = self.gateway.call(Operation::Rmdir {
            path: child_path(&parent_path, name),
        });
        if result.retval < 0 {
            reply.error(-result.retval);
        } else {
            reply.ok();
        }
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let name = match validate_name(name) {
            Ok(name) => name,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        let newname = match validate_name(newname) {
            Ok(name) => name,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        let parent_path = match self.resolve(parent) {
            Ok(path) => path,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        let newparent_path = match self.resolve(newparent) {
            Ok(path) => path,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        let from = child_path(&parent_path, name);
        let to = child_path(&newparent_path, newname);
        let result = self.gateway.call(Operation::Rename {
            from: from.clone(),
            to: to.clone(),
        });
        if result.retval < 0 {
            reply.error(-result.retval);
        } else {
            self.inodes.lock().unwrap().rename(&from, &to);
            reply.ok();
        }
    }

    fn setattr(
        &mut self,
        _req: &Request,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        // Only time updates pass through (accepted and discarded); size
        // and ownership changes are not bridged.
        if mode.is_some() || uid.is_some() || gid.is_some() || size.is_some() {
            reply.error(ENOSYS);
            return;
        }
        let path = match self.resolve(ino) {
            Ok(path) => path,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        match self.stat_path(path) {
            Ok(stat) => reply.attr(&self.attr_ttl, &file_attr(ino, &stat)),
            Err(errno) => reply.error(errno),
        }
    }
}
