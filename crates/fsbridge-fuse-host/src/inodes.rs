// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Inode-to-path bookkeeping for the FUSE adapter.
//!
//! The bridge speaks paths while the kernel speaks inode numbers; this
//! table owns the mapping in both directions. Inode numbers are stable
//! for as long as the kernel may reference them and are only dropped on
//! `forget`.

use std::collections::HashMap;

/// Inode number of the mount root, fixed by the FUSE protocol.
pub const ROOT_INO: u64 = 1;

pub struct InodeTable {
    next_inode: u64,
    paths: HashMap<String, u64>,
    inodes: HashMap<u64, String>,
}

impl InodeTable {
    pub fn new() -> Self {
        let mut table = InodeTable {
            next_inode: ROOT_INO + 1,
            paths: HashMap::new(),
            inodes: HashMap::new(),
        };
        table.record("/".to_string(), ROOT_INO);
        table
    }

    /// Get the path for a given inode
    pub fn path(&self, ino: u64) -> Option<&str> {
        self.inodes.get(&ino).map(|p| p.as_str())
    }

    /// Get or allocate the inode for a path
    pub fn get_or_alloc(&mut self, path: &str) -> u64 {
        if let Some(&existing) = self.paths.get(path) {
            return existing;
        }

        let inode = self.next_inode;
        self.next_inode += 1;
        self.record(path.to_string(), inode);
        inode
    }

    /// Drop the mapping for an inode. The root is never forgotten.
    pub fn forget(&mut self, inode: u64) {
        if inode == ROOT_INO {
            return;
        }

        self.inodes.remove(&inode);
        self.paths.retain(|_, &mut ino| ino != inode);
    }

    /// Re-point a mapping at its new path, keeping the inode number
    /// stable across the rename. A mapping already present at `to` is
    /// displaced.
    pub fn rename(&mut self, from: &str, to: &str) {
        let inode = match self.paths.remove(from) {
            Some(inode) => inode,
            None => return,
        };
        if let Some(displaced) = self.paths.get(to).copied() {
            if displaced != inode {
                self.inodes.remove(&displaced);
            }
        }
        self.record(to.to_string(), inode);
    }

    fn record(&mut self, path: String, inode: u64) {
        self.paths.insert(path.clone(), inode);
        self.inodes.insert(inode, path);
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Join a name onto a parent directory path without doubling the root's
/// slash.
pub fn child_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}
