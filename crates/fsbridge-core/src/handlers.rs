// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Handler registration.

use crate::completion::{
    AttrCompletion, DirCompletion, OpCompletion, ReadCompletion, WriteCompletion,
};

type AttrFn = Box<dyn Fn(String, AttrCompletion)>;
type DirFn = Box<dyn Fn(String, DirCompletion)>;
type PathFn = Box<dyn Fn(String, OpCompletion)>;
type ReadFn = Box<dyn Fn(String, u64, u64, ReadCompletion)>;
type WriteFn = Box<dyn Fn(String, u64, u64, WriteCompletion)>;
type RenameFn = Box<dyn Fn(String, String, OpCompletion)>;
type BareFn = Box<dyn Fn(OpCompletion)>;

/// Registry of operation handlers, populated through the `on_*` builders
/// and handed to [`crate::mount`] once. Operations without a registered
/// handler fail with `EPERM` at dispatch time.
///
/// The boxed callables are deliberately not `Send`: the registry lives on
/// the dispatch thread for the lifetime of the bridge and may capture
/// state local to it.
#[derive(Default)]
pub struct Handlers {
    pub(crate) getattr: Option<AttrFn>,
    pub(crate) readdir: Option<DirFn>,
    pub(crate) open: Option<PathFn>,
    pub(crate) read: Option<ReadFn>,
    pub(crate) write: Option<WriteFn>,
    pub(crate) create: Option<PathFn>,
    pub(crate) unlink: Option<PathFn>,
    pub(crate) rename: Option<RenameFn>,
    pub(crate) mkdir: Option<PathFn>,
    pub(crate) rmdir: Option<PathFn>,
    pub(crate) init: Option<BareFn>,
    pub(crate) destroy: Option<BareFn>,
}

impl Handlers {
    pub fn new() -> Self {
        Handlers::default()
    }

    pub fn on_getattr(mut self, f: impl Fn(String, AttrCompletion) + 'static) -> Self {
        self.getattr = Some(Box::new(f));
        self
    }

    pub fn on_readdir(mut self, f: impl Fn(String, DirCompletion) + 'static) -> Self {
        self.readdir = Some(Box::new(f));
        self
    }

    pub fn on_open(mut self, f: impl Fn(String, OpCompletion) + 'static) -> Self {
        self.open = Some(Box::new(f));
        self
    }

    /// Registers the `read` handler, invoked with `(path, offset, len)`.
    pub fn on_read(mut self, f: impl Fn(String, u64, u64, ReadCompletion) + 'static) -> Self {
        self.read = Some(Box::new(f));
        self
    }

    /// Registers the `write` handler, invoked with `(path, offset, len)`;
    /// the payload is read through [`WriteCompletion::data`].
    pub fn on_write(mut self, f: impl Fn(String, u64, u64, WriteCompletion) + 'static) -> Self {
        self.write = Some(Box::new(f));
        self
    }

    pub fn on_create(mut self, f: impl Fn(String, OpCompletion) + 'static) -> Self {
        self.create = Some(Box::new(f));
        self
    }

    pub fn on_unlink(mut self, f: impl Fn(String, OpCompletion) + 'static) -> Self {
        self.unlink = Some(Box::new(f));
        self
    }

    /// Registers the `rename` handler, invoked with `(source, destination)`.
    pub fn on_rename(mut self, f: impl Fn(String, String, OpCompletion) + 'static) -> Self {
        self.rename = Some(Box::new(f));
        self
    }

    pub fn on_mkdir(mut self, f: impl Fn(String, OpCompletion) + 'static) -> Self {
        self.mkdir = Some(Box::new(f));
        self
    }

    pub fn on_rmdir(mut self, f: impl Fn(String, OpCompletion) + 'static) -> Self {
        self.rmdir = Some(Box::new(f));
        self
    }

    pub fn on_init(mut self, f: impl Fn(OpCompletion) + 'static) -> Self {
        self.init = Some(Box::new(f));
        self
    }

    pub fn on_destroy(mut self, f: impl Fn(OpCompletion) + 'static) -> Self {
        self.destroy = Some(Box::new(f));
        self
    }
}
