// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Dispatch loop running on the bridge's async task.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::completion::{
    AttrCompletion, DirCompletion, OpCompletion, ReadCompletion, WriteCompletion,
};
use crate::gateway::{Exchange, Inbound};
use crate::handlers::Handlers;
use crate::types::{OpKind, Operation, Reply};

/// Receives exchanges from the mailbox and hands each to its registered
/// handler, binding the completion that will release the posting worker.
pub(crate) struct Dispatcher {
    rx: mpsc::Receiver<Inbound>,
    handlers: Handlers,
    worker: Option<thread::JoinHandle<()>>,
}

impl Dispatcher {
    pub(crate) fn new(
        rx: mpsc::Receiver<Inbound>,
        handlers: Handlers,
        worker: thread::JoinHandle<()>,
    ) -> Self {
        Dispatcher {
            rx,
            handlers,
            worker: Some(worker),
        }
    }

    pub(crate) async fn run(mut self) {
        while let Some(msg) = self.rx.recv().await {
            match msg {
                Inbound::Exchange(Exchange { op, done }) => self.serve(op, done),
                Inbound::Exit => {
                    self.shutdown();
                    break;
                }
            }
        }
        debug!(target: "fsbridge", "dispatch loop stopped");
    }

    /// Joins the worker thread once the exit notice arrives.
    fn shutdown(&mut self) {
        debug!(target: "fsbridge", op = OpKind::Exit.as_str(), "joining worker thread");
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!(target: "fsbridge", "worker thread panicked");
            }
        }
    }

    /// Serves one exchange, resolving the handler for `op` or refusing
    /// the call when none is registered.
    fn serve(&mut self, op: Operation, done: oneshot::Sender<Reply>) {
        match op {
            Operation::Getattr { path } => match &self.handlers.getattr {
                Some(f) => invoke(OpKind::Getattr, || f(path, AttrCompletion::new(done))),
                None => refuse(OpKind::Getattr, done),
            },
            Operation::Readdir { path, sink } => match &self.handlers.readdir {
                Some(f) => invoke(OpKind::Readdir, || f(path, DirCompletion::new(sink, done))),
                None => refuse(OpKind::Readdir, done),
            },
            Operation::Open { path } => match &self.handlers.open {
                Some(f) => invoke(OpKind::Open, || {
                    f(path, OpCompletion::new(OpKind::Open, done))
                }),
                None => refuse(OpKind::Open, done),
            },
            Operation::Read { path, offset, len } => match &self.handlers.read {
                Some(f) => invoke(OpKind::Read, || {
                    f(path, offset, len, ReadCompletion::new(len, done))
                }),
                None => refuse(OpKind::Read, done),
            },
            Operation::Write { path, offset, data } => match &self.handlers.write {
                Some(f) => {
                    let len = data.len() as u64;
                    invoke(OpKind::Write, || {
                        f(path, offset, len, WriteCompletion::new(data, done))
                    })
                }
                None => refuse(OpKind::Write, done),
            },
            Operation::Create { path } => match &self.handlers.create {
                Some(f) => invoke(OpKind::Create, || {
                    f(path, OpCompletion::new(OpKind::Create, done))
                }),
                None => refuse(OpKind::Create, done),
            },
            Operation::Unlink { path } => match &self.handlers.unlink {
                Some(f) => invoke(OpKind::Unlink, || {
                    f(path, OpCompletion::new(OpKind::Unlink, done))
                }),
                None => refuse(OpKind::Unlink, done),
            },
            Operation::Rename { from, to } => match &self.handlers.rename {
                Some(f) => invoke(OpKind::Rename, || {
                    f(from, to, OpCompletion::new(OpKind::Rename, done))
                }),
                None => refuse(OpKind::Rename, done),
            },
            Operation::Mkdir { path } => match &self.handlers.mkdir {
                Some(f) => invoke(OpKind::Mkdir, || {
                    f(path, OpCompletion::new(OpKind::Mkdir, done))
                }),
                None => refuse(OpKind::Mkdir, done),
            },
            Operation::Rmdir { path } => match &self.handlers.rmdir {
                Some(f) => invoke(OpKind::Rmdir, || {
                    f(path, OpCompletion::new(OpKind::Rmdir, done))
                }),
                None => refuse(OpKind::Rmdir, done),
            },
            Operation::Init => match &self.handlers.init {
                Some(f) => invoke(OpKind::Init, || f(OpCompletion::new(OpKind::Init, done))),
                None => refuse(OpKind::Init, done),
            },
            Operation::Destroy => match &self.handlers.destroy {
                Some(f) => invoke(OpKind::Destroy, || {
                    f(OpCompletion::new(OpKind::Destroy, done))
                }),
                None => refuse(OpKind::Destroy, done),
            },
        }
    }
}

/// Runs one handler invocation, containing panics so the bound completion
/// unwinds through its drop path and still releases the worker.
fn invoke<F: FnOnce()>(kind: OpKind, f: F) {
    debug!(target: "fsbridge", op = kind.as_str(), "dispatching");
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(target: "fsbridge", op = kind.as_str(), "handler panicked");
    }
}

fn refuse(kind: OpKind, done: oneshot::Sender<Reply>) {
    debug!(target: "fsbridge", op = kind.as_str(), "no handler registered, failing with EPERM");
    let _ = done.send(Reply::error(libc::EPERM));
}
