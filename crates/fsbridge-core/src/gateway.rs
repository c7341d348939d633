// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Worker-side entry point of the bridge.

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::types::{OpKind, Operation, Reply};

/// One posted operation together with its release channel. The dispatch
/// side answers by firing `done` exactly once.
pub(crate) struct Exchange {
    pub(crate) op: Operation,
    pub(crate) done: oneshot::Sender<Reply>,
}

/// What travels through the bridge mailbox.
pub(crate) enum Inbound {
    /// A posted operation awaiting its reply.
    Exchange(Exchange),
    /// Exit notice, sent once after the worker loop has returned. Only
    /// [`Gateway::post_exit`] emits it; nothing follows it.
    Exit,
}

/// Handle through which the worker thread posts operations into the
/// dispatch task and blocks for their results.
///
/// [`Gateway::call`] takes `&mut self`, so a single worker cannot overlap
/// two exchanges. The methods block the calling thread and must never be
/// used from within an async context.
pub struct Gateway {
    tx: mpsc::Sender<Inbound>,
}

impl Gateway {
    pub(crate) fn new(tx: mpsc::Sender<Inbound>) -> Self {
        Gateway { tx }
    }

    /// Posts `op` and blocks until the matching completion fires.
    ///
    /// If the dispatch task is gone the call degrades to an error reply
    /// instead of hanging: `-EIO` for regular operations, success for the
    /// lifecycle ones whose results the caller ignores anyway.
    pub fn call(&mut self, op: Operation) -> Reply {
        let kind = op.kind();
        let (done, release) = oneshot::channel();
        debug!(target: "fsbridge", op = kind.as_str(), "posting operation");
        if self
            .tx
            .blocking_send(Inbound::Exchange(Exchange { op, done }))
            .is_err()
        {
            warn!(target: "fsbridge", op = kind.as_str(), "mailbox closed, degrading");
            return Self::fallback(kind);
        }
        let reply = match release.blocking_recv() {
            Ok(reply) => reply,
            Err(_) => {
                warn!(target: "fsbridge", op = kind.as_str(), "release channel dropped, degrading");
                return Self::fallback(kind);
            }
        };
        match kind {
            // The framework ignores lifecycle results; keep them pinned
            // to success.
            OpKind::Init | OpKind::Destroy => Reply { retval: 0, ..reply },
            _ => reply,
        }
    }

    /// Posts the exit notice after the worker loop returns. No reply is
    /// awaited; the dispatch side tears down on receipt.
    pub(crate) fn post_exit(self) {
        if self.tx.blocking_send(Inbound::Exit).is_err() {
            debug!(target: "fsbridge", "mailbox already closed on exit");
        }
    }

    fn fallback(kind: OpKind) -> Reply {
        match kind {
            OpKind::Init | OpKind::Destroy => Reply::ok(),
            _ => Reply::error(libc::EIO),
        }
    }
}
