// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Bridge assembly: worker thread, mailbox, dispatch task.

use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;

use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::dispatch::Dispatcher;
use crate::error::{BridgeError, BridgeResult};
use crate::gateway::Gateway;
use crate::handlers::Handlers;

/// Blocking loop run on the bridge's dedicated worker thread.
///
/// The loop owns the thread until it returns; every interaction with the
/// handler side goes through the gateway it is given. Returning (or
/// failing, or panicking) tears the bridge down.
pub trait WorkerLoop: Send + 'static {
    fn run(self: Box<Self>, gateway: &mut Gateway) -> io::Result<()>;
}

/// Handle to a running bridge.
pub struct BridgeHandle {
    task: tokio::task::JoinHandle<()>,
}

impl BridgeHandle {
    /// Resolves once the dispatch task has stopped, which happens after
    /// the worker loop returned and its thread was joined.
    pub async fn joined(self) -> BridgeResult<()> {
        self.task.await.map_err(|_| BridgeError::DispatchGone)
    }
}

/// Spawns one bridge instance: a named worker thread running `worker` and
/// a dispatch task serving `handlers`.
///
/// Must be called from within a [`tokio::task::LocalSet`] on a
/// current-thread runtime; the registry is not `Send` and stays on the
/// calling thread. Each call creates an independent bridge with its own
/// mailbox, so multiple bridges can share one `LocalSet`.
pub fn mount(worker: Box<dyn WorkerLoop>, handlers: Handlers) -> BridgeResult<BridgeHandle> {
    let (tx, rx) = mpsc::channel(1);
    let gateway = Gateway::new(tx);
    let thread = thread::Builder::new()
        .name("fsbridge-worker".to_string())
        .spawn(move || {
            let mut gateway = gateway;
            match catch_unwind(AssertUnwindSafe(|| worker.run(&mut gateway))) {
                Ok(Ok(())) => debug!(target: "fsbridge", "worker loop finished"),
                Ok(Err(err)) => {
                    error!(target: "fsbridge", error = %err, "worker loop failed")
                }
                Err(_) => error!(target: "fsbridge", "worker loop panicked"),
            }
            gateway.post_exit();
        })?;
    let task = tokio::task::spawn_local(Dispatcher::new(rx, handlers, thread).run());
    Ok(BridgeHandle { task })
}
