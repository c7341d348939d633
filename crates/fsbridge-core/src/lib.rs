// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Call bridge between a blocking filesystem worker and single-threaded
//! async handlers.
//!
//! A bridge couples two scheduling domains. On one side a dedicated
//! worker thread runs a blocking [`WorkerLoop`] (typically a FUSE
//! session), posting one [`Operation`] at a time through its [`Gateway`]
//! and blocking until the result comes back. On the other side a
//! dispatch task on the caller's [`tokio::task::LocalSet`] resolves the
//! registered handler and invokes it with a one-shot completion that
//! marshals the result and releases the worker.
//!
//! The single-in-flight and exactly-once guarantees are structural
//! rather than checked at runtime: the gateway's `&mut` receiver keeps a
//! worker to one exchange at a time, the mailbox holds at most one
//! exchange, and completions are consumed by firing. A completion
//! dropped without firing still releases the worker, with `EIO`.

pub mod completion;
pub mod error;
pub mod handlers;
pub mod types;

mod bridge;
mod dispatch;
mod gateway;

pub use bridge::{mount, BridgeHandle, WorkerLoop};
pub use error::{BridgeError, BridgeResult};
pub use gateway::Gateway;
pub use handlers::Handlers;
pub use types::{EntrySink, FileStat, OpKind, Operation, Reply, ReplyPayload, SinkStatus};
