// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use thiserror::Error;

/// Infrastructure failures of the bridge itself. Operation outcomes are
/// carried as negative errno values in [`crate::types::Reply`] and never
/// surface here.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("failed to spawn worker thread: {0}")]
    WorkerSpawn(#[from] std::io::Error),
    #[error("dispatch task is gone")]
    DispatchGone,
}

pub type BridgeResult<T> = Result<T, BridgeError>;
