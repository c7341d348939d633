// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Worker loop hosting the FUSE session.

#[cfg(not(all(feature = "fuse", target_os = "linux")))]
compile_error!("This module requires the 'fuse' feature on Linux");

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use fsbridge_core::{Gateway, WorkerLoop};
use fuser::MountOption;
use tracing::info;

use crate::adapter::BridgeFs;

/// Runs a FUSE session on the bridge's worker thread. The session serves
/// the kernel queue one request at a time and blocks inside the adapter
/// whenever an operation crosses the bridge.
pub struct FuseWorker {
    mountpoint: PathBuf,
    options: Vec<MountOption>,
    attr_ttl: Duration,
    entry_ttl: Duration,
}

impl FuseWorker {
    pub fn new(
        mountpoint: PathBuf,
        options: Vec<MountOption>,
        attr_ttl: Duration,
        entry_ttl: Duration,
    ) -> Self {
        FuseWorker {
            mountpoint,
            options,
            attr_ttl,
            entry_ttl,
        }
    }
}

impl WorkerLoop for FuseWorker {
    fn run(self: Box<Self>, gateway: &mut Gateway) -> io::Result<()> {
        let fs = BridgeFs::new(gateway, self.attr_ttl, self.entry_ttl);
        info!("Mounting FUSE session at {}", self.mountpoint.display());
        // Foreground, single-threaded; returns when the volume unmounts.
        fuser::mount2(fs, &self.mountpoint, &self.options)
    }
}
