// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! fsbridge FUSE host — mounts a volume served across the bridge
//!
//! This binary mounts a FUSE filesystem whose operations are posted over
//! the bridge and answered by handlers running on this thread's LocalSet.

#[cfg(all(feature = "fuse", target_os = "linux"))]
mod adapter;
#[cfg(all(feature = "fuse", target_os = "linux"))]
mod inodes;
#[cfg(all(feature = "fuse", target_os = "linux"))]
mod worker;

use anyhow::Result;
use clap::Parser;
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
struct Args {
    /// Mount point for the filesystem
    mount_point: PathBuf,

    /// Configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Allow other users to access the filesystem
    #[arg(long)]
    allow_other: bool,

    /// Allow root to access the filesystem
    #[arg(long)]
    allow_root: bool,

    /// Auto unmount on process exit
    #[arg(long)]
    auto_unmount: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct HostConfig {
    fsname: String,
    allow_other: bool,
    allow_root: bool,
    auto_unmount: bool,
    attr_ttl_ms: u64,
    entry_ttl_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            fsname: "fsbridge".to_string(),
            allow_other: false,
            allow_root: false,
            auto_unmount: false,
            attr_ttl_ms: 1000,
            entry_ttl_ms: 1000,
        }
    }
}

fn load_config(config_path: Option<PathBuf>) -> Result<HostConfig> {
    match config_path {
        Some(path) => {
            let content = fs::read_to_string(&path)?;
            let config: HostConfig = serde_json::from_str(&content)?;
            Ok(config)
        }
        None => {
            // Default configuration
            Ok(HostConfig::default())
        }
    }
}

/// Built-in handler set: an empty read-only root directory. Stands in
/// until an embedding program registers its own handlers.
#[cfg(all(feature = "fuse", target_os = "linux"))]
fn empty_volume() -> fsbridge_core::Handlers {
    use fsbridge_core::{FileStat, Handlers};

    Handlers::new()
        .on_init(|done| {
            info!("bridge handlers initialized");
            done.ok();
        })
        .on_destroy(|done| done.ok())
        .on_getattr(|path, done| {
            if path == "/" {
                done.attrs(FileStat {
                    mode: libc::S_IFDIR | 0o755,
                    ..FileStat::default()
                });
            } else {
                done.error(libc::ENOENT);
            }
        })
        .on_readdir(|path, done| {
            if path == "/" {
                done.entries(Vec::<String>::new());
            } else {
                done.error(libc::ENOENT);
            }
        })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();

    info!("Starting fsbridge FUSE host");
    info!("Mount point: {}", args.mount_point.display());

    let config = load_config(args.config.clone())?;
    info!("Configuration loaded: {:?}", config);

    #[cfg(all(feature = "fuse", target_os = "linux"))]
    {
        use std::time::Duration;

        let mut mount_options = vec![fuser::MountOption::FSName(config.fsname.clone())];

        if args.allow_other || config.allow_other {
            mount_options.push(fuser::MountOption::AllowOther);
        }

        if args.allow_root || config.allow_root {
            mount_options.push(fuser::MountOption::AllowRoot);
        }

        if args.auto_unmount || config.auto_unmount {
            mount_options.push(fuser::MountOption::AutoUnmount);
        }

        let fuse_worker = worker::FuseWorker::new(
            args.mount_point.clone(),
            mount_options,
            Duration::from_millis(config.attr_ttl_ms),
            Duration::from_millis(config.entry_ttl_ms),
        );

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let local = tokio::task::LocalSet::new();
        local.block_on(&runtime, async move {
            let bridge = fsbridge_core::mount(Box::new(fuse_worker), empty_volume())?;
            info!("fsbridge FUSE host mounted; blocking until unmount");
            bridge.joined().await?;
            Ok::<(), anyhow::Error>(())
        })?;
    }

    #[cfg(not(all(feature = "fuse", target_os = "linux")))]
    {
        use tracing::warn;

        warn!("FUSE support not compiled in. This binary is for testing only.");
        info!("Host configuration parsed successfully: {:?}", config);
        info!("To enable FUSE support, compile with: cargo build --features fuse");
    }

    Ok(())
}
