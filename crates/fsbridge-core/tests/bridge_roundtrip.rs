// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! End-to-end bridge exercises: a scripted worker thread posts
//! operations through its gateway while the handlers run on a LocalSet.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};

use fsbridge_core::{
    mount, EntrySink, FileStat, Gateway, Handlers, Operation, Reply, ReplyPayload, SinkStatus,
    WorkerLoop,
};

/// Worker loop that plays a fixed script of operations and reports every
/// reply it was released with.
struct ScriptedWorker {
    script: Vec<Operation>,
    results: std_mpsc::Sender<Reply>,
}

impl ScriptedWorker {
    fn new(script: Vec<Operation>) -> (Box<Self>, std_mpsc::Receiver<Reply>) {
        let (results, rx) = std_mpsc::channel();
        (Box::new(ScriptedWorker { script, results }), rx)
    }
}

impl WorkerLoop for ScriptedWorker {
    fn run(self: Box<Self>, gateway: &mut Gateway) -> std::io::Result<()> {
        let ScriptedWorker { script, results } = *self;
        for op in script {
            let reply = gateway.call(op);
            let _ = results.send(reply);
        }
        Ok(())
    }
}

/// Runs one bridge to completion and collects the worker-side replies.
fn run_bridge(script: Vec<Operation>, handlers: Handlers) -> Vec<Reply> {
    let (worker, results) = ScriptedWorker::new(script);
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let local = tokio::task::LocalSet::new();
    local.block_on(&rt, async move {
        let handle = mount(worker, handlers).unwrap();
        handle.joined().await.unwrap();
    });
    results.iter().collect()
}

struct SharedSink {
    names: Arc<Mutex<Vec<String>>>,
    pushes: Arc<AtomicUsize>,
    capacity: usize,
}

impl SharedSink {
    fn new(capacity: usize) -> (Box<Self>, Arc<Mutex<Vec<String>>>, Arc<AtomicUsize>) {
        let names = Arc::new(Mutex::new(Vec::new()));
        let pushes = Arc::new(AtomicUsize::new(0));
        let sink = Box::new(SharedSink {
            names: names.clone(),
            pushes: pushes.clone(),
            capacity,
        });
        (sink, names, pushes)
    }
}

impl EntrySink for SharedSink {
    fn push(&mut self, name: &str) -> SinkStatus {
        self.pushes.fetch_add(1, Ordering::SeqCst);
        let mut names = self.names.lock().unwrap();
        names.push(name.to_string());
        if names.len() >= self.capacity {
            SinkStatus::Full
        } else {
            SinkStatus::Accepted
        }
    }
}

#[test]
fn test_all_operation_kinds_roundtrip() {
    let (sink, _, _) = SharedSink::new(16);
    let script = vec![
        Operation::Init,
        Operation::Getattr {
            path: "/f".to_string(),
        },
        Operation::Readdir {
            path: "/".to_string(),
            sink,
        },
        Operation::Open {
            path: "/f".to_string(),
        },
        Operation::Read {
            path: "/f".to_string(),
            offset: 0,
            len: 4,
        },
        Operation::Write {
            path: "/f".to_string(),
            offset: 0,
            data: b"data".to_vec(),
        },
        Operation::Create {
            path: "/new".to_string(),
        },
        Operation::Unlink {
            path: "/new".to_string(),
        },
        Operation::Rename {
            from: "/f".to_string(),
            to: "/g".to_string(),
        },
        Operation::Mkdir {
            path: "/d".to_string(),
        },
        Operation::Rmdir {
            path: "/d".to_string(),
        },
        Operation::Destroy,
    ];
    let handlers = Handlers::new()
        .on_init(|done| done.ok())
        .on_destroy(|done| done.ok())
        .on_getattr(|_, done| {
            done.attrs(FileStat {
                mode: 0o100644,
                ..FileStat::default()
            })
        })
        .on_readdir(|_, done| done.entries(["x"]))
        .on_open(|_, done| done.ok())
        .on_read(|_, _, len, done| done.data(vec![0u8; len as usize]))
        .on_write(|_, _, _, done| {
            let count = done.data().len() as u32;
            done.written(count);
        })
        .on_create(|_, done| done.ok())
        .on_unlink(|_, done| done.ok())
        .on_rename(|_, _, done| done.ok())
        .on_mkdir(|_, done| done.ok())
        .on_rmdir(|_, done| done.ok());
    let replies = run_bridge(script, handlers);
    assert_eq!(replies.len(), 12);
    for reply in &replies {
        assert!(reply.retval >= 0, "retval {} in {reply:?}", reply.retval);
    }
}

#[test]
fn test_getattr_marshals_size_and_mode_only() {
    let script = vec![Operation::Getattr {
        path: "/f".to_string(),
    }];
    let handlers = Handlers::new().on_getattr(|path, done| {
        assert_eq!(path, "/f");
        done.attrs(FileStat {
            size: 42,
            mode: 0o100644,
            nlink: 3,
            uid: 1000,
            gid: 1000,
            atime: 7,
            mtime: 8,
            ctime: 9,
        });
    });
    let replies = run_bridge(script, handlers);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].retval, 0);
    assert_eq!(
        replies[0].payload,
        ReplyPayload::Attrs(FileStat {
            size: 42,
            mode: 0o100644,
            ..FileStat::default()
        })
    );
}

#[test]
fn test_getattr_failure_reports_errno() {
    let script = vec![Operation::Getattr {
        path: "/missing".to_string(),
    }];
    let handlers = Handlers::new().on_getattr(|_, done| done.error(libc::ENOENT));
    let replies = run_bridge(script, handlers);
    assert_eq!(replies[0].retval, -libc::ENOENT);
    assert_eq!(replies[0].payload, ReplyPayload::None);
}

#[test]
fn test_readdir_delivers_names_in_order() {
    let (sink, names, pushes) = SharedSink::new(16);
    let script = vec![Operation::Readdir {
        path: "/".to_string(),
        sink,
    }];
    let handlers = Handlers::new().on_readdir(|_, done| done.entries(["a", "b", "c"]));
    let replies = run_bridge(script, handlers);
    assert_eq!(replies[0].retval, 0);
    assert_eq!(*names.lock().unwrap(), vec!["a", "b", "c"]);
    assert_eq!(pushes.load(Ordering::SeqCst), 3);
}

#[test]
fn test_readdir_stops_when_sink_is_full() {
    let (sink, names, pushes) = SharedSink::new(1);
    let script = vec![Operation::Readdir {
        path: "/".to_string(),
        sink,
    }];
    let handlers = Handlers::new().on_readdir(|_, done| done.entries(["a", "b", "c"]));
    let replies = run_bridge(script, handlers);
    assert_eq!(replies[0].retval, 0);
    assert_eq!(*names.lock().unwrap(), vec!["a"]);
    assert_eq!(pushes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_read_clamps_reply_to_requested_len() {
    let script = vec![Operation::Read {
        path: "/f".to_string(),
        offset: 0,
        len: 3,
    }];
    let handlers = Handlers::new().on_read(|_, _, _, done| done.data(b"hello".to_vec()));
    let replies = run_bridge(script, handlers);
    assert_eq!(replies[0].retval, 3);
    assert_eq!(replies[0].payload, ReplyPayload::Data(b"hel".to_vec()));
}

#[test]
fn test_write_failure_reports_errno() {
    let script = vec![Operation::Write {
        path: "/f".to_string(),
        offset: 0,
        data: b"12345".to_vec(),
    }];
    let handlers = Handlers::new().on_write(|_, _, len, done| {
        assert_eq!(len, 5);
        assert_eq!(done.data(), b"12345");
        done.error(libc::EIO);
    });
    let replies = run_bridge(script, handlers);
    assert_eq!(replies[0].retval, -libc::EIO);
}

#[test]
fn test_unregistered_operation_fails_with_eperm() {
    let script = vec![Operation::Open {
        path: "/f".to_string(),
    }];
    let replies = run_bridge(script, Handlers::new());
    assert_eq!(replies[0].retval, -libc::EPERM);
}

#[test]
fn test_lifecycle_results_always_succeed() {
    let script = vec![Operation::Init, Operation::Destroy];
    let handlers = Handlers::new()
        .on_init(|done| done.error(libc::ENOSYS))
        .on_destroy(|done| done.error(libc::ENOSYS));
    let replies = run_bridge(script, handlers);
    assert_eq!(replies[0].retval, 0);
    assert_eq!(replies[1].retval, 0);
}

#[test]
fn test_dropped_completion_releases_with_eio() {
    let script = vec![Operation::Open {
        path: "/f".to_string(),
    }];
    let handlers = Handlers::new().on_open(|_, done| drop(done));
    let replies = run_bridge(script, handlers);
    assert_eq!(replies[0].retval, -libc::EIO);
}

#[test]
fn test_worker_survives_handler_panic() {
    let script = vec![
        Operation::Open {
            path: "/a".to_string(),
        },
        Operation::Getattr {
            path: "/b".to_string(),
        },
    ];
    let handlers = Handlers::new()
        .on_open(|_, _done| panic!("handler blew up"))
        .on_getattr(|_, done| done.attrs(FileStat::default()));
    let replies = run_bridge(script, handlers);
    assert_eq!(replies.len(), 2);
    assert_eq!(replies[0].retval, -libc::EIO);
    assert_eq!(replies[1].retval, 0);
}

#[test]
fn test_completion_can_fire_from_spawned_task() {
    let script = vec![Operation::Read {
        path: "/f".to_string(),
        offset: 1,
        len: 3,
    }];
    let handlers = Handlers::new().on_read(|_, offset, len, done| {
        tokio::task::spawn_local(async move {
            tokio::task::yield_now().await;
            let src = b"abcdef";
            let start = offset as usize;
            let end = (start + len as usize).min(src.len());
            done.data(src[start..end].to_vec());
        });
    });
    let replies = run_bridge(script, handlers);
    assert_eq!(replies[0].retval, 3);
    assert_eq!(replies[0].payload, ReplyPayload::Data(b"bcd".to_vec()));
}

#[test]
fn test_bridges_are_independent() {
    let (worker_a, results_a) = ScriptedWorker::new(vec![Operation::Open {
        path: "/a".to_string(),
    }]);
    let (worker_b, results_b) = ScriptedWorker::new(vec![Operation::Open {
        path: "/b".to_string(),
    }]);
    let handlers_a = Handlers::new().on_open(|path, done| {
        assert_eq!(path, "/a");
        done.ok();
    });
    let handlers_b = Handlers::new().on_open(|_, done| done.error(libc::EACCES));

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let local = tokio::task::LocalSet::new();
    local.block_on(&rt, async move {
        let a = mount(worker_a, handlers_a).unwrap();
        let b = mount(worker_b, handlers_b).unwrap();
        a.joined().await.unwrap();
        b.joined().await.unwrap();
    });

    let got_a: Vec<Reply> = results_a.iter().collect();
    let got_b: Vec<Reply> = results_b.iter().collect();
    assert_eq!(got_a[0].retval, 0);
    assert_eq!(got_b[0].retval, -libc::EACCES);
}

#[test]
fn test_empty_script_joins_cleanly() {
    let replies = run_bridge(Vec::new(), Handlers::new());
    assert!(replies.is_empty());
}
