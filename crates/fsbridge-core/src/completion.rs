// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! One-shot completion continuations bound to dispatched operations.
//!
//! Each dispatched handler receives exactly one completion value, typed
//! for its operation's reply shape. Firing a completion consumes it,
//! marshals the handler's result into a [`Reply`] and releases the
//! blocked worker. Dropping one unfired releases the worker with `EIO`,
//! so a lost continuation cannot strand the worker thread.

use tokio::sync::oneshot;
use tracing::warn;

use crate::types::{EntrySink, FileStat, OpKind, Reply, ReplyPayload, SinkStatus};

/// Shared release machinery. The sender slot empties on the first fire;
/// an unfired slot is drained by `Drop`.
struct CompletionCore {
    kind: OpKind,
    tx: Option<oneshot::Sender<Reply>>,
}

impl CompletionCore {
    fn new(kind: OpKind, tx: oneshot::Sender<Reply>) -> Self {
        CompletionCore { kind, tx: Some(tx) }
    }

    fn fire(&mut self, reply: Reply) {
        if let Some(tx) = self.tx.take() {
            // The receiver only disappears when the bridge is torn down.
            let _ = tx.send(reply);
        }
    }
}

impl Drop for CompletionCore {
    fn drop(&mut self) {
        if let Some(tx) = self.tx.take() {
            warn!(
                target: "fsbridge",
                op = self.kind.as_str(),
                "completion dropped without firing, releasing worker with EIO"
            );
            let _ = tx.send(Reply::error(libc::EIO));
        }
    }
}

/// Completion for `getattr`.
pub struct AttrCompletion {
    core: CompletionCore,
}

impl AttrCompletion {
    pub(crate) fn new(tx: oneshot::Sender<Reply>) -> Self {
        AttrCompletion {
            core: CompletionCore::new(OpKind::Getattr, tx),
        }
    }

    /// Succeeds with the given attributes. Only `size` and `mode` are
    /// marshaled; every other field of the reply stays zero.
    pub fn attrs(mut self, stat: FileStat) {
        let sanitized = FileStat {
            size: stat.size,
            mode: stat.mode,
            ..FileStat::default()
        };
        self.core.fire(Reply {
            retval: 0,
            payload: ReplyPayload::Attrs(sanitized),
        });
    }

    /// Fails the operation with a positive errno.
    pub fn error(mut self, errno: i32) {
        self.core.fire(Reply::error(errno));
    }
}

/// Completion for `readdir`. Holds the request's fill-sink; entry names
/// reach the worker through the sink before the release, never through
/// the reply payload.
pub struct DirCompletion {
    core: CompletionCore,
    sink: Box<dyn EntrySink>,
}

impl DirCompletion {
    pub(crate) fn new(sink: Box<dyn EntrySink>, tx: oneshot::Sender<Reply>) -> Self {
        DirCompletion {
            core: CompletionCore::new(OpKind::Readdir, tx),
            sink,
        }
    }

    /// Succeeds with the given entry names, pushing each into the sink in
    /// order and stopping at the first [`SinkStatus::Full`].
    pub fn entries<I, S>(mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            if self.sink.push(name.as_ref()) == SinkStatus::Full {
                break;
            }
        }
        self.core.fire(Reply::ok());
    }

    /// Fails the operation; the sink is not touched.
    pub fn error(mut self, errno: i32) {
        self.core.fire(Reply::error(errno));
    }
}

/// Completion for `read`.
pub struct ReadCompletion {
    core: CompletionCore,
    requested: u64,
}

impl ReadCompletion {
    pub(crate) fn new(requested: u64, tx: oneshot::Sender<Reply>) -> Self {
        ReadCompletion {
            core: CompletionCore::new(OpKind::Read, tx),
            requested,
        }
    }

    /// Succeeds with the bytes read. The reply's count and payload are
    /// clamped to the requested length; a buffer shorter than requested
    /// is reported as-is.
    pub fn data(mut self, mut bytes: Vec<u8>) {
        let limit = usize::try_from(self.requested).unwrap_or(usize::MAX);
        if bytes.len() > limit {
            bytes.truncate(limit);
        }
        let count = saturating_count(bytes.len());
        self.core.fire(Reply {
            retval: count,
            payload: ReplyPayload::Data(bytes),
        });
    }

    pub fn error(mut self, errno: i32) {
        self.core.fire(Reply::error(errno));
    }
}

/// Completion for `write`. Owns the exchange's transient source buffer;
/// the buffer is freed when the completion fires or drops.
pub struct WriteCompletion {
    core: CompletionCore,
    data: Vec<u8>,
}

impl WriteCompletion {
    pub(crate) fn new(data: Vec<u8>, tx: oneshot::Sender<Reply>) -> Self {
        WriteCompletion {
            core: CompletionCore::new(OpKind::Write, tx),
            data,
        }
    }

    /// The bytes to persist.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Succeeds with the number of bytes written.
    pub fn written(mut self, count: u32) {
        self.core.fire(Reply {
            retval: saturating_count(count),
            payload: ReplyPayload::None,
        });
    }

    pub fn error(mut self, errno: i32) {
        self.core.fire(Reply::error(errno));
    }
}

/// Completion for operations whose reply is a bare status: open, create,
/// unlink, rename, mkdir, rmdir, init and destroy.
pub struct OpCompletion {
    core: CompletionCore,
}

impl OpCompletion {
    pub(crate) fn new(kind: OpKind, tx: oneshot::Sender<Reply>) -> Self {
        OpCompletion {
            core: CompletionCore::new(kind, tx),
        }
    }

    pub fn ok(mut self) {
        self.core.fire(Reply::ok());
    }

    pub fn error(mut self, errno: i32) {
        self.core.fire(Reply::error(errno));
    }
}

// Counts above i32::MAX saturate instead of wrapping into the errno range.
fn saturating_count(count: impl TryInto<i32>) -> i32 {
    count.try_into().unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct RecordingSink {
        names: Arc<Mutex<Vec<String>>>,
        pushes: Arc<AtomicUsize>,
        capacity: usize,
    }

    impl EntrySink for RecordingSink {
        fn push(&mut self, name: &str) -> SinkStatus {
            self.pushes.fetch_add(1, Ordering::SeqCst);
            let mut names = self.names.lock().expect("sink lock");
            names.push(name.to_string());
            if names.len() >= self.capacity {
                SinkStatus::Full
            } else {
                SinkStatus::Accepted
            }
        }
    }

    fn dir_completion(
        capacity: usize,
    ) -> (
        DirCompletion,
        oneshot::Receiver<Reply>,
        Arc<Mutex<Vec<String>>>,
        Arc<AtomicUsize>,
    ) {
        let names = Arc::new(Mutex::new(Vec::new()));
        let pushes = Arc::new(AtomicUsize::new(0));
        let sink = Box::new(RecordingSink {
            names: names.clone(),
            pushes: pushes.clone(),
            capacity,
        });
        let (tx, rx) = oneshot::channel();
        (DirCompletion::new(sink, tx), rx, names, pushes)
    }

    #[test]
    fn test_getattr_marshals_size_and_mode_only() {
        let (tx, mut rx) = oneshot::channel();
        let done = AttrCompletion::new(tx);
        done.attrs(FileStat {
            size: 42,
            mode: 0o100644,
            nlink: 7,
            uid: 1000,
            gid: 1000,
            atime: 111,
            mtime: 222,
            ctime: 333,
        });
        let reply = rx.try_recv().expect("released");
        assert_eq!(reply.retval, 0);
        assert_eq!(
            reply.payload,
            ReplyPayload::Attrs(FileStat {
                size: 42,
                mode: 0o100644,
                ..FileStat::default()
            })
        );
    }

    #[test]
    fn test_getattr_failure_carries_no_attrs() {
        let (tx, mut rx) = oneshot::channel();
        AttrCompletion::new(tx).error(libc::ENOENT);
        let reply = rx.try_recv().expect("released");
        assert_eq!(reply.retval, -libc::ENOENT);
        assert_eq!(reply.payload, ReplyPayload::None);
    }

    #[test]
    fn test_readdir_pushes_in_order_then_releases() {
        let (done, mut rx, names, pushes) = dir_completion(16);
        done.entries(["a", "b", "c"]);
        let reply = rx.try_recv().expect("released");
        assert_eq!(reply.retval, 0);
        assert_eq!(reply.payload, ReplyPayload::None);
        assert_eq!(*names.lock().expect("names"), vec!["a", "b", "c"]);
        assert_eq!(pushes.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_readdir_stops_at_full_sink() {
        let (done, mut rx, names, pushes) = dir_completion(1);
        done.entries(["a", "b", "c"]);
        assert_eq!(rx.try_recv().expect("released").retval, 0);
        assert_eq!(*names.lock().expect("names"), vec!["a"]);
        assert_eq!(pushes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_readdir_error_skips_the_sink() {
        let (done, mut rx, names, pushes) = dir_completion(16);
        done.error(libc::ENOTDIR);
        assert_eq!(rx.try_recv().expect("released").retval, -libc::ENOTDIR);
        assert!(names.lock().expect("names").is_empty());
        assert_eq!(pushes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_read_clamps_to_requested_len() {
        let (tx, mut rx) = oneshot::channel();
        ReadCompletion::new(3, tx).data(b"hello".to_vec());
        let reply = rx.try_recv().expect("released");
        assert_eq!(reply.retval, 3);
        assert_eq!(reply.payload, ReplyPayload::Data(b"hel".to_vec()));
    }

    #[test]
    fn test_read_short_buffer_reports_actual_count() {
        let (tx, mut rx) = oneshot::channel();
        ReadCompletion::new(10, tx).data(b"ab".to_vec());
        let reply = rx.try_recv().expect("released");
        assert_eq!(reply.retval, 2);
        assert_eq!(reply.payload, ReplyPayload::Data(b"ab".to_vec()));
    }

    #[test]
    fn test_write_reports_count_and_exposes_buffer() {
        let (tx, mut rx) = oneshot::channel();
        let done = WriteCompletion::new(b"payload".to_vec(), tx);
        assert_eq!(done.data(), b"payload");
        done.written(7);
        assert_eq!(rx.try_recv().expect("released").retval, 7);
    }

    #[test]
    fn test_write_error_passes_negative_errno() {
        let (tx, mut rx) = oneshot::channel();
        WriteCompletion::new(b"12345".to_vec(), tx).error(libc::EIO);
        let reply = rx.try_recv().expect("released");
        assert_eq!(reply.retval, -libc::EIO);
        assert_eq!(reply.payload, ReplyPayload::None);
    }

    #[test]
    fn test_write_count_saturates_at_i32_max() {
        let (tx, mut rx) = oneshot::channel();
        WriteCompletion::new(Vec::new(), tx).written(u32::MAX);
        assert_eq!(rx.try_recv().expect("released").retval, i32::MAX);
    }

    #[test]
    fn test_oversized_counts_saturate() {
        assert_eq!(saturating_count(512u32), 512);
        assert_eq!(saturating_count(u32::MAX), i32::MAX);
        assert_eq!(saturating_count(usize::MAX), i32::MAX);
    }

    #[test]
    fn test_dropped_completion_releases_with_eio() {
        let (tx, mut rx) = oneshot::channel();
        drop(OpCompletion::new(OpKind::Open, tx));
        assert_eq!(rx.try_recv().expect("released").retval, -libc::EIO);
    }

    #[test]
    fn test_fired_completion_releases_exactly_once() {
        let (tx, mut rx) = oneshot::channel();
        OpCompletion::new(OpKind::Mkdir, tx).ok();
        assert_eq!(rx.try_recv().expect("released").retval, 0);
        // the sender is spent; nothing else can arrive
        assert!(rx.try_recv().is_err());
    }
}
