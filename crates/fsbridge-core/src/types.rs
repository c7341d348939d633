// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Request and reply types exchanged across the bridge.

use std::fmt;

/// Outcome of pushing one name into an [`EntrySink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    /// The name was taken; more may follow.
    Accepted,
    /// The receiver is out of space; stop pushing.
    Full,
}

/// Receiver for directory entry names during a readdir exchange.
///
/// The sink travels to the dispatch thread inside the request and is
/// driven only by the readdir completion, before the worker is released.
pub trait EntrySink: Send {
    fn push(&mut self, name: &str) -> SinkStatus;
}

/// File attributes as marshaled by the bridge. Handlers may fill any
/// field, but only `size` and `mode` survive into a getattr reply; the
/// rest are zeroed on the way through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    /// File type and permission bits, `st_mode` layout.
    pub mode: u32,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

/// Operation kind tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Tags the internal shutdown notice; never carried by an [`Operation`].
    Exit,
    Getattr,
    Readdir,
    Open,
    Read,
    Write,
    Create,
    Unlink,
    Rename,
    Mkdir,
    Rmdir,
    Init,
    Destroy,
}

impl OpKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OpKind::Exit => "exit",
            OpKind::Getattr => "getattr",
            OpKind::Readdir => "readdir",
            OpKind::Open => "open",
            OpKind::Read => "read",
            OpKind::Write => "write",
            OpKind::Create => "create",
            OpKind::Unlink => "unlink",
            OpKind::Rename => "rename",
            OpKind::Mkdir => "mkdir",
            OpKind::Rmdir => "rmdir",
            OpKind::Init => "init",
            OpKind::Destroy => "destroy",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request posted through the gateway, carrying only the fields its
/// kind needs. Paths are absolute, `/`-separated volume paths.
///
/// Shutdown is not an operation: the gateway posts a separate exit
/// notice once the worker loop has returned, so no caller can route a
/// shutdown through the handler side.
pub enum Operation {
    Getattr { path: String },
    Readdir { path: String, sink: Box<dyn EntrySink> },
    Open { path: String },
    Read { path: String, offset: u64, len: u64 },
    Write { path: String, offset: u64, data: Vec<u8> },
    Create { path: String },
    Unlink { path: String },
    Rename { from: String, to: String },
    Mkdir { path: String },
    Rmdir { path: String },
    Init,
    Destroy,
}

impl Operation {
    pub fn kind(&self) -> OpKind {
        match self {
            Operation::Getattr { .. } => OpKind::Getattr,
            Operation::Readdir { .. } => OpKind::Readdir,
            Operation::Open { .. } => OpKind::Open,
            Operation::Read { .. } => OpKind::Read,
            Operation::Write { .. } => OpKind::Write,
            Operation::Create { .. } => OpKind::Create,
            Operation::Unlink { .. } => OpKind::Unlink,
            Operation::Rename { .. } => OpKind::Rename,
            Operation::Mkdir { .. } => OpKind::Mkdir,
            Operation::Rmdir { .. } => OpKind::Rmdir,
            Operation::Init => OpKind::Init,
            Operation::Destroy => OpKind::Destroy,
        }
    }
}

/// Payload side of a [`Reply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyPayload {
    None,
    /// Sanitized attributes of a successful getattr.
    Attrs(FileStat),
    /// Bytes of a successful read, already clamped to the requested length.
    Data(Vec<u8>),
}

/// Result of one exchange. `retval` follows the POSIX convention: zero or
/// a positive magnitude on success, a negated errno on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub retval: i32,
    pub payload: ReplyPayload,
}

impl Reply {
    pub fn ok() -> Self {
        Reply {
            retval: 0,
            payload: ReplyPayload::None,
        }
    }

    /// Failure reply from a positive errno.
    pub fn error(errno: i32) -> Self {
        Reply {
            retval: -errno.abs(),
            payload: ReplyPayload::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_kind_names() {
        assert_eq!(OpKind::Getattr.as_str(), "getattr");
        assert_eq!(OpKind::Exit.to_string(), "exit");
    }

    #[test]
    fn test_operation_kind_mapping() {
        let op = Operation::Rename {
            from: "/a".to_string(),
            to: "/b".to_string(),
        };
        assert_eq!(op.kind(), OpKind::Rename);
        assert_eq!(Operation::Init.kind(), OpKind::Init);
    }

    #[test]
    fn test_reply_error_negates_errno() {
        assert_eq!(Reply::error(libc::ENOENT).retval, -libc::ENOENT);
        assert_eq!(Reply::error(-5).retval, -5);
        assert_eq!(Reply::error(libc::EIO).payload, ReplyPayload::None);
    }
}
