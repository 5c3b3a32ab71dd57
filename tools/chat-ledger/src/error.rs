use std::path::PathBuf;

use chainchat_common::ChatError;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// The store rejected the operation.
    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("command issued at {issued_at} is more than {max_secs}s from ledger time {now}")]
    ClockSkew {
        issued_at: DateTime<Utc>,
        now: DateTime<Utc>,
        max_secs: i64,
    },

    #[error("I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt snapshot {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("snapshot {path} failed validation: {source}")]
    InvalidSnapshot {
        path: PathBuf,
        #[source]
        source: ChatError,
    },

    #[error("invalid account label {0:?} (use letters, digits, '-' or '_')")]
    InvalidAccountLabel(String),

    #[error("unreadable account key {path}")]
    InvalidAccountKey { path: PathBuf },

    #[error("ledger {path} is locked by another host")]
    Locked { path: PathBuf },

    #[error("max clock skew {secs}s is out of range (at most {max}s)")]
    InvalidClockSkew { secs: u64, max: u64 },

    #[error("ledger host has shut down")]
    Closed,
}

impl LedgerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LedgerError::Io {
            path: path.into(),
            source,
        }
    }

    /// The store's own rejection, if that is what this is.
    pub fn as_chat(&self) -> Option<&ChatError> {
        match self {
            LedgerError::Chat(e) => Some(e),
            _ => None,
        }
    }
}
