use std::path::{Path, PathBuf};

use chrono::Duration;

use crate::error::LedgerError;

/// Default tolerance between a command's `issued_at` and the ledger clock.
pub const DEFAULT_MAX_CLOCK_SKEW_SECS: u64 = 300;

/// Largest accepted clock skew tolerance: one week.
pub const MAX_CLOCK_SKEW_SECS: u64 = 7 * 24 * 60 * 60;

/// Bound on queued, not yet sequenced commands.
pub const COMMAND_QUEUE_DEPTH: usize = 64;

/// Bound on buffered events per subscriber before it starts lagging.
pub const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// JSON snapshot of the committed store.
    pub state_path: PathBuf,
    /// One hex seed file per account label.
    pub accounts_dir: PathBuf,
    pub max_clock_skew: Duration,
}

impl LedgerConfig {
    /// Snapshot and accounts laid out under `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        LedgerConfig {
            state_path: dir.join("ledger.json"),
            accounts_dir: dir.join("accounts"),
            max_clock_skew: Duration::seconds(DEFAULT_MAX_CLOCK_SKEW_SECS as i64),
        }
    }

    pub fn with_max_clock_skew_secs(mut self, secs: u64) -> Result<Self, LedgerError> {
        let invalid = LedgerError::InvalidClockSkew {
            secs,
            max: MAX_CLOCK_SKEW_SECS,
        };
        if secs > MAX_CLOCK_SKEW_SECS {
            return Err(invalid);
        }
        self.max_clock_skew = i64::try_from(secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or(invalid)?;
        Ok(self)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self::in_dir(&default_data_dir())
    }
}

/// `<data dir>/chainchat`, falling back to `/tmp` where the platform has no
/// data directory.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("chainchat")
}
