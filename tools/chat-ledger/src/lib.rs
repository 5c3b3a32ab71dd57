//! Local execution environment for the chat ledger.
//!
//! Plays the role a blockchain plays for the store: authenticates callers,
//! stamps ledger time, totally orders every mutation through one writer task,
//! persists committed state, and fans out events to observers.

pub mod accounts;
pub mod config;
pub mod error;
pub mod host;
pub mod snapshot;

pub use config::LedgerConfig;
pub use error::LedgerError;
pub use host::{LedgerHandle, LedgerHost};
