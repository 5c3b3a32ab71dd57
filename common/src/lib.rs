//! Ledger chat state machine: a write-once username registry coupled to a
//! single append-only message log with two-party conversation retrieval.
//!
//! Everything here is deterministic. Time and caller identity come in through
//! [`command::CallContext`], supplied by whichever environment hosts the store
//! (the Freenet contract or the local ledger host).

pub mod command;
pub mod conversation;
pub mod error;
pub mod identity;
pub mod message;
pub mod registry;
pub mod store;
pub mod sync;

pub use command::{CallContext, ChatCommand, SignedCommand};
pub use error::ChatError;
pub use identity::CallerId;
pub use message::{Message, MessageSent, Receipt, UserRegistered};
pub use store::ChatStore;
pub use sync::{ChatDelta, ChatSummary, ChatUpdate};
