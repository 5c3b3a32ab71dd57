use thiserror::Error;

/// Every way a chat store operation can be rejected.
///
/// All variants are validation failures: they depend only on the arguments and
/// the current state, and a rejected operation never changes the store. The
/// display strings are part of the observable contract, clients match on them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    #[error("Username cannot be empty")]
    EmptyUsername,

    #[error("Username already exists")]
    DuplicateUsername,

    #[error("User already registered")]
    AlreadyRegistered,

    #[error("User not registered")]
    SenderNotRegistered,

    #[error("Receiver does not exist")]
    ReceiverNotFound,

    #[error("Message index out of range: {index} (log length {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Invalid command signature")]
    InvalidSignature,

    #[error("Command out of sequence: expected {expected}, got {got}")]
    ReplayedCommand { expected: u64, got: u64 },

    #[error("Message references unregistered user {name:?}")]
    UnknownParticipant { name: String },

    #[error("Log gap: delta starts at {got}, local log ends at {expected}")]
    LogGap { expected: usize, got: usize },

    #[error("Log conflict at index {index}")]
    LogConflict { index: usize },
}
