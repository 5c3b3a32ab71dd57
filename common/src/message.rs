use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::CallerId;

/// One entry of the global message log.
///
/// Immutable once appended. Participants are display names that resolved to
/// registered identities at append time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub sender_username: String,
    pub receiver_username: String,
    pub content: String,
    /// Ledger time at append, whole seconds.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// True when this message belongs to the two-party conversation `{a, b}`,
    /// in either direction.
    pub fn is_between(&self, a: &str, b: &str) -> bool {
        (self.sender_username == a && self.receiver_username == b)
            || (self.sender_username == b && self.receiver_username == a)
    }
}

/// Notification emitted for every appended message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSent {
    pub sender_username: String,
    pub receiver_username: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Position of the new message in the log.
    pub index: usize,
}

/// Notification emitted for every new registry binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRegistered {
    pub caller: CallerId,
    pub username: String,
}

/// Outcome of a successfully applied command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Receipt {
    Registered(UserRegistered),
    MessageSent(MessageSent),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(from: &str, to: &str) -> Message {
        Message {
            sender_username: from.into(),
            receiver_username: to.into(),
            content: "hi".into(),
            timestamp: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn between_matches_both_directions() {
        assert!(msg("user1", "user2").is_between("user1", "user2"));
        assert!(msg("user2", "user1").is_between("user1", "user2"));
    }

    #[test]
    fn between_rejects_third_party() {
        assert!(!msg("user1", "user3").is_between("user1", "user2"));
        assert!(!msg("user1", "user1").is_between("user1", "user2"));
    }

    #[test]
    fn self_conversation() {
        assert!(msg("user1", "user1").is_between("user1", "user1"));
    }
}
