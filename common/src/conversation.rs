use std::collections::BTreeMap;

use crate::message::Message;

/// Unordered participant pair, stored as `(min, max)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConversationKey(String, String);

impl ConversationKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            ConversationKey(a.to_string(), b.to_string())
        } else {
            ConversationKey(b.to_string(), a.to_string())
        }
    }

    pub fn of(message: &Message) -> Self {
        Self::new(&message.sender_username, &message.receiver_username)
    }
}

/// Log positions per conversation, ascending.
///
/// Derived from the log and kept in step with it by the store; never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationIndex {
    entries: BTreeMap<ConversationKey, Vec<usize>>,
}

impl ConversationIndex {
    pub fn rebuild(log: &[Message]) -> Self {
        let mut index = ConversationIndex::default();
        for (position, message) in log.iter().enumerate() {
            index.record(ConversationKey::of(message), position);
        }
        index
    }

    /// Positions must be recorded in append order.
    pub fn record(&mut self, key: ConversationKey, position: usize) {
        self.entries.entry(key).or_default().push(position);
    }

    pub fn positions(&self, a: &str, b: &str) -> &[usize] {
        self.entries
            .get(&ConversationKey::new(a, b))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn conversation_count(&self) -> usize {
        self.entries.len()
    }
}
