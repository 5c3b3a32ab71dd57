//! State replication between peers holding the same chat ledger.
//!
//! Peers exchange a [`ChatSummary`] of what they hold and answer with a
//! [`ChatDelta`] of what the other side is missing. The log only ever grows by
//! prefix extension, so a delta is the registrations the peer lacks plus the
//! log suffix past the peer's length. Command sequence counters travel too, so
//! a command applied on one peer cannot be replayed on another.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::command::SignedCommand;
use crate::error::ChatError;
use crate::identity::CallerId;
use crate::message::{Message, Receipt};
use crate::registry::Registration;
use crate::store::ChatStore;

/// What a peer already holds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub registered: BTreeSet<CallerId>,
    pub log_len: usize,
    #[serde(default)]
    pub sequences: BTreeMap<CallerId, u64>,
}

/// What a peer is missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatDelta {
    pub registrations: BTreeMap<CallerId, Registration>,
    /// Log position of `messages[0]`.
    pub from_index: usize,
    pub messages: Vec<Message>,
    /// Next-sequence counters ahead of the peer's.
    #[serde(default)]
    pub sequences: BTreeMap<CallerId, u64>,
}

impl ChatDelta {
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty() && self.messages.is_empty() && self.sequences.is_empty()
    }
}

/// Update payload accepted by the chat contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChatUpdate {
    /// Caller commands, applied in order.
    Commands(Vec<SignedCommand>),
    /// State pushed by a peer.
    Sync(ChatDelta),
}

impl ChatStore {
    pub fn summarize(&self) -> ChatSummary {
        ChatSummary {
            registered: self.registry().iter().map(|(caller, _)| *caller).collect(),
            log_len: self.message_count(),
            sequences: self.sequences().clone(),
        }
    }

    /// Everything in `self` the summarizing peer lacks, or `None` when it is
    /// up to date.
    pub fn delta(&self, summary: &ChatSummary) -> Option<ChatDelta> {
        let registrations = self
            .registry()
            .iter()
            .filter(|(caller, _)| !summary.registered.contains(*caller))
            .map(|(caller, registration)| (*caller, registration.clone()))
            .collect();
        let sequences = self
            .sequences()
            .iter()
            .filter(|(caller, next)| summary.sequences.get(*caller).map_or(true, |have| have < *next))
            .map(|(caller, next)| (*caller, *next))
            .collect();
        let from_index = summary.log_len.min(self.message_count());
        let delta = ChatDelta {
            registrations,
            from_index,
            messages: self.messages()[from_index..].to_vec(),
            sequences,
        };
        (!delta.is_empty()).then_some(delta)
    }

    /// Merge a peer delta. All-or-nothing: on error `self` is unchanged.
    pub fn merge_delta(&mut self, delta: ChatDelta) -> Result<(), ChatError> {
        let mut next = self.clone();

        for (caller, registration) in delta.registrations {
            if next.registry().get(&caller) == Some(&registration) {
                continue;
            }
            if !registration.verify(&caller) {
                return Err(ChatError::InvalidSignature);
            }
            next.registry_mut().insert(caller, registration)?;
        }

        let len = next.message_count();
        if delta.from_index > len {
            return Err(ChatError::LogGap {
                expected: len,
                got: delta.from_index,
            });
        }
        for (offset, message) in delta.messages.into_iter().enumerate() {
            let position = delta.from_index + offset;
            if position < len {
                if next.messages()[position] != message {
                    return Err(ChatError::LogConflict { index: position });
                }
                continue;
            }
            next.check_participants(&message)?;
            next.append(message);
        }
        for (caller, sequence) in delta.sequences {
            next.advance_sequence(caller, sequence);
        }

        *self = next;
        Ok(())
    }

    /// Merge a full peer state, treating it as a delta against nothing.
    pub fn merge_state(&mut self, other: &ChatStore) -> Result<(), ChatError> {
        match other.delta(&ChatSummary::default()) {
            Some(delta) => self.merge_delta(delta),
            None => Ok(()),
        }
    }

    /// Apply an update payload. All-or-nothing across the whole batch.
    pub fn apply_update(&mut self, update: ChatUpdate) -> Result<Vec<Receipt>, ChatError> {
        match update {
            ChatUpdate::Commands(commands) => {
                let mut next = self.clone();
                let mut receipts = Vec::with_capacity(commands.len());
                for signed in &commands {
                    // No clock inside the contract: the signed issue time is
                    // the ledger timestamp.
                    receipts.push(next.apply_signed(signed, signed.issued_at)?);
                }
                *self = next;
                Ok(receipts)
            }
            ChatUpdate::Sync(delta) => self.merge_delta(delta).map(|()| Vec::new()),
        }
    }

    /// Check every stored registration and message.
    pub fn validate(&self) -> Result<(), ChatError> {
        for (caller, registration) in self.registry().iter() {
            if registration.name.is_empty() {
                return Err(ChatError::EmptyUsername);
            }
            if !registration.verify(caller) {
                return Err(ChatError::InvalidSignature);
            }
        }
        for message in self.messages() {
            self.check_participants(message)?;
        }
        Ok(())
    }

    fn check_participants(&self, message: &Message) -> Result<(), ChatError> {
        for name in [&message.sender_username, &message.receiver_username] {
            if !self.registry().is_taken(name) {
                return Err(ChatError::UnknownParticipant { name: name.clone() });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ChatCommand;
    use chrono::{DateTime, Utc};
    use ed25519_dalek::SigningKey;

    fn key(seed: u8) -> SigningKey {
        SigningKey::from_bytes(&[seed; 32])
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    /// A registration is always the caller's first command.
    fn register(seed: u8, name: &str, secs: i64) -> SignedCommand {
        SignedCommand::sign(
            &key(seed),
            0,
            at(secs),
            ChatCommand::RegisterUser { name: name.into() },
        )
    }

    fn send(seed: u8, sequence: u64, to: &str, content: &str, secs: i64) -> SignedCommand {
        SignedCommand::sign(
            &key(seed),
            sequence,
            at(secs),
            ChatCommand::SendMessage {
                receiver: to.into(),
                content: content.into(),
            },
        )
    }

    fn seeded() -> ChatStore {
        let mut store = ChatStore::new();
        store
            .apply_update(ChatUpdate::Commands(vec![
                register(1, "user1", 0),
                register(2, "user2", 1),
                send(1, 1, "user2", "Hello, user2!", 2),
                send(1, 2, "user2", "How are you?", 3),
                send(2, 1, "user1", "I'm fine, thanks!", 4),
            ]))
            .unwrap();
        store
    }

    #[test]
    fn commands_use_issue_time() {
        let store = seeded();
        assert_eq!(store.message_count(), 3);
        assert_eq!(store.message(2).unwrap().timestamp, at(4));
        assert!(store.validate().is_ok());
    }

    #[test]
    fn failing_batch_is_rejected_whole() {
        let mut store = seeded();
        let before = store.clone();
        let err = store
            .apply_update(ChatUpdate::Commands(vec![
                send(1, 3, "user2", "fine", 5),
                send(1, 4, "nonexistent", "Hello!", 6),
            ]))
            .unwrap_err();
        assert_eq!(err, ChatError::ReceiverNotFound);
        assert_eq!(store, before);
    }

    #[test]
    fn empty_peer_gets_everything() {
        let store = seeded();
        let delta = store.delta(&ChatSummary::default()).unwrap();
        assert_eq!(delta.registrations.len(), 2);
        assert_eq!(delta.from_index, 0);
        assert_eq!(delta.messages.len(), 3);

        let mut replica = ChatStore::new();
        replica.merge_delta(delta).unwrap();
        assert_eq!(replica, store);
    }

    #[test]
    fn up_to_date_peer_gets_nothing() {
        let store = seeded();
        assert!(store.delta(&store.summarize()).is_none());
    }

    #[test]
    fn delta_carries_only_suffix() {
        let mut store = seeded();
        let summary = store.summarize();
        store
            .apply_update(ChatUpdate::Commands(vec![
                register(3, "user3", 5),
                send(3, 1, "user1", "hey", 6),
            ]))
            .unwrap();
        let delta = store.delta(&summary).unwrap();
        assert_eq!(delta.from_index, 3);
        assert_eq!(delta.messages.len(), 1);
        assert_eq!(delta.registrations.len(), 1);
        assert_eq!(delta.sequences.len(), 1);
    }

    #[test]
    fn replayed_batch_is_rejected() {
        let mut store = seeded();
        let batch = vec![send(2, 2, "user1", "once", 5)];
        store
            .apply_update(ChatUpdate::Commands(batch.clone()))
            .unwrap();
        let before = store.clone();

        let err = store.apply_update(ChatUpdate::Commands(batch)).unwrap_err();
        assert_eq!(
            err,
            ChatError::ReplayedCommand {
                expected: 3,
                got: 2
            }
        );
        assert_eq!(store, before);
        assert_eq!(store.messages_between("user1", "user2").len(), 4);
    }

    #[test]
    fn replay_on_synced_peer_is_rejected() {
        let store = seeded();
        let mut replica = ChatStore::new();
        replica.merge_state(&store).unwrap();
        assert_eq!(replica.next_sequence(&CallerId(key(1).verifying_key())), 3);

        let err = replica
            .apply_update(ChatUpdate::Commands(vec![send(
                1,
                1,
                "user2",
                "Hello, user2!",
                2,
            )]))
            .unwrap_err();
        assert!(matches!(err, ChatError::ReplayedCommand { expected: 3, got: 1 }));
        assert_eq!(replica.message_count(), 3);
    }

    #[test]
    fn merge_keeps_highest_sequence() {
        let store = seeded();
        let mut replica = store.clone();
        replica
            .apply_update(ChatUpdate::Commands(vec![send(1, 3, "user2", "ahead", 5)]))
            .unwrap();
        let mut delta = store.delta(&ChatSummary::default()).unwrap();
        delta.messages.clear();
        replica.merge_delta(delta).unwrap();
        assert_eq!(replica.next_sequence(&CallerId(key(1).verifying_key())), 4);
    }

    #[test]
    fn overlapping_delta_is_idempotent() {
        let store = seeded();
        let mut replica = store.clone();
        replica
            .merge_delta(store.delta(&ChatSummary::default()).unwrap())
            .unwrap();
        assert_eq!(replica, store);
    }

    #[test]
    fn gap_is_rejected() {
        let store = seeded();
        let mut delta = store.delta(&ChatSummary::default()).unwrap();
        delta.from_index = 10;
        let mut replica = ChatStore::new();
        assert_eq!(
            replica.merge_delta(delta),
            Err(ChatError::LogGap {
                expected: 0,
                got: 10
            })
        );
        assert_eq!(replica, ChatStore::new());
    }

    #[test]
    fn diverging_history_is_rejected() {
        let store = seeded();
        let mut delta = store.delta(&ChatSummary::default()).unwrap();
        delta.messages[1].content = "rewritten".into();
        let mut replica = store.clone();
        assert_eq!(
            replica.merge_delta(delta),
            Err(ChatError::LogConflict { index: 1 })
        );
    }

    #[test]
    fn message_with_unknown_participant_is_rejected() {
        let store = seeded();
        let mut delta = store.delta(&ChatSummary::default()).unwrap();
        delta.messages.push(Message {
            sender_username: "user1".into(),
            receiver_username: "ghost".into(),
            content: "boo".into(),
            timestamp: at(9),
        });
        let mut replica = ChatStore::new();
        assert_eq!(
            replica.merge_delta(delta),
            Err(ChatError::UnknownParticipant {
                name: "ghost".into()
            })
        );
    }

    #[test]
    fn conflicting_registration_is_rejected() {
        let store = seeded();
        let mut replica = ChatStore::new();
        replica
            .apply_update(ChatUpdate::Commands(vec![register(9, "user1", 0)]))
            .unwrap();
        let err = replica
            .merge_delta(store.delta(&ChatSummary::default()).unwrap())
            .unwrap_err();
        assert_eq!(err, ChatError::DuplicateUsername);
    }

    #[test]
    fn merge_full_state() {
        let store = seeded();
        let mut replica = ChatStore::new();
        replica.merge_state(&store).unwrap();
        assert_eq!(replica.messages_between("user1", "user2").len(), 3);
    }

    #[cfg(not(feature = "dev"))]
    #[test]
    fn unsigned_registration_does_not_replicate() {
        let mut store = ChatStore::new();
        store
            .register_user(
                &crate::command::CallContext::new(CallerId(key(1).verifying_key()), at(0)),
                "user1",
            )
            .unwrap();
        assert_eq!(store.validate(), Err(ChatError::InvalidSignature));

        let mut replica = ChatStore::new();
        assert_eq!(
            replica.merge_state(&store),
            Err(ChatError::InvalidSignature)
        );
    }

    #[cfg(not(feature = "dev"))]
    #[test]
    fn forged_registration_is_rejected() {
        let store = seeded();
        let mut delta = store.delta(&ChatSummary::default()).unwrap();
        let caller = CallerId(key(1).verifying_key());
        if let Some(registration) = delta.registrations.get_mut(&caller) {
            registration.name = "impostor".into();
        }
        let mut replica = ChatStore::new();
        assert_eq!(replica.merge_delta(delta), Err(ChatError::InvalidSignature));
    }

    #[test]
    fn update_payload_json_shape() {
        let update = ChatUpdate::Commands(vec![register(1, "user1", 0)]);
        let bytes = serde_json::to_vec(&update).unwrap();
        let back: ChatUpdate = serde_json::from_slice(&bytes).unwrap();
        assert!(matches!(back, ChatUpdate::Commands(ref c) if c.len() == 1));
    }
}
