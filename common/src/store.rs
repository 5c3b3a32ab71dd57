use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::command::{CallContext, ChatCommand, SignedCommand};
use crate::conversation::{ConversationIndex, ConversationKey};
use crate::error::ChatError;
use crate::identity::CallerId;
use crate::message::{Message, MessageSent, Receipt, UserRegistered};
use crate::registry::{Registration, UsernameRegistry};

/// The ledger chat state: a write-once username registry and one global,
/// append-only message log.
///
/// Every mutation validates fully before touching state, so a rejected call
/// leaves the store exactly as it was. The conversation index is derived from
/// the log and rebuilt on deserialization.
///
/// `sequences` holds, per caller, the sequence number the next signed command
/// must carry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PersistedChatStore", into = "PersistedChatStore")]
pub struct ChatStore {
    registry: UsernameRegistry,
    log: Vec<Message>,
    index: ConversationIndex,
    sequences: BTreeMap<CallerId, u64>,
}

#[derive(Serialize, Deserialize)]
struct PersistedChatStore {
    #[serde(default)]
    registry: UsernameRegistry,
    #[serde(default)]
    log: Vec<Message>,
    #[serde(default)]
    sequences: BTreeMap<CallerId, u64>,
}

impl From<PersistedChatStore> for ChatStore {
    fn from(persisted: PersistedChatStore) -> Self {
        let index = ConversationIndex::rebuild(&persisted.log);
        ChatStore {
            registry: persisted.registry,
            log: persisted.log,
            index,
            sequences: persisted.sequences,
        }
    }
}

impl From<ChatStore> for PersistedChatStore {
    fn from(store: ChatStore) -> Self {
        PersistedChatStore {
            registry: store.registry,
            log: store.log,
            sequences: store.sequences,
        }
    }
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dispatch a command under `ctx`.
    pub fn apply(&mut self, ctx: &CallContext, command: ChatCommand) -> Result<Receipt, ChatError> {
        match command {
            ChatCommand::RegisterUser { name } => {
                self.register_user(ctx, name).map(Receipt::Registered)
            }
            ChatCommand::SendMessage { receiver, content } => self
                .send_message(ctx, &receiver, content)
                .map(Receipt::MessageSent),
        }
    }

    /// Authenticate and apply a signed command stamped with ledger time `now`.
    ///
    /// The command's sequence must be the caller's next one; it is consumed
    /// only when the command succeeds, so a signed command applies at most once.
    pub fn apply_signed(
        &mut self,
        signed: &SignedCommand,
        now: DateTime<Utc>,
    ) -> Result<Receipt, ChatError> {
        let ctx = signed.authenticate(now)?;
        let expected = self.next_sequence(&signed.caller);
        if signed.sequence != expected {
            return Err(ChatError::ReplayedCommand {
                expected,
                got: signed.sequence,
            });
        }
        let receipt = self.apply(&ctx, signed.command.clone())?;
        self.sequences.insert(signed.caller, expected + 1);
        Ok(receipt)
    }

    /// Sequence number the caller's next signed command must carry.
    pub fn next_sequence(&self, caller: &CallerId) -> u64 {
        self.sequences.get(caller).copied().unwrap_or(0)
    }

    pub fn sequences(&self) -> &BTreeMap<CallerId, u64> {
        &self.sequences
    }

    /// Raise the caller's next sequence to at least `next`.
    pub(crate) fn advance_sequence(&mut self, caller: CallerId, next: u64) {
        let slot = self.sequences.entry(caller).or_insert(0);
        *slot = (*slot).max(next);
    }

    /// Bind `name` to the caller, permanently.
    pub fn register_user(
        &mut self,
        ctx: &CallContext,
        name: impl Into<String>,
    ) -> Result<UserRegistered, ChatError> {
        let name = name.into();
        self.registry.insert(
            ctx.caller,
            Registration {
                name: name.clone(),
                proof: ctx.proof.clone(),
            },
        )?;
        Ok(UserRegistered {
            caller: ctx.caller,
            username: name,
        })
    }

    /// Append a message from the caller to `receiver`.
    pub fn send_message(
        &mut self,
        ctx: &CallContext,
        receiver: &str,
        content: impl Into<String>,
    ) -> Result<MessageSent, ChatError> {
        let sender = self
            .registry
            .name_of(&ctx.caller)
            .ok_or(ChatError::SenderNotRegistered)?
            .to_string();
        if !self.registry.is_taken(receiver) {
            return Err(ChatError::ReceiverNotFound);
        }

        let message = Message {
            sender_username: sender,
            receiver_username: receiver.to_string(),
            content: content.into(),
            timestamp: ctx.timestamp,
        };
        let index = self.append(message);
        let message = &self.log[index];
        Ok(MessageSent {
            sender_username: message.sender_username.clone(),
            receiver_username: message.receiver_username.clone(),
            content: message.content.clone(),
            timestamp: message.timestamp,
            index,
        })
    }

    /// Sole write path into the log; keeps the index in step.
    pub(crate) fn append(&mut self, message: Message) -> usize {
        let position = self.log.len();
        self.index.record(ConversationKey::of(&message), position);
        self.log.push(message);
        position
    }

    pub(crate) fn registry_mut(&mut self) -> &mut UsernameRegistry {
        &mut self.registry
    }

    pub fn message(&self, index: usize) -> Result<&Message, ChatError> {
        self.log.get(index).ok_or(ChatError::IndexOutOfRange {
            index,
            len: self.log.len(),
        })
    }

    pub fn message_count(&self) -> usize {
        self.log.len()
    }

    /// Every message exchanged between `a` and `b`, in either direction, in
    /// append order.
    pub fn messages_between(&self, a: &str, b: &str) -> Vec<&Message> {
        self.index
            .positions(a, b)
            .iter()
            .map(|&position| &self.log[position])
            .collect()
    }

    /// The caller's display name, or `""` when unregistered.
    pub fn username_of(&self, caller: &CallerId) -> &str {
        self.registry.name_of(caller).unwrap_or("")
    }

    pub fn registered_name(&self, caller: &CallerId) -> Option<&str> {
        self.registry.name_of(caller)
    }

    pub fn registry(&self) -> &UsernameRegistry {
        &self.registry
    }

    pub fn messages(&self) -> &[Message] {
        &self.log
    }
}
