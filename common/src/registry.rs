use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::command::{verify_command_signature, ChatCommand, CommandProof};
use crate::error::ChatError;
use crate::identity::CallerId;

/// A caller's permanent display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub name: String,
    /// The signed registration command, kept so peers can re-verify the
    /// binding. Absent when the binding was made without a signed command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<CommandProof>,
}

impl Registration {
    /// True when the stored proof was signed by `caller` for this exact name.
    pub fn verify(&self, caller: &CallerId) -> bool {
        match &self.proof {
            Some(proof) => verify_command_signature(
                caller,
                proof,
                &ChatCommand::RegisterUser {
                    name: self.name.clone(),
                },
            ),
            None => cfg!(feature = "dev"),
        }
    }
}

/// Write-once mapping between callers and display names.
///
/// `owners` is the reverse of `names` and is never serialized; it is rebuilt
/// on load, which also rejects persisted states where a name is held twice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "PersistedRegistry", into = "PersistedRegistry")]
pub struct UsernameRegistry {
    names: BTreeMap<CallerId, Registration>,
    owners: BTreeMap<String, CallerId>,
}

#[derive(Serialize, Deserialize)]
struct PersistedRegistry {
    names: BTreeMap<CallerId, Registration>,
}

impl TryFrom<PersistedRegistry> for UsernameRegistry {
    type Error = ChatError;

    fn try_from(persisted: PersistedRegistry) -> Result<Self, Self::Error> {
        let mut owners = BTreeMap::new();
        for (caller, registration) in &persisted.names {
            if registration.name.is_empty() {
                return Err(ChatError::EmptyUsername);
            }
            if owners.insert(registration.name.clone(), *caller).is_some() {
                return Err(ChatError::DuplicateUsername);
            }
        }
        Ok(UsernameRegistry {
            names: persisted.names,
            owners,
        })
    }
}

impl From<UsernameRegistry> for PersistedRegistry {
    fn from(registry: UsernameRegistry) -> Self {
        PersistedRegistry {
            names: registry.names,
        }
    }
}

impl UsernameRegistry {
    /// Check whether `caller` may take `name`, without changing anything.
    pub fn check(&self, caller: &CallerId, name: &str) -> Result<(), ChatError> {
        if name.is_empty() {
            return Err(ChatError::EmptyUsername);
        }
        if self.owners.contains_key(name) {
            return Err(ChatError::DuplicateUsername);
        }
        if self.names.contains_key(caller) {
            return Err(ChatError::AlreadyRegistered);
        }
        Ok(())
    }

    pub fn insert(&mut self, caller: CallerId, registration: Registration) -> Result<(), ChatError> {
        self.check(&caller, &registration.name)?;
        self.owners.insert(registration.name.clone(), caller);
        self.names.insert(caller, registration);
        Ok(())
    }

    pub fn name_of(&self, caller: &CallerId) -> Option<&str> {
        self.names.get(caller).map(|r| r.name.as_str())
    }

    pub fn owner_of(&self, name: &str) -> Option<&CallerId> {
        self.owners.get(name)
    }

    pub fn is_taken(&self, name: &str) -> bool {
        self.owners.contains_key(name)
    }

    pub fn get(&self, caller: &CallerId) -> Option<&Registration> {
        self.names.get(caller)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CallerId, &Registration)> {
        self.names.iter()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
