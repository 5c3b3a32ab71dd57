use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chainchat_common::{
    CallerId, ChatCommand, ChatStore, Message, Receipt, SignedCommand,
};
use chrono::{DateTime, Utc};
use ed25519_dalek::SigningKey;
use fd_lock::RwLock;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::{LedgerConfig, COMMAND_QUEUE_DEPTH, EVENT_BUFFER};
use crate::error::LedgerError;
use crate::snapshot;

struct Submission {
    command: SignedCommand,
    reply: oneshot::Sender<Result<Receipt, LedgerError>>,
}

/// A running ledger: one writer task plus the channels around it.
pub struct LedgerHost {
    handle: LedgerHandle,
    shutdown: oneshot::Sender<()>,
    writer: JoinHandle<()>,
}

/// Cheap, cloneable access to a running ledger.
///
/// Mutations queue behind the single writer; queries read the latest
/// committed snapshot and never wait on it.
#[derive(Clone)]
pub struct LedgerHandle {
    commands: mpsc::Sender<Submission>,
    snapshots: watch::Receiver<Arc<ChatStore>>,
    events: broadcast::Sender<Receipt>,
}

impl LedgerHost {
    /// Take the snapshot's lock, load it, and start the writer.
    ///
    /// The writer holds the lock until it stops, so a second host on the same
    /// snapshot fails with [`LedgerError::Locked`] instead of racing this one.
    pub async fn open(config: LedgerConfig) -> Result<Self, LedgerError> {
        let lock_path = lock_path(&config.state_path);
        let lock = open_lock_file(&lock_path)?;

        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (snapshots_tx, snapshots_rx) = watch::channel(Arc::new(ChatStore::new()));
        let (events_tx, _) = broadcast::channel(EVENT_BUFFER);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let writer = tokio::spawn(run_writer(
            RwLock::new(lock),
            lock_path,
            config,
            snapshots_tx,
            events_tx.clone(),
            commands_rx,
            shutdown_rx,
            ready_tx,
        ));
        ready_rx.await.map_err(|_| LedgerError::Closed)??;

        Ok(LedgerHost {
            handle: LedgerHandle {
                commands: commands_tx,
                snapshots: snapshots_rx,
                events: events_tx,
            },
            shutdown: shutdown_tx,
            writer,
        })
    }

    pub fn handle(&self) -> LedgerHandle {
        self.handle.clone()
    }

    /// Stop the writer after the command it is working on, if any.
    /// Commands still queued are answered with [`LedgerError::Closed`].
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.writer.await {
            warn!(error = %e, "ledger writer ended abnormally");
        }
    }
}

impl LedgerHandle {
    /// Queue a signed command and wait for its outcome.
    pub async fn submit(&self, command: SignedCommand) -> Result<Receipt, LedgerError> {
        let (reply, outcome) = oneshot::channel();
        self.commands
            .send(Submission { command, reply })
            .await
            .map_err(|_| LedgerError::Closed)?;
        outcome.await.map_err(|_| LedgerError::Closed)?
    }

    /// Sign `command` as `key` with the caller's next sequence, issued now,
    /// and submit it. Commands signed concurrently for one key race for the
    /// same sequence; all but one fail with `ReplayedCommand`.
    pub async fn submit_as(
        &self,
        key: &SigningKey,
        command: ChatCommand,
    ) -> Result<Receipt, LedgerError> {
        let sequence = self
            .snapshot()
            .next_sequence(&CallerId(key.verifying_key()));
        self.submit(SignedCommand::sign(key, sequence, Utc::now(), command))
            .await
    }

    pub async fn register_user(
        &self,
        key: &SigningKey,
        name: &str,
    ) -> Result<Receipt, LedgerError> {
        self.submit_as(
            key,
            ChatCommand::RegisterUser {
                name: name.to_string(),
            },
        )
        .await
    }

    pub async fn send_message(
        &self,
        key: &SigningKey,
        receiver: &str,
        content: &str,
    ) -> Result<Receipt, LedgerError> {
        self.submit_as(
            key,
            ChatCommand::SendMessage {
                receiver: receiver.to_string(),
                content: content.to_string(),
            },
        )
        .await
    }

    /// Latest committed state.
    pub fn snapshot(&self) -> Arc<ChatStore> {
        self.snapshots.borrow().clone()
    }

    pub fn message(&self, index: usize) -> Result<Message, LedgerError> {
        Ok(self.snapshot().message(index)?.clone())
    }

    pub fn message_count(&self) -> usize {
        self.snapshot().message_count()
    }

    pub fn messages_between(&self, a: &str, b: &str) -> Vec<Message> {
        self.snapshot()
            .messages_between(a, b)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Display name of `caller`, empty when unregistered.
    pub fn username_of(&self, caller: &CallerId) -> String {
        self.snapshot().username_of(caller).to_string()
    }

    /// Receive every event committed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Receipt> {
        self.events.subscribe()
    }
}

/// `ledger.json` is guarded by `ledger.json.lock` beside it.
fn lock_path(state_path: &Path) -> PathBuf {
    let mut name = state_path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    state_path.with_file_name(name)
}

fn open_lock_file(path: &Path) -> Result<File, LedgerError> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(|e| LedgerError::io(dir, e))?;
    }
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(|e| LedgerError::io(path, e))
}

/// Writer task body. Owns the snapshot lock for as long as it runs and
/// reports through `ready` whether the ledger could be opened.
#[allow(clippy::too_many_arguments)]
async fn run_writer(
    mut lock: RwLock<File>,
    lock_path: PathBuf,
    config: LedgerConfig,
    snapshots: watch::Sender<Arc<ChatStore>>,
    events: broadcast::Sender<Receipt>,
    commands: mpsc::Receiver<Submission>,
    shutdown: oneshot::Receiver<()>,
    ready: oneshot::Sender<Result<(), LedgerError>>,
) {
    let _guard = match lock.try_write() {
        Ok(guard) => guard,
        Err(e) => {
            let err = if e.kind() == ErrorKind::WouldBlock {
                LedgerError::Locked { path: lock_path }
            } else {
                LedgerError::io(lock_path, e)
            };
            let _ = ready.send(Err(err));
            return;
        }
    };

    let store = match snapshot::load(&config.state_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    info!(
        path = %config.state_path.display(),
        users = store.registry().len(),
        messages = store.message_count(),
        "ledger opened"
    );
    snapshots.send_replace(store.clone());

    let writer = Writer {
        store,
        config,
        snapshots,
        events,
    };
    if ready.send(Ok(())).is_err() {
        return;
    }
    writer.run(commands, shutdown).await;
}

struct Writer {
    /// Same allocation the latest snapshot publishes.
    store: Arc<ChatStore>,
    config: LedgerConfig,
    snapshots: watch::Sender<Arc<ChatStore>>,
    events: broadcast::Sender<Receipt>,
}

impl Writer {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Submission>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                submission = commands.recv() => {
                    let Some(Submission { command, reply }) = submission else {
                        break;
                    };
                    let outcome = self.commit(command, Utc::now());
                    let _ = reply.send(outcome);
                }
            }
        }
        commands.close();
        while let Some(Submission { reply, .. }) = commands.recv().await {
            let _ = reply.send(Err(LedgerError::Closed));
        }
        info!("ledger writer stopped");
    }

    /// Apply one command as a single transition: authenticate and sequence
    /// it, apply to a working copy, persist, then publish. Nothing is visible
    /// unless every step succeeds.
    fn commit(&mut self, command: SignedCommand, now: DateTime<Utc>) -> Result<Receipt, LedgerError> {
        let skew = (now - command.issued_at).abs();
        if skew > self.config.max_clock_skew {
            warn!(caller = %command.caller, issued_at = %command.issued_at, "rejected: clock skew");
            return Err(LedgerError::ClockSkew {
                issued_at: command.issued_at,
                now,
                max_secs: self.config.max_clock_skew.num_seconds(),
            });
        }

        // Readers share the current store, so this is the one deep copy.
        let mut next = ChatStore::clone(&self.store);
        let receipt = next.apply_signed(&command, now).inspect_err(|e| {
            warn!(caller = %command.caller, sequence = command.sequence, error = %e, "rejected command");
        })?;
        snapshot::save(&self.config.state_path, &next)?;

        let next = Arc::new(next);
        self.store = Arc::clone(&next);
        self.snapshots.send_replace(next);
        log_receipt(&receipt);
        // No subscribers is fine.
        let _ = self.events.send(receipt.clone());
        Ok(receipt)
    }
}

fn log_receipt(receipt: &Receipt) {
    match receipt {
        Receipt::Registered(event) => {
            info!(caller = %event.caller, username = %event.username, "user registered");
        }
        Receipt::MessageSent(event) => {
            info!(
                index = event.index,
                from = %event.sender_username,
                to = %event.receiver_username,
                timestamp = %event.timestamp,
                "message sent"
            );
        }
    }
}
