//! chainchat ledger CLI.
//!
//! Each invocation opens the ledger snapshot, runs one operation through the
//! single-writer host, and exits. Accounts are local signing keys, created on
//! first use.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chainchat_common::{CallerId, Receipt};
use chainchat_ledger::config::{default_data_dir, DEFAULT_MAX_CLOCK_SKEW_SECS, MAX_CLOCK_SKEW_SECS};
use chainchat_ledger::{accounts, LedgerConfig, LedgerHandle, LedgerHost};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chainchat-ledger", about = "Local ledger host for chainchat")]
struct Cli {
    /// Ledger snapshot file (default: <data dir>/chainchat/ledger.json).
    #[arg(long)]
    state: Option<PathBuf>,

    /// Directory holding account signing keys (default: <data dir>/chainchat/accounts).
    #[arg(long)]
    accounts_dir: Option<PathBuf>,

    /// Maximum distance between a command's issue time and ledger time.
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_CLOCK_SKEW_SECS,
        value_parser = clap::value_parser!(u64).range(..=MAX_CLOCK_SKEW_SECS)
    )]
    max_clock_skew_secs: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Bind a display name to an account (once, permanently).
    Register {
        #[arg(long)]
        account: String,
        name: String,
    },
    /// Send a message from an account to a registered display name.
    Send {
        #[arg(long)]
        account: String,
        to: String,
        content: String,
    },
    /// Print the message at a log position.
    Message { index: usize },
    /// Print the number of messages in the log.
    Count,
    /// Print the conversation between two display names, oldest first.
    Between { a: String, b: String },
    /// Print an account's caller id and display name.
    Whoami {
        #[arg(long)]
        account: String,
    },
}

impl Cli {
    fn config(&self) -> Result<LedgerConfig> {
        let data_dir = default_data_dir();
        let mut config = LedgerConfig::in_dir(&data_dir)
            .with_max_clock_skew_secs(self.max_clock_skew_secs)?;
        if let Some(state) = &self.state {
            config.state_path = state.clone();
        }
        if let Some(dir) = &self.accounts_dir {
            config.accounts_dir = dir.clone();
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config()?;
    let accounts_dir = config.accounts_dir.clone();

    let host = LedgerHost::open(config)
        .await
        .context("failed to open ledger")?;
    let result = run(cli.command, &host.handle(), &accounts_dir).await;
    host.shutdown().await;
    result
}

async fn run(command: Command, ledger: &LedgerHandle, accounts_dir: &std::path::Path) -> Result<()> {
    match command {
        Command::Register { account, name } => {
            let key = accounts::load_or_create(accounts_dir, &account)?;
            let receipt = ledger.register_user(&key, &name).await?;
            print_receipt(&receipt)?;
        }
        Command::Send {
            account,
            to,
            content,
        } => {
            let key = accounts::load_or_create(accounts_dir, &account)?;
            let receipt = ledger.send_message(&key, &to, &content).await?;
            print_receipt(&receipt)?;
        }
        Command::Message { index } => {
            let message = ledger.message(index)?;
            println!("{}", serde_json::to_string_pretty(&message)?);
        }
        Command::Count => {
            println!("{}", ledger.message_count());
        }
        Command::Between { a, b } => {
            let messages = ledger.messages_between(&a, &b);
            println!("{}", serde_json::to_string_pretty(&messages)?);
        }
        Command::Whoami { account } => {
            let key = accounts::load(accounts_dir, &account)?
                .with_context(|| format!("no account named {account:?}"))?;
            let caller = CallerId(key.verifying_key());
            println!("{caller} {}", ledger.username_of(&caller));
        }
    }
    Ok(())
}

fn print_receipt(receipt: &Receipt) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(receipt)?);
    Ok(())
}
