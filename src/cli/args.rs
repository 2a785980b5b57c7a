use crate::cli::replay::BatchConfig;
use crate::config::LedgerConfig;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Peer-to-peer balance transfers between phone-number accounts
#[derive(Parser, Debug)]
#[command(name = "p2p-ledger")]
#[command(about = "Peer-to-peer balance transfers between phone-number accounts", long_about = None)]
pub struct CliArgs {
    /// Directory holding the ledger journals; in-memory when omitted
    #[arg(long = "data-dir", value_name = "DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Upper bound on waiting for account locks, in milliseconds
    #[arg(long = "lock-timeout-ms", value_name = "MS", global = true)]
    pub lock_timeout_ms: Option<u64>,

    /// Compare-and-swap attempts before a transfer fails with contention
    #[arg(long = "max-retries", value_name = "COUNT", global = true)]
    pub max_retries: Option<u32>,

    /// Number of client request ids remembered for deduplication
    #[arg(long = "idempotency-capacity", value_name = "COUNT", global = true)]
    pub idempotency_capacity: Option<usize>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Log in, creating the account on first use
    Login {
        #[arg(value_name = "ACCOUNT")]
        account: String,
        /// Opening balance in minor units for a new account
        #[arg(long = "initial-balance", value_name = "AMOUNT", allow_negative_numbers = true)]
        initial_balance: Option<i64>,
    },
    /// Move funds between two accounts
    Transfer {
        #[arg(value_name = "FROM")]
        from: String,
        #[arg(value_name = "TO")]
        to: String,
        /// Amount in minor units
        #[arg(value_name = "AMOUNT", allow_negative_numbers = true)]
        amount: i64,
        /// Idempotency key; a random one is used when omitted
        #[arg(long = "request-id", value_name = "ID")]
        request_id: Option<String>,
    },
    /// Show an account
    Account {
        #[arg(value_name = "ACCOUNT")]
        account: String,
    },
    /// List the transactions of an account, oldest first
    History {
        #[arg(value_name = "ACCOUNT")]
        account: String,
    },
    /// Replay transfers from a CSV file and print the final balances
    Replay(ReplayArgs),
    /// Answer newline-delimited JSON requests from stdin
    Serve,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ReplayArgs {
    /// CSV with columns request_id,from,to,amount
    #[arg(value_name = "INPUT", help = "Path to the input CSV file")]
    pub input_file: PathBuf,

    /// CSV with columns id,initial_balance, registered before the replay
    #[arg(long = "accounts", value_name = "FILE")]
    pub accounts_file: Option<PathBuf>,

    /// Number of transfers per batch
    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Number of transfers per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    /// Maximum number of transfers in flight within a batch
    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        help = "Maximum number of transfers processing concurrently (default: CPU cores)"
    )]
    pub max_concurrent: Option<usize>,
}

impl CliArgs {
    /// Build the engine configuration, with defaults for omitted flags
    pub fn ledger_config(&self) -> LedgerConfig {
        let default = LedgerConfig::default();
        if self.lock_timeout_ms.is_none()
            && self.max_retries.is_none()
            && self.idempotency_capacity.is_none()
        {
            return default;
        }

        LedgerConfig::new(
            self.lock_timeout_ms
                .map_or(default.lock_timeout, Duration::from_millis),
            self.max_retries.unwrap_or(default.max_cas_retries),
            self.idempotency_capacity
                .unwrap_or(default.idempotency_capacity),
        )
    }
}

impl ReplayArgs {
    /// Create a BatchConfig from CLI arguments, with defaults for omitted flags
    pub fn to_batch_config(&self) -> BatchConfig {
        if self.batch_size.is_some() || self.max_concurrent.is_some() {
            let default = BatchConfig::default();
            BatchConfig::new(
                self.batch_size.unwrap_or(default.batch_size),
                self.max_concurrent.unwrap_or(default.max_concurrent),
            )
        } else {
            BatchConfig::default()
        }
    }
}
