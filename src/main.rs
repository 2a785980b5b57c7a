//! P2P Ledger CLI
//!
//! Command-line interface for registering phone-number accounts and moving
//! balances between them.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- --data-dir ./ledger login 5550001 --initial-balance 1000
//! cargo run -- --data-dir ./ledger login 5550002
//! cargo run -- --data-dir ./ledger transfer 5550001 5550002 300 --request-id r1
//! cargo run -- --data-dir ./ledger history 5550002
//! cargo run -- replay --accounts seed.csv transfers.csv > accounts.csv
//! cargo run -- --data-dir ./ledger serve < requests.ndjson
//! ```
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default: `warn`).
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: The request was rejected, or the ledger could not be opened, read or written

use p2p_ledger::cli;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let args = cli::parse_args();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(num_cpus::get())
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(cli::run(args)) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error [{}]: {e}", e.code());
            ExitCode::FAILURE
        }
    }
}
