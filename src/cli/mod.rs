//! Command-line interface
//!
//! Parses arguments with clap and runs one command against a `LedgerStore`
//! that is opened on entry and closed on exit.

mod args;
pub mod replay;

pub use args::{CliArgs, Command, ReplayArgs};
pub use replay::{BatchConfig, ReplaySummary};

use crate::api::{AccountQuery, ApiResponse, LedgerService, LoginRequest, TransferBody};
use crate::io::{write_accounts_csv, LedgerStore};
use crate::types::LedgerError;
use clap::Parser;
use serde::Serialize;
use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::debug;

/// Parse command-line arguments using clap
///
/// On invalid arguments or `--help`, clap prints to the terminal and exits
/// the process.
pub fn parse_args() -> CliArgs {
    CliArgs::parse()
}

/// Run the parsed command
///
/// Returns a failure exit code when a single-shot request is answered with
/// `ok: false`; errors are reserved for the ledger itself failing.
pub async fn run(args: CliArgs) -> Result<ExitCode, LedgerError> {
    let store = match &args.data_dir {
        Some(dir) => LedgerStore::open(dir)?,
        None => LedgerStore::in_memory(),
    };
    let engine = Arc::new(store.engine(args.ledger_config())?);
    let service = LedgerService::new(engine);

    let result = execute(args.command, &service).await;
    drop(service);

    let closed = store.close();
    let code = result?;
    closed?;
    Ok(code)
}

async fn execute(command: Command, service: &LedgerService) -> Result<ExitCode, LedgerError> {
    debug!(?command, "running command");
    match command {
        Command::Login {
            account,
            initial_balance,
        } => {
            let request = LoginRequest {
                account_id: account,
                initial_balance,
            };
            print_response(&service.register_or_login(request).await)
        }
        Command::Transfer {
            from,
            to,
            amount,
            request_id,
        } => {
            let body = TransferBody {
                from,
                to,
                amount,
                client_request_id: request_id,
            };
            print_response(&service.transfer(body).await)
        }
        Command::Account { account } => {
            let query = AccountQuery { account_id: account };
            print_response(&service.get_account(query).await)
        }
        Command::History { account } => {
            let query = AccountQuery { account_id: account };
            print_response(&service.get_transactions(query).await)
        }
        Command::Replay(replay_args) => run_replay(&replay_args, service).await,
        Command::Serve => serve(service).await,
    }
}

async fn run_replay(args: &ReplayArgs, service: &LedgerService) -> Result<ExitCode, LedgerError> {
    let engine = Arc::clone(service.engine());
    if let Some(accounts_file) = &args.accounts_file {
        replay::seed_accounts(&engine, accounts_file).await?;
    }

    replay::replay(Arc::clone(&engine), &args.input_file, &args.to_batch_config()).await?;

    let accounts = engine.all_accounts().await?;
    let mut output = std::io::stdout().lock();
    write_accounts_csv(&accounts, &mut output)?;
    Ok(ExitCode::SUCCESS)
}

/// Answer one JSON request per stdin line until end of input
async fn serve(service: &LedgerService) -> Result<ExitCode, LedgerError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let mut response = service.handle_json(&line).await;
        response.push('\n');
        stdout.write_all(response.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(ExitCode::SUCCESS)
}

fn print_response<T: Serialize>(response: &ApiResponse<T>) -> Result<ExitCode, LedgerError> {
    let json = serde_json::to_string_pretty(response)
        .map_err(|e| LedgerError::invalid_request(format!("failed to encode response: {e}")))?;
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{json}")?;

    Ok(if response.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
