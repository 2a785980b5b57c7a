//! P2P Ledger Library
//! # Overview
//!
//! This library moves balances between accounts identified by phone number.
//! Every transfer is atomic and idempotent, and none is lost under
//! concurrency. Completed transfers land in an append-only transaction log
//! together with their informational cashback.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (AccountId, Account, Transaction, LedgerError, etc.)
//! - [`config`] - Engine bounds and cashback rules
//! - [`core`] - Business logic components:
//!   - [`core::engine`] - Transfer orchestration
//!   - [`core::account_store`] - Account balances with compare-and-swap
//!   - [`core::transaction_log`] - Append-only transaction history
//!   - [`core::cashback`] - Cashback policy
//!   - [`core::idempotency`] - Client request id deduplication
//!   - [`core::locks`] - Ordered per-account locks
//! - [`io`] - CSV formats, batched replay reader and the on-disk ledger
//! - [`api`] - Request validation and the `LedgerService` facade
//! - [`cli`] - CLI arguments parsing and commands
//!
//! # Transfer Rules
//!
//! - The amount must be positive and the two accounts distinct
//! - Both accounts must exist and the sender must cover the amount
//! - A repeated client request id returns the original result
//!
//! # Cashback
//!
//! - **Multiple of 500**: no cashback
//! - **Below 1000**: 5% of the amount
//! - **Otherwise**: 2% of the amount
//!
//! Cashback is recorded on the transaction and never credited to a balance.

// Module declarations
pub mod api;
pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod types;

pub use crate::api::{ApiRequest, ApiResponse, LedgerService};
pub use crate::config::LedgerConfig;
pub use crate::core::{CashbackPolicy, LedgerEngine, TransferOutcome};
pub use crate::io::{write_accounts_csv, LedgerStore};
pub use crate::types::{
    Account, AccountId, ClientRequestId, LedgerError, MinorUnits, ReasonCode, Transaction,
    TransactionStatus, TransferRequest,
};
