//! Core business logic module
//!
//! This module contains the ledger components:
//! - `traits` - Storage seams (`AccountStore`, `TransactionLog`)
//! - `account_store` - In-memory account store with multi-key compare-and-swap
//! - `journal` - Append-only CSV journal shared by the store and the log
//! - `transaction_log` - Append-only transaction log with optional CSV journal
//! - `cashback` - Cashback policy
//! - `idempotency` - Bounded idempotency cache
//! - `locks` - Ordered per-account locks with deadlines
//! - `state` - Transfer lifecycle
//! - `engine` - Transfer orchestration
//! - `batch_processor` - Concurrent execution of transfer batches

pub mod account_store;
pub mod batch_processor;
pub mod cashback;
pub mod engine;
pub mod idempotency;
pub mod journal;
pub mod locks;
pub mod state;
pub mod traits;
pub mod transaction_log;

pub use account_store::InMemoryAccountStore;
pub use batch_processor::{BatchProcessor, ProcessingResult};
pub use cashback::CashbackPolicy;
pub use engine::{LedgerEngine, TransferOutcome};
pub use idempotency::IdempotencyCache;
pub use journal::{Journal, JournalSink};
pub use locks::LockTable;
pub use state::{TransferProgress, TransferState};
pub use traits::{AccountStore, BalanceUpdate, TransactionLog};
pub use transaction_log::{AppendOnlyLog, History};
