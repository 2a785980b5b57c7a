//! Replay of transfer requests from CSV
//!
//! Transfers are read in batches with [`AsyncReader`] and each batch runs
//! concurrently through the [`BatchProcessor`]. Batches are processed one
//! after another, so a later row never overtakes an earlier batch.
//!
//! # Architecture
//!
//! ```text
//! replay
//!     ├── BatchConfig (batch_size, max_concurrent)
//!     ├── AsyncReader (batch CSV reading)
//!     └── BatchProcessor (concurrent transfers)
//!         └── LedgerEngine
//! ```

use crate::core::{BatchProcessor, LedgerEngine};
use crate::io::async_reader::AsyncReader;
use crate::io::csv_format::read_registrations;
use crate::types::{LedgerError, ReasonCode};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Configuration for batch processing
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchConfig {
    /// Number of transfers per batch
    pub batch_size: usize,
    /// Maximum number of transfers in flight within a batch
    pub max_concurrent: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent: num_cpus::get(),
        }
    }
}

impl BatchConfig {
    /// Create a new BatchConfig, falling back to defaults for zero values
    pub fn new(batch_size: usize, max_concurrent: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            warn!(default = default.batch_size, "invalid batch_size (0), using default");
            default.batch_size
        } else {
            batch_size
        };

        let max_concurrent = if max_concurrent == 0 {
            warn!(default = default.max_concurrent, "invalid max_concurrent (0), using default");
            default.max_concurrent
        } else {
            max_concurrent
        };

        Self {
            batch_size,
            max_concurrent,
        }
    }
}

/// Tally of a finished replay
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub completed: usize,
    /// Rows answered from the idempotency cache
    pub replayed: usize,
    pub failed: BTreeMap<String, usize>,
}

impl ReplaySummary {
    fn record_failure(&mut self, code: ReasonCode) {
        *self.failed.entry(code.to_string()).or_default() += 1;
    }

    pub fn failed_total(&self) -> usize {
        self.failed.values().sum()
    }
}

/// Register every account listed in a `id,initial_balance` CSV
///
/// Accounts that already exist keep their balance.
pub async fn seed_accounts(engine: &LedgerEngine, path: &Path) -> Result<usize, LedgerError> {
    let file = std::fs::File::open(path).map_err(|e| {
        LedgerError::storage_unavailable(format!("failed to open '{}': {e}", path.display()))
    })?;

    let registrations = read_registrations(file)?;
    for registration in &registrations {
        engine
            .register_or_login(&registration.id, registration.initial_balance)
            .await?;
    }
    Ok(registrations.len())
}

/// Run every transfer in `input_path` through the engine
///
/// Individual transfer failures are tallied and logged; only failing to read
/// the input is an error.
pub async fn replay(
    engine: Arc<LedgerEngine>,
    input_path: &Path,
    config: &BatchConfig,
) -> Result<ReplaySummary, LedgerError> {
    let processor = BatchProcessor::new(engine, config.max_concurrent);

    let file = tokio::fs::File::open(input_path).await.map_err(|e| {
        LedgerError::storage_unavailable(format!(
            "failed to open '{}': {e}",
            input_path.display()
        ))
    })?;

    // Wrap tokio file in a compatibility layer for csv-async
    let compat_file = tokio_util::compat::TokioAsyncReadCompatExt::compat(file);
    let mut reader = AsyncReader::new(compat_file);

    let mut summary = ReplaySummary::default();
    loop {
        let batch = reader.read_batch(config.batch_size).await;
        if batch.is_empty() {
            break;
        }

        for processed in processor.process_batch(batch).await {
            match processed.result {
                Ok(outcome) if outcome.replayed => summary.replayed += 1,
                Ok(_) => summary.completed += 1,
                Err(e) => summary.record_failure(e.code()),
            }
        }
    }

    info!(
        rows = reader.rows_read(),
        completed = summary.completed,
        replayed = summary.replayed,
        failed = summary.failed_total(),
        "replay finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::core::{AppendOnlyLog, InMemoryAccountStore};
    use crate::types::AccountId;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    fn engine() -> Arc<LedgerEngine> {
        Arc::new(LedgerEngine::new(
            Arc::new(InMemoryAccountStore::new()),
            Arc::new(AppendOnlyLog::new()),
            LedgerConfig::default(),
        ))
    }

    fn id(s: &str) -> AccountId {
        AccountId::parse(s).unwrap()
    }

    #[test]
    fn test_batch_config_zero_values_fall_back() {
        let config = BatchConfig::new(0, 0);
        assert_eq!(config, BatchConfig::default());
    }

    #[tokio::test]
    async fn test_seed_accounts_registers_each_row() {
        let seed = create_temp_csv("id,initial_balance\n5550001,1000\n5550002,0\n");
        let engine = engine();

        let seeded = seed_accounts(&engine, seed.path()).await.unwrap();

        assert_eq!(seeded, 2);
        assert_eq!(engine.get_account(&id("5550001")).await.unwrap().balance, 1000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_replay_tallies_outcomes() {
        let engine = engine();
        engine.register_or_login(&id("5550001"), 1000).await.unwrap();
        engine.register_or_login(&id("5550002"), 0).await.unwrap();
        let input = create_temp_csv(
            "request_id,from,to,amount\n\
             r1,5550001,5550002,300\n\
             r2,5550001,5550009,10\n\
             r3,5550002,5550001,5000\n\
             r1,5550001,5550002,300\n",
        );

        let config = BatchConfig::new(2, 4);
        let summary = replay(Arc::clone(&engine), input.path(), &config).await.unwrap();

        assert_eq!(summary.completed, 1);
        assert_eq!(summary.replayed, 1);
        assert_eq!(summary.failed.get("NOT_FOUND"), Some(&1));
        assert_eq!(summary.failed.get("INSUFFICIENT_FUNDS"), Some(&1));
        assert_eq!(engine.get_account(&id("5550001")).await.unwrap().balance, 700);
    }

    #[tokio::test]
    async fn test_replay_missing_input_is_an_error() {
        let result = replay(engine(), Path::new("does/not/exist.csv"), &BatchConfig::default()).await;

        assert!(matches!(result, Err(LedgerError::StorageUnavailable { .. })));
    }
}
