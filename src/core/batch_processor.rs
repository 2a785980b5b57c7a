//! Concurrent batch execution of transfer requests
//!
//! The `BatchProcessor` runs every request of a batch as its own tokio task,
//! with at most `max_concurrent` tasks in flight. Unlike per-client CSV
//! processing, transfers need no partitioning: the engine's ordered locks
//! serialize transfers that share an account, and unrelated transfers run in
//! parallel.
//!
//! # Architecture
//!
//! ```text
//! BatchProcessor
//!     ├── Arc<LedgerEngine>  (shared transfer engine)
//!     └── max_concurrent     (bound on in-flight transfers)
//! ```

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::error;

use super::engine::{LedgerEngine, TransferOutcome};
use crate::types::{LedgerError, TransferRequest};

/// Result of processing a single transfer request
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    /// The request that was processed
    pub request: TransferRequest,

    /// The outcome (success or typed failure)
    pub result: Result<TransferOutcome, LedgerError>,
}

#[derive(Debug, Clone)]
pub struct BatchProcessor {
    engine: Arc<LedgerEngine>,
    max_concurrent: usize,
}

impl BatchProcessor {
    pub fn new(engine: Arc<LedgerEngine>, max_concurrent: usize) -> Self {
        Self {
            engine,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Process a batch of transfer requests concurrently
    ///
    /// Every request is processed, even if some fail; failures are captured in
    /// the results. Results may come back in a different order than the input.
    pub async fn process_batch(&self, batch: Vec<TransferRequest>) -> Vec<ProcessingResult> {
        let tasks = batch.into_iter().map(|request| {
            let engine = Arc::clone(&self.engine);
            tokio::spawn(async move {
                let result = engine.transfer(request.clone()).await;
                ProcessingResult { request, result }
            })
        });

        let joined: Vec<_> = stream::iter(tasks)
            .buffer_unordered(self.max_concurrent)
            .collect()
            .await;

        joined
            .into_iter()
            .filter_map(|joined| match joined {
                Ok(result) => Some(result),
                Err(e) => {
                    error!("transfer task panicked: {e}");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LedgerConfig;
    use crate::core::{AppendOnlyLog, InMemoryAccountStore};
    use crate::types::{AccountId, ClientRequestId, MinorUnits};

    fn id(s: &str) -> AccountId {
        AccountId::parse(s).unwrap()
    }

    fn request(from: &str, to: &str, amount: MinorUnits, key: &str) -> TransferRequest {
        TransferRequest::new(id(from), id(to), amount, ClientRequestId::parse(key).unwrap())
    }

    async fn engine() -> Arc<LedgerEngine> {
        let engine = LedgerEngine::new(
            Arc::new(InMemoryAccountStore::new()),
            Arc::new(AppendOnlyLog::new()),
            LedgerConfig::default(),
        );
        engine.register_or_login(&id("1000"), 1000).await.unwrap();
        engine.register_or_login(&id("2000"), 1000).await.unwrap();
        engine.register_or_login(&id("3000"), 0).await.unwrap();
        Arc::new(engine)
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let processor = BatchProcessor::new(engine().await, 4);

        let results = processor.process_batch(Vec::new()).await;

        assert!(results.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_request_gets_a_result() {
        let engine = engine().await;
        let processor = BatchProcessor::new(Arc::clone(&engine), 4);

        let results = processor
            .process_batch(vec![
                request("1000", "3000", 100, "r1"),
                request("2000", "3000", 200, "r2"),
                request("3000", "1000", 5000, "r3"),
            ])
            .await;

        assert_eq!(results.len(), 3);
        let failed: Vec<_> = results.iter().filter(|r| r.result.is_err()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].request.client_request_id.as_str(), "r3");
        assert_eq!(engine.get_account(&id("3000")).await.unwrap().balance, 300);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_zero_concurrency_is_clamped() {
        let processor = BatchProcessor::new(engine().await, 0);

        let results = processor
            .process_batch(vec![request("1000", "2000", 1, "r1")])
            .await;

        assert_eq!(results.len(), 1);
        assert!(results[0].result.is_ok());
    }
}
