//! Per-account mutual exclusion
//!
//! `LockTable` hands out one async mutex per account id. Transfers lock both
//! of their accounts in ascending id order, so two transfers sharing accounts
//! can never wait on each other in a cycle. Every acquisition is bounded by a
//! deadline; running out of time is reported as `Contention`.

use crate::types::{AccountId, LedgerError};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

#[derive(Debug, Default)]
pub struct LockTable {
    locks: DashMap<AccountId, Arc<Mutex<()>>>,
}

/// Exclusive hold on a set of accounts; released on drop
#[derive(Debug)]
pub struct AccountGuards {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, id: &AccountId) -> Arc<Mutex<()>> {
        Arc::clone(
            self.locks
                .entry(id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        )
    }

    /// Lock every account in `ids`, lowest id first, within `timeout` overall
    ///
    /// Duplicate ids are locked once. On timeout, the locks already taken are
    /// released before returning.
    pub async fn acquire(
        &self,
        ids: &[&AccountId],
        timeout: Duration,
    ) -> Result<AccountGuards, LedgerError> {
        let mut ordered: Vec<&AccountId> = ids.to_vec();
        ordered.sort();
        ordered.dedup();

        let deadline = Instant::now() + timeout;
        let mut guards = Vec::with_capacity(ordered.len());

        for id in ordered {
            let lock = self.lock_for(id);
            match tokio::time::timeout_at(deadline, lock.lock_owned()).await {
                Ok(guard) => guards.push(guard),
                Err(_) => {
                    return Err(LedgerError::contention(
                        "account lock",
                        format!("timed out after {timeout:?} waiting for account {id}"),
                    ))
                }
            }
        }

        Ok(AccountGuards { _guards: guards })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> AccountId {
        AccountId::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_acquire_and_release() {
        let table = LockTable::new();
        let (a, b) = (id("1000"), id("2000"));

        let guards = table.acquire(&[&a, &b], Duration::from_millis(50)).await.unwrap();
        drop(guards);

        assert!(table.acquire(&[&b, &a], Duration::from_millis(50)).await.is_ok());
    }

    #[tokio::test]
    async fn test_duplicate_ids_are_locked_once() {
        let table = LockTable::new();
        let a = id("1000");

        let result = table.acquire(&[&a, &a], Duration::from_millis(50)).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_held_lock_times_out_as_contention() {
        let table = LockTable::new();
        let (a, b) = (id("1000"), id("2000"));
        let _held = table.acquire(&[&b], Duration::from_millis(50)).await.unwrap();

        let result = table.acquire(&[&a, &b], Duration::from_millis(20)).await;

        assert!(matches!(result, Err(LedgerError::Contention { .. })));
        // The partially acquired lock on `a` was released
        assert!(table.acquire(&[&a], Duration::from_millis(20)).await.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_opposite_orders_do_not_deadlock() {
        let table = Arc::new(LockTable::new());
        let mut tasks = Vec::new();

        for i in 0..50 {
            let table = Arc::clone(&table);
            tasks.push(tokio::spawn(async move {
                let (a, b) = (id("1000"), id("2000"));
                let ids = if i % 2 == 0 { [&a, &b] } else { [&b, &a] };
                let _guards = table.acquire(&ids, Duration::from_secs(5)).await?;
                tokio::task::yield_now().await;
                Ok::<_, LedgerError>(())
            }));
        }

        for task in tasks {
            assert!(task.await.unwrap().is_ok());
        }
    }
}
