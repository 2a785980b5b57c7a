//! Durable ledger state on disk
//!
//! A data directory holds two append-only journals and one derived snapshot:
//!
//! ```text
//! <data_dir>/
//!     accounts.csv      registrations  (id,initial_balance)
//!     transactions.csv  completed transfers  (id,client_request_id,from,to,amount,cashback,timestamp,status)
//!     balances.csv      snapshot written on checkpoint  (id,balance,version)
//! ```
//!
//! Every journal record is flushed before the change it describes becomes
//! visible, so the journals are the source of truth. On open, balances are
//! rebuilt by crediting each registration's opening balance and replaying the
//! completed transfers in order. The snapshot is only cross-checked.
//!
//! A crash in the middle of an append can leave a torn final row. It never
//! became visible to anyone, so it is cut off when the directory is opened.

use crate::config::LedgerConfig;
use crate::core::{AccountStore, AppendOnlyLog, InMemoryAccountStore, Journal, JournalSink, LedgerEngine};
use crate::io::csv_format::{read_accounts_csv, read_registrations, read_transactions, write_accounts_csv};
use crate::types::{Account, AccountId, LedgerError, Registration, Transaction, TransactionStatus};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const REGISTRATIONS_FILE: &str = "accounts.csv";
pub const JOURNAL_FILE: &str = "transactions.csv";
pub const SNAPSHOT_FILE: &str = "balances.csv";

/// Account store and transaction log, optionally backed by a data directory
#[derive(Debug)]
pub struct LedgerStore {
    accounts: Arc<InMemoryAccountStore>,
    log: Arc<AppendOnlyLog>,
    data_dir: Option<PathBuf>,
}

impl LedgerStore {
    /// A store that forgets everything when dropped
    pub fn in_memory() -> Self {
        Self {
            accounts: Arc::new(InMemoryAccountStore::new()),
            log: Arc::new(AppendOnlyLog::new()),
            data_dir: None,
        }
    }

    /// Open (or create) a ledger in `data_dir`
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` if the directory cannot be used or a journal is
    /// corrupt or inconsistent.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;

        let registrations_path = data_dir.join(REGISTRATIONS_FILE);
        let journal_path = data_dir.join(JOURNAL_FILE);

        let registrations = match open_existing(&registrations_path)? {
            Some(file) => read_registrations(file)?,
            None => Vec::new(),
        };
        let transactions = match open_existing(&journal_path)? {
            Some(file) => read_transactions(file)?,
            None => Vec::new(),
        };

        let accounts = rebuild_accounts(&registrations, &transactions)?;
        verify_snapshot(&data_dir.join(SNAPSHOT_FILE), &accounts)?;

        info!(
            data_dir = %data_dir.display(),
            accounts = accounts.len(),
            transactions = transactions.len(),
            "ledger opened"
        );

        let accounts = InMemoryAccountStore::with_journal(accounts, open_journal(&registrations_path)?);
        let log = AppendOnlyLog::with_journal(transactions, open_journal(&journal_path)?);

        Ok(Self {
            accounts: Arc::new(accounts),
            log: Arc::new(log),
            data_dir: Some(data_dir),
        })
    }

    /// Build an engine over this store
    ///
    /// The newest `idempotency_capacity` recorded transfers keep their
    /// request ids, so a retry after reopening is not applied again.
    ///
    /// # Errors
    ///
    /// `StorageUnavailable` if the transaction log cannot be read.
    pub fn engine(&self, config: LedgerConfig) -> Result<LedgerEngine, LedgerError> {
        let accounts: Arc<dyn AccountStore> = self.accounts.clone();
        let engine = LedgerEngine::new(accounts, self.log.clone(), config);
        let recent = self.log.recent(engine.config().idempotency_capacity)?;
        debug!(restored = recent.len(), "idempotency keys restored from the journal");
        engine.restore_idempotency(recent);
        Ok(engine)
    }

    /// Write the current balances to the snapshot file
    ///
    /// The snapshot is written to a temporary file and renamed into place,
    /// so readers see either the old or the new snapshot.
    pub fn checkpoint(&self) -> Result<(), LedgerError> {
        let Some(data_dir) = &self.data_dir else {
            return Ok(());
        };

        let accounts = self.accounts.all()?;
        let target = data_dir.join(SNAPSHOT_FILE);
        let staging = data_dir.join(format!("{SNAPSHOT_FILE}.tmp"));

        let mut file = File::create(&staging)?;
        write_accounts_csv(&accounts, &mut file)?;
        file.sync_all()?;
        fs::rename(&staging, &target)?;

        debug!(accounts = accounts.len(), path = %target.display(), "checkpoint written");
        Ok(())
    }

    /// Sync both journals to disk and write a final checkpoint
    pub fn close(self) -> Result<(), LedgerError> {
        self.accounts.sync()?;
        self.log.sync()?;
        self.checkpoint()
    }
}

/// Rebuild account balances from the journals
///
/// # Errors
///
/// `StorageUnavailable` if a transfer references an unregistered account or
/// would overdraw or overflow a balance.
pub fn rebuild_accounts(
    registrations: &[Registration],
    transactions: &[Transaction],
) -> Result<Vec<Account>, LedgerError> {
    let mut accounts: HashMap<AccountId, Account> = HashMap::with_capacity(registrations.len());
    for registration in registrations {
        if accounts.contains_key(&registration.id) {
            warn!(account = %registration.id, "duplicate registration ignored");
            continue;
        }
        accounts.insert(
            registration.id.clone(),
            Account::new(registration.id.clone(), registration.initial_balance),
        );
    }

    for transaction in transactions {
        if transaction.status != TransactionStatus::Completed {
            continue;
        }
        let inconsistent = |what: &str| {
            LedgerError::storage_unavailable(format!(
                "transaction journal entry {} {what}",
                transaction.id
            ))
        };

        let from = accounts
            .get_mut(&transaction.from)
            .ok_or_else(|| inconsistent("debits an unregistered account"))?;
        from.balance = from
            .balance
            .checked_sub(transaction.amount)
            .ok_or_else(|| inconsistent("overdraws its sender"))?;
        from.version += 1;

        let to = accounts
            .get_mut(&transaction.to)
            .ok_or_else(|| inconsistent("credits an unregistered account"))?;
        to.balance = to
            .balance
            .checked_add(transaction.amount)
            .ok_or_else(|| inconsistent("overflows its recipient"))?;
        to.version += 1;
    }

    let mut accounts: Vec<Account> = accounts.into_values().collect();
    accounts.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(accounts)
}

fn open_existing(path: &Path) -> Result<Option<File>, LedgerError> {
    if !path.exists() {
        return Ok(None);
    }
    cut_torn_tail(path)?;
    Ok(Some(File::open(path)?))
}

/// Truncate a journal after its last complete line
fn cut_torn_tail(path: &Path) -> Result<(), LedgerError> {
    let bytes = fs::read(path)?;
    if matches!(bytes.last(), None | Some(b'\n')) {
        return Ok(());
    }

    let keep = bytes.iter().rposition(|b| *b == b'\n').map_or(0, |pos| pos + 1);
    warn!(
        path = %path.display(),
        dropped_bytes = bytes.len() - keep,
        "cutting torn final journal row"
    );
    OpenOptions::new().write(true).open(path)?.set_len(keep as u64)?;
    Ok(())
}

fn open_journal(path: &Path) -> Result<Journal, LedgerError> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let fresh = file.metadata()?.len() == 0;
    let sink: Box<dyn JournalSink> = Box::new(file);
    Ok(Journal::new(sink, fresh))
}

/// Warn about snapshot balances that disagree with the journals
fn verify_snapshot(path: &Path, rebuilt: &[Account]) -> Result<(), LedgerError> {
    if !path.exists() {
        return Ok(());
    }
    let snapshot = read_accounts_csv(File::open(path)?)?;
    let rebuilt: HashMap<&AccountId, &Account> = rebuilt.iter().map(|a| (&a.id, a)).collect();

    for account in &snapshot {
        match rebuilt.get(&account.id) {
            Some(current) if current.balance == account.balance => {}
            Some(current) => warn!(
                account = %account.id,
                snapshot = account.balance,
                journal = current.balance,
                "snapshot balance disagrees with journal, using journal"
            ),
            None => warn!(account = %account.id, "snapshot account missing from journal"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TransactionLog;
    use crate::types::{ClientRequestId, TransferRequest};
    use rust_decimal::Decimal;
    use tempfile::TempDir;

    fn id(s: &str) -> AccountId {
        AccountId::parse(s).unwrap()
    }

    fn registration(account: &str, initial_balance: u64) -> Registration {
        Registration {
            id: id(account),
            initial_balance,
        }
    }

    fn request(from: &str, to: &str, amount: u64, key: &str) -> TransferRequest {
        TransferRequest::new(id(from), id(to), amount, ClientRequestId::parse(key).unwrap())
    }

    fn recorded(from: &str, to: &str, amount: u64, cashback: Decimal) -> Transaction {
        Transaction::completed(&request(from, to, amount, "recorded"), cashback)
    }

    #[test]
    fn test_rebuild_replays_transfers_in_order() {
        let registrations = vec![registration("5550001", 1000), registration("5550002", 0)];
        let transactions = vec![
            recorded("5550001", "5550002", 300, Decimal::new(15, 0)),
            recorded("5550002", "5550001", 100, Decimal::new(5, 0)),
        ];

        let accounts = rebuild_accounts(&registrations, &transactions).unwrap();

        assert_eq!(accounts[0], Account { id: id("5550001"), balance: 800, version: 2 });
        assert_eq!(accounts[1], Account { id: id("5550002"), balance: 200, version: 2 });
    }

    #[test]
    fn test_rebuild_keeps_first_registration() {
        let registrations = vec![registration("5550001", 1000), registration("5550001", 5)];

        let accounts = rebuild_accounts(&registrations, &[]).unwrap();

        assert_eq!(accounts, vec![Account::new(id("5550001"), 1000)]);
    }

    #[test]
    fn test_rebuild_rejects_overdrawing_journal() {
        let registrations = vec![registration("5550001", 10), registration("5550002", 0)];
        let transactions = vec![recorded("5550001", "5550002", 11, Decimal::ZERO)];

        let result = rebuild_accounts(&registrations, &transactions);

        assert!(matches!(result, Err(LedgerError::StorageUnavailable { .. })));
    }

    #[test]
    fn test_rebuild_rejects_unregistered_account() {
        let registrations = vec![registration("5550001", 10)];
        let transactions = vec![recorded("5550001", "5550009", 1, Decimal::ZERO)];

        let result = rebuild_accounts(&registrations, &transactions);

        assert!(matches!(result, Err(LedgerError::StorageUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();

        let store = LedgerStore::open(dir.path()).unwrap();
        let engine = store.engine(LedgerConfig::default()).unwrap();
        engine.register_or_login(&id("5550001"), 1000).await.unwrap();
        engine.register_or_login(&id("5550002"), 0).await.unwrap();
        engine.transfer(request("5550001", "5550002", 300, "r1")).await.unwrap();
        drop(engine);
        store.close().unwrap();

        let store = LedgerStore::open(dir.path()).unwrap();
        let engine = store.engine(LedgerConfig::default()).unwrap();

        assert_eq!(engine.get_account(&id("5550001")).await.unwrap().balance, 700);
        assert_eq!(engine.get_account(&id("5550002")).await.unwrap().balance, 300);
        let history: Vec<_> = engine.transactions_for(&id("5550002")).await.unwrap().collect();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].cashback, Decimal::new(15, 0));
    }

    #[tokio::test]
    async fn test_journals_survive_without_close() {
        let dir = TempDir::new().unwrap();

        {
            let store = LedgerStore::open(dir.path()).unwrap();
            let engine = store.engine(LedgerConfig::default()).unwrap();
            engine.register_or_login(&id("5550001"), 50).await.unwrap();
            engine.register_or_login(&id("5550002"), 0).await.unwrap();
            engine.transfer(request("5550001", "5550002", 20, "r1")).await.unwrap();
        }

        let store = LedgerStore::open(dir.path()).unwrap();
        let engine = store.engine(LedgerConfig::default()).unwrap();
        assert_eq!(engine.get_account(&id("5550001")).await.unwrap().balance, 30);
        assert!(!dir.path().join(SNAPSHOT_FILE).exists());
    }

    #[tokio::test]
    async fn test_reopened_journal_appends_without_new_header() {
        let dir = TempDir::new().unwrap();
        for (account, balance) in [("5550001", 1), ("5550002", 2)] {
            let store = LedgerStore::open(dir.path()).unwrap();
            let engine = store.engine(LedgerConfig::default()).unwrap();
            engine.register_or_login(&id(account), balance).await.unwrap();
            drop(engine);
            store.close().unwrap();
        }

        let journal = fs::read_to_string(dir.path().join(REGISTRATIONS_FILE)).unwrap();

        assert_eq!(journal, "id,initial_balance\n5550001,1\n5550002,2\n");
    }

    #[test]
    fn test_checkpoint_writes_sorted_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = LedgerStore::open(dir.path()).unwrap();
        store.accounts.get_or_create(&id("5550002"), 2).unwrap();
        store.accounts.get_or_create(&id("5550001"), 1).unwrap();

        store.checkpoint().unwrap();

        let snapshot = fs::read_to_string(dir.path().join(SNAPSHOT_FILE)).unwrap();
        assert_eq!(snapshot, "id,balance,version\n5550001,1,0\n5550002,2,0\n");
        assert!(!dir.path().join(format!("{SNAPSHOT_FILE}.tmp")).exists());
    }

    #[test]
    fn test_torn_tail_is_cut_on_open() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(REGISTRATIONS_FILE),
            "id,initial_balance\n5550001,1000\n55500",
        )
        .unwrap();

        let store = LedgerStore::open(dir.path()).unwrap();
        store.accounts.get_or_create(&id("5550002"), 7).unwrap();
        store.close().unwrap();

        let journal = fs::read_to_string(dir.path().join(REGISTRATIONS_FILE)).unwrap();
        assert_eq!(journal, "id,initial_balance\n5550001,1000\n5550002,7\n");
    }

    #[test]
    fn test_in_memory_store_checkpoint_is_noop() {
        let store = LedgerStore::in_memory();
        store.checkpoint().unwrap();
        store.close().unwrap();
    }

    #[tokio::test]
    async fn test_request_id_is_honoured_after_reopen() {
        let dir = TempDir::new().unwrap();

        let store = LedgerStore::open(dir.path()).unwrap();
        let engine = store.engine(LedgerConfig::default()).unwrap();
        engine.register_or_login(&id("5550001"), 1000).await.unwrap();
        engine.register_or_login(&id("5550002"), 0).await.unwrap();
        let first = engine.transfer(request("5550001", "5550002", 300, "r1")).await.unwrap();
        drop(engine);
        store.close().unwrap();

        let store = LedgerStore::open(dir.path()).unwrap();
        let engine = store.engine(LedgerConfig::default()).unwrap();
        let retry = engine.transfer(request("5550001", "5550002", 300, "r1")).await.unwrap();

        assert!(retry.replayed);
        assert_eq!(retry.transaction, first.transaction);
        assert_eq!(engine.get_account(&id("5550001")).await.unwrap().balance, 700);
        let reused = engine.transfer(request("5550001", "5550002", 5, "r1")).await;
        assert_eq!(reused.unwrap_err(), LedgerError::idempotency_key_reuse("r1"));
    }

    #[tokio::test]
    async fn test_only_newest_request_ids_are_restored() {
        let dir = TempDir::new().unwrap();
        let config = LedgerConfig::new(std::time::Duration::from_millis(250), 5, 1);

        let store = LedgerStore::open(dir.path()).unwrap();
        let engine = store.engine(config.clone()).unwrap();
        engine.register_or_login(&id("5550001"), 1000).await.unwrap();
        engine.register_or_login(&id("5550002"), 0).await.unwrap();
        engine.transfer(request("5550001", "5550002", 10, "old")).await.unwrap();
        engine.transfer(request("5550001", "5550002", 20, "new")).await.unwrap();
        drop(engine);
        store.close().unwrap();

        let store = LedgerStore::open(dir.path()).unwrap();
        let engine = store.engine(config).unwrap();

        assert!(engine.transfer(request("5550001", "5550002", 20, "new")).await.unwrap().replayed);
        assert!(!engine.transfer(request("5550001", "5550002", 10, "old")).await.unwrap().replayed);
        assert_eq!(engine.get_account(&id("5550002")).await.unwrap().balance, 40);
    }

    #[test]
    fn test_transaction_journal_carries_request_ids() {
        let dir = TempDir::new().unwrap();
        let store = LedgerStore::open(dir.path()).unwrap();
        store.accounts.get_or_create(&id("5550001"), 10).unwrap();
        store.accounts.get_or_create(&id("5550002"), 0).unwrap();
        store.log.append(recorded("5550001", "5550002", 3, Decimal::ZERO)).unwrap();
        store.close().unwrap();

        let journal = fs::read_to_string(dir.path().join(JOURNAL_FILE)).unwrap();

        assert!(journal.starts_with("id,client_request_id,from,to,amount,cashback,timestamp,status\n"));
        assert!(journal.contains(",recorded,5550001,5550002,3,0,"));
    }
}
