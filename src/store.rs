//! The transaction sink: an in-memory, mutex-guarded log of completed and
//! aborted transactions, queried read-only by the HTTP API.
//!
//! Grounded on `internal/repository/repository.go` in the original mailmock
//! implementation, which exposes the same `Store`/`get`/`list` shape as
//! package-level functions over a global slice; here it is an explicit type
//! behind an `Arc`, per the redesign note in spec.md §9 ("Handler callback").

use std::sync::Mutex;

use serde::Serialize;

use crate::smtp::transaction::Transaction;

/// The narrow interface the SMTP core depends on: "hand me a finished
/// transaction, tell me its id." Nothing in `src/smtp` needs to know how or
/// where transactions are kept after that.
pub trait TransactionSink: Send + Sync {
    fn store(&self, transaction: Transaction) -> u64;
}

/// A transaction plus the id it was assigned by the store.
#[derive(Debug, Clone, Serialize)]
pub struct StoredTransaction {
    pub id: u64,
    #[serde(flatten)]
    pub transaction: Transaction,
}

/// Outcome of [`TransactionStore::list`], distinguishing "no such page" from
/// "empty page" per spec.md §6's `list(from, limit)` contract.
pub enum ListResult {
    NotFound,
    Page {
        entries: Vec<StoredTransaction>,
        is_full: bool,
    },
}

/// The in-memory transaction log. IDs are dense and monotonically
/// increasing starting at 0, matching insertion order (spec.md §5: "the
/// sink must preserve the order `store` was called").
#[derive(Default)]
pub struct TransactionStore {
    entries: Mutex<Vec<Transaction>>,
}

impl TransactionStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub fn get(&self, id: u64) -> Option<StoredTransaction> {
        let entries = self.entries.lock().expect("store mutex poisoned");
        entries.get(id as usize).cloned().map(|transaction| StoredTransaction { id, transaction })
    }

    /// Returns up to `limit` entries starting at index `from`, plus whether
    /// this page is the full store (`from == 0` and it covers everything).
    pub fn list(&self, from: u64, limit: u64) -> ListResult {
        let entries = self.entries.lock().expect("store mutex poisoned");
        let total = entries.len() as u64;

        if from > total {
            return ListResult::NotFound;
        }
        if from == total {
            return ListResult::Page {
                entries: Vec::new(),
                is_full: from == 0,
            };
        }

        let end = (from + limit).min(total);
        let page: Vec<StoredTransaction> = entries[from as usize..end as usize]
            .iter()
            .enumerate()
            .map(|(offset, tx)| StoredTransaction {
                id: from + offset as u64,
                transaction: tx.clone(),
            })
            .collect();
        let is_full = from == 0 && end == total;
        ListResult::Page { entries: page, is_full }
    }

    pub fn reset(&self) {
        self.entries.lock().expect("store mutex poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("store mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TransactionSink for TransactionStore {
    fn store(&self, transaction: Transaction) -> u64 {
        let mut entries = self.entries.lock().expect("store mutex poisoned");
        entries.push(transaction);
        (entries.len() - 1) as u64
    }
}
