//! Account and ledger persistence for the Prime Bank core.
//!
//! Both stores lock per user, so awards for different users never contend
//! and no lock spans more than one user's records.
//! `AccountStore::compare_and_swap` is the only way to write an account;
//! `LedgerStore::insert_if_absent` is the only way to write a transaction.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use prime_bank_proto::{Account, BankError, Transaction};

mod local;

pub use local::LocalFileStore;

/// Result of a conditional account write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapOutcome {
    Applied,
    /// The stored version no longer matches what the writer read.
    Conflict { current_version: Option<u64> },
}

impl SwapOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, SwapOutcome::Applied)
    }
}

pub trait AccountStore: Send + Sync {
    fn load(&self, user_id: &str) -> Result<Option<Account>, BankError>;

    /// Writes `next` only if the stored record's version equals
    /// `expected_version`. `None` means the record must not exist yet.
    fn compare_and_swap(
        &self,
        expected_version: Option<u64>,
        next: &Account,
    ) -> Result<SwapOutcome, BankError>;

    fn user_ids(&self) -> Result<Vec<String>, BankError>;
}

pub trait LedgerStore: Send + Sync {
    /// Fails with `BankError::DuplicateTransaction` if the
    /// `(user_id, transaction_id)` pair is already present.
    fn insert_if_absent(&self, transaction: &Transaction) -> Result<(), BankError>;

    fn get(&self, user_id: &str, transaction_id: &str)
        -> Result<Option<Transaction>, BankError>;

    /// All transactions for `user_id`, oldest first.
    fn list(&self, user_id: &str) -> Result<Vec<Transaction>, BankError>;
}

/// Sorts history by timestamp, breaking ties by transaction id.
pub fn sort_history(transactions: &mut [Transaction]) {
    transactions.sort_by(|left, right| {
        left.timestamp
            .cmp(&right.timestamp)
            .then_with(|| left.transaction_id.cmp(&right.transaction_id))
    });
}

fn lock<'a, T>(mutex: &'a Mutex<T>, label: &str) -> Result<MutexGuard<'a, T>, BankError> {
    mutex
        .lock()
        .map_err(|_| BankError::Store(format!("{label} lock poisoned")))
}

/// One lock per user id. The outer map is locked only long enough to find or
/// create a slot, so operations on different users never wait on each other.
#[derive(Debug)]
struct UserSlots<T> {
    label: &'static str,
    slots: Mutex<BTreeMap<String, Arc<Mutex<T>>>>,
}

impl<T: Default> UserSlots<T> {
    fn new(label: &'static str) -> Self {
        Self {
            label,
            slots: Mutex::new(BTreeMap::new()),
        }
    }

    fn slot(&self, user_id: &str) -> Result<Arc<Mutex<T>>, BankError> {
        let mut slots = lock(&self.slots, self.label)?;
        let slot = slots.entry(user_id.to_string()).or_default();
        Ok(Arc::clone(slot))
    }

    fn existing(&self, user_id: &str) -> Result<Option<Arc<Mutex<T>>>, BankError> {
        let slots = lock(&self.slots, self.label)?;
        Ok(slots.get(user_id).cloned())
    }

    fn snapshot(&self) -> Result<Vec<(String, Arc<Mutex<T>>)>, BankError> {
        let slots = lock(&self.slots, self.label)?;
        Ok(slots
            .iter()
            .map(|(user_id, slot)| (user_id.clone(), Arc::clone(slot)))
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct InMemoryBankStore {
    accounts: Arc<UserSlots<Option<Account>>>,
    ledger: Arc<UserSlots<BTreeMap<String, Transaction>>>,
}

impl Default for InMemoryBankStore {
    fn default() -> Self {
        Self {
            accounts: Arc::new(UserSlots::new("accounts")),
            ledger: Arc::new(UserSlots::new("ledger")),
        }
    }
}

impl InMemoryBankStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes one ledger entry. Only used to simulate a crash between the
    /// balance write and the ledger append.
    pub fn forget_transaction(&self, user_id: &str, transaction_id: &str) -> bool {
        let Ok(Some(slot)) = self.ledger.existing(user_id) else {
            return false;
        };
        let removed = match slot.lock() {
            Ok(mut entries) => entries.remove(transaction_id).is_some(),
            Err(_) => false,
        };
        removed
    }
}

impl AccountStore for InMemoryBankStore {
    fn load(&self, user_id: &str) -> Result<Option<Account>, BankError> {
        let Some(slot) = self.accounts.existing(user_id)? else {
            return Ok(None);
        };
        let account = lock(&slot, "account")?;
        Ok(account.clone())
    }

    fn compare_and_swap(
        &self,
        expected_version: Option<u64>,
        next: &Account,
    ) -> Result<SwapOutcome, BankError> {
        let slot = self.accounts.slot(&next.user_id)?;
        let mut account = lock(&slot, "account")?;
        let current_version = account.as_ref().map(|account| account.version);
        if current_version != expected_version {
            return Ok(SwapOutcome::Conflict { current_version });
        }
        *account = Some(next.clone());
        Ok(SwapOutcome::Applied)
    }

    fn user_ids(&self) -> Result<Vec<String>, BankError> {
        let mut user_ids = Vec::new();
        for (user_id, slot) in self.accounts.snapshot()? {
            if lock(&slot, "account")?.is_some() {
                user_ids.push(user_id);
            }
        }
        Ok(user_ids)
    }
}

impl LedgerStore for InMemoryBankStore {
    fn insert_if_absent(&self, transaction: &Transaction) -> Result<(), BankError> {
        let slot = self.ledger.slot(&transaction.user_id)?;
        let mut entries = lock(&slot, "ledger")?;
        if entries.contains_key(&transaction.transaction_id) {
            return Err(BankError::DuplicateTransaction {
                transaction_id: transaction.transaction_id.clone(),
            });
        }
        entries.insert(transaction.transaction_id.clone(), transaction.clone());
        Ok(())
    }

    fn get(
        &self,
        user_id: &str,
        transaction_id: &str,
    ) -> Result<Option<Transaction>, BankError> {
        let Some(slot) = self.ledger.existing(user_id)? else {
            return Ok(None);
        };
        let entries = lock(&slot, "ledger")?;
        Ok(entries.get(transaction_id).cloned())
    }

    fn list(&self, user_id: &str) -> Result<Vec<Transaction>, BankError> {
        let Some(slot) = self.ledger.existing(user_id)? else {
            return Ok(Vec::new());
        };
        let mut transactions: Vec<Transaction> =
            lock(&slot, "ledger")?.values().cloned().collect();
        sort_history(&mut transactions);
        Ok(transactions)
    }
}

#[cfg(test)]
mod tests;
