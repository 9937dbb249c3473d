use std::sync::Arc;

use prime_bank_proto::{BankError, Transaction};
use prime_bank_store::LedgerStore;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    AlreadyPresent,
}

/// Append-only writer over a `LedgerStore`.
#[derive(Clone)]
pub struct LedgerWriter {
    store: Arc<dyn LedgerStore>,
}

impl LedgerWriter {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Strict append: an existing `(user_id, transaction_id)` is an error.
    pub fn append(&self, transaction: &Transaction) -> Result<(), BankError> {
        validate_transaction(transaction)?;
        self.store.insert_if_absent(transaction)
    }

    /// Append where a duplicate counts as success. Used on every retry path.
    pub fn append_idempotent(&self, transaction: &Transaction) -> Result<AppendOutcome, BankError> {
        match self.append(transaction) {
            Ok(()) => Ok(AppendOutcome::Appended),
            Err(BankError::DuplicateTransaction { transaction_id }) => {
                debug!(%transaction_id, "ledger entry already present");
                Ok(AppendOutcome::AlreadyPresent)
            }
            Err(err) => Err(err),
        }
    }

    pub fn find(
        &self,
        user_id: &str,
        transaction_id: &str,
    ) -> Result<Option<Transaction>, BankError> {
        self.store.get(user_id, transaction_id)
    }

    pub fn history(&self, user_id: &str) -> Result<Vec<Transaction>, BankError> {
        self.store.list(user_id)
    }
}

fn validate_transaction(transaction: &Transaction) -> Result<(), BankError> {
    if transaction.amount == 0 {
        return Err(BankError::InvalidAmount {
            amount: 0,
            reason: "ledger entries must carry a positive amount".to_string(),
        });
    }
    if transaction.user_id.is_empty() || transaction.transaction_id.is_empty() {
        return Err(BankError::InvalidRequest {
            reason: "ledger entries need a user id and a transaction id".to_string(),
        });
    }
    Ok(())
}
