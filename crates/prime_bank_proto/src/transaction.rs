use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::{AwardReceipt, Currency};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Earn,
}

/// Immutable ledger entry for one accepted award.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    pub transaction_id: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub currency: Currency,
    pub amount: u64,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub idempotency_key: String,
}

impl Transaction {
    /// Ledger entry matching an applied receipt. Deterministic, so rebuilding
    /// it during reconciliation yields the same record.
    pub fn from_receipt(user_id: &str, receipt: &AwardReceipt) -> Self {
        Self {
            user_id: user_id.to_string(),
            timestamp: receipt.timestamp,
            transaction_id: receipt.transaction_id.clone(),
            kind: TransactionType::Earn,
            currency: receipt.currency,
            amount: receipt.amount,
            source: receipt.source.clone(),
            notes: receipt.notes.clone(),
            idempotency_key: receipt.idempotency_key.clone(),
        }
    }
}
