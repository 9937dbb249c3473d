use serde::{Deserialize, Serialize};
use std::fmt;

use crate::account::{AwardReceipt, Currency, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapWindowKind {
    Daily,
    Weekly,
}

impl fmt::Display for CapWindowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapWindowKind::Daily => f.write_str("daily"),
            CapWindowKind::Weekly => f.write_str("weekly"),
        }
    }
}

/// Input to `AwardCurrency`.
///
/// `amount` is signed so that non-positive input reaches validation and is
/// reported as `InvalidAmount` instead of failing to parse upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardRequest {
    pub user_id: String,
    pub role: Role,
    pub currency: Currency,
    pub amount: i64,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl AwardRequest {
    pub fn new(
        user_id: impl Into<String>,
        role: Role,
        currency: Currency,
        amount: i64,
        source: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            currency,
            amount,
            source: source.into(),
            idempotency_key: None,
            notes: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardResult {
    pub transaction_id: String,
    pub currency: Currency,
    pub credited_amount: u64,
    pub new_balance: u64,
    pub new_daily_total: u64,
    pub new_weekly_total: u64,
    pub bank_meter_progress: u64,
    /// True when the idempotency key had already been applied and this is the
    /// original outcome being returned again.
    pub replayed: bool,
}

impl AwardResult {
    pub fn from_receipt(receipt: &AwardReceipt, replayed: bool) -> Self {
        Self {
            transaction_id: receipt.transaction_id.clone(),
            currency: receipt.currency,
            credited_amount: receipt.amount,
            new_balance: receipt.balance_after,
            new_daily_total: receipt.daily_total_after,
            new_weekly_total: receipt.weekly_total_after,
            bank_meter_progress: receipt.bank_meter_after,
            replayed,
        }
    }
}
