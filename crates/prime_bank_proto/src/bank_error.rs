use std::io;

use thiserror::Error;

use crate::award::CapWindowKind;

/// Errors surfaced by the Prime Bank core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BankError {
    #[error("invalid amount {amount}: {reason}")]
    InvalidAmount { amount: i64, reason: String },

    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("{window} cap exceeded; largest admissible award is {suggested_max_award}")]
    CapExceeded {
        window: CapWindowKind,
        suggested_max_award: u64,
    },

    /// Lost the optimistic-concurrency race on every attempt. Transient.
    #[error("account {user_id} still contended after {attempts} attempts")]
    StoreConflict { user_id: String, attempts: u32 },

    #[error("transaction {transaction_id} already recorded")]
    DuplicateTransaction { transaction_id: String },

    #[error("account {user_id} not found")]
    NotFound { user_id: String },

    #[error("store error: {0}")]
    Store(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("serde error: {0}")]
    Serde(String),
}

impl BankError {
    /// Whether the caller may resubmit the same request unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BankError::StoreConflict { .. })
    }
}

impl From<io::Error> for BankError {
    fn from(error: io::Error) -> Self {
        BankError::Io(error.to_string())
    }
}

impl From<serde_json::Error> for BankError {
    fn from(error: serde_json::Error) -> Self {
        BankError::Serde(error.to_string())
    }
}

impl From<toml::de::Error> for BankError {
    fn from(error: toml::de::Error) -> Self {
        BankError::Config(error.to_string())
    }
}

impl From<toml::ser::Error> for BankError {
    fn from(error: toml::ser::Error) -> Self {
        BankError::Config(error.to_string())
    }
}
