//! Shared records and error types for the Prime Bank ledger.

pub mod account;
pub mod award;
pub mod bank_error;
pub mod transaction;

pub use account::{
    day_marker, week_marker, Account, AccountSnapshot, AwardReceipt, CapWindow, Currency, Role,
    WindowSnapshot,
};
pub use award::{AwardRequest, AwardResult, CapWindowKind};
pub use bank_error::BankError;
pub use transaction::{Transaction, TransactionType};
