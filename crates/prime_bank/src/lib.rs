//! Prime Bank: currency awards, earning caps and the transaction ledger.
//!
//! `AwardCoordinator` is the entry point. It resolves caps from
//! `CapPolicy`, decides admission with `caps_enforcer::evaluate`, applies the
//! award to the account with a version-checked write, then appends the
//! ledger entry through `LedgerWriter`.

pub mod bank_meter;
pub mod cap_policy;
pub mod caps_enforcer;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod idempotency;
pub mod ledger;
pub mod reconcile;

pub use bank_meter::BankMeterCalculator;
pub use cap_policy::{CapLimits, CapPolicy, CapPolicyTable, RoleCaps, MULTIPLIER_ONE_BPS};
pub use caps_enforcer::{CapAdmission, CapDecision, CapRejection};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{AwardLimits, BankConfig, MeterConfig, RetryConfig};
pub use coordinator::AwardCoordinator;
pub use idempotency::{derive_content_key, transaction_id_for};
pub use ledger::{AppendOutcome, LedgerWriter};
pub use reconcile::{LedgerReconciler, ReconcileReport, ReconcileViolation};

pub use prime_bank_proto::{
    Account, AccountSnapshot, AwardReceipt, AwardRequest, AwardResult, BankError, CapWindow,
    CapWindowKind, Currency, Role, Transaction, TransactionType, WindowSnapshot,
};
pub use prime_bank_store::{
    AccountStore, InMemoryBankStore, LedgerStore, LocalFileStore, SwapOutcome,
};
