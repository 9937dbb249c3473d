//! Ledger replay against stored balances.
//!
//! The award path writes the account first and the ledger second, so a crash
//! in between leaves a receipt on the account with no ledger entry. `check`
//! finds that gap and `repair` closes it from the receipt. Balances are never
//! touched here.

use std::collections::BTreeSet;
use std::sync::Arc;

use prime_bank_proto::{Account, BankError, Currency, Transaction, TransactionType};
use prime_bank_store::AccountStore;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::ledger::{AppendOutcome, LedgerWriter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ReconcileViolation {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ReconcileReport {
    pub user_id: String,
    pub ledger_entry_count: usize,
    pub ledger_prime_coins: u64,
    pub ledger_creator_credits: u64,
    pub prime_coins: u64,
    pub creator_credits: u64,
    pub lifetime_prime_coins: u64,
    pub lifetime_creator_credits: u64,
    /// Receipts on the account whose transaction is absent from the ledger.
    pub missing_transaction_ids: Vec<String>,
    pub violations: Vec<ReconcileViolation>,
}

impl ReconcileReport {
    pub fn is_ok(&self) -> bool {
        self.violations.is_empty()
    }

    fn push(&mut self, code: &str, message: String) {
        self.violations.push(ReconcileViolation {
            code: code.to_string(),
            message,
        });
    }
}

pub struct LedgerReconciler {
    accounts: Arc<dyn AccountStore>,
    ledger: LedgerWriter,
}

impl LedgerReconciler {
    pub fn new(accounts: Arc<dyn AccountStore>, ledger: LedgerWriter) -> Self {
        Self { accounts, ledger }
    }

    pub fn check(&self, user_id: &str) -> Result<ReconcileReport, BankError> {
        let account = self.load(user_id)?;
        let history = self.ledger.history(user_id)?;
        let report = build_report(&account, &history);
        if report.is_ok() {
            info!(user_id, entries = report.ledger_entry_count, "ledger reconciled");
        } else {
            warn!(
                user_id,
                violations = report.violations.len(),
                missing = report.missing_transaction_ids.len(),
                "ledger disagrees with account"
            );
        }
        Ok(report)
    }

    /// Checks every account the store knows about.
    pub fn check_all(&self) -> Result<Vec<ReconcileReport>, BankError> {
        self.accounts
            .user_ids()?
            .iter()
            .map(|user_id| self.check(user_id))
            .collect()
    }

    /// Re-appends ledger entries for receipts that never reached the ledger.
    /// Returns how many entries were restored.
    pub fn repair(&self, user_id: &str) -> Result<usize, BankError> {
        let account = self.load(user_id)?;
        let mut restored = 0;
        for receipt in &account.recent_awards {
            let transaction = Transaction::from_receipt(user_id, receipt);
            if self.ledger.append_idempotent(&transaction)? == AppendOutcome::Appended {
                info!(
                    user_id,
                    transaction_id = %receipt.transaction_id,
                    amount = receipt.amount,
                    "restored missing ledger entry"
                );
                restored += 1;
            }
        }
        Ok(restored)
    }

    fn load(&self, user_id: &str) -> Result<Account, BankError> {
        self.accounts
            .load(user_id)?
            .ok_or_else(|| BankError::NotFound {
                user_id: user_id.to_string(),
            })
    }
}

fn build_report(account: &Account, history: &[Transaction]) -> ReconcileReport {
    let mut report = ReconcileReport {
        user_id: account.user_id.clone(),
        ledger_entry_count: history.len(),
        prime_coins: account.prime_coins,
        creator_credits: account.creator_credits,
        lifetime_prime_coins: account.lifetime_prime_coins,
        lifetime_creator_credits: account.lifetime_creator_credits,
        ..ReconcileReport::default()
    };

    for transaction in history {
        match transaction.kind {
            TransactionType::Earn => match transaction.currency {
                Currency::PrimeCoins => {
                    report.ledger_prime_coins =
                        report.ledger_prime_coins.saturating_add(transaction.amount);
                }
                Currency::CreatorCredits => {
                    report.ledger_creator_credits = report
                        .ledger_creator_credits
                        .saturating_add(transaction.amount);
                }
            },
        }
    }

    let recorded: BTreeSet<&str> = history
        .iter()
        .map(|transaction| transaction.transaction_id.as_str())
        .collect();
    report.missing_transaction_ids = account
        .recent_awards
        .iter()
        .filter(|receipt| !recorded.contains(receipt.transaction_id.as_str()))
        .map(|receipt| receipt.transaction_id.clone())
        .collect();
    for transaction_id in report.missing_transaction_ids.clone() {
        report.push(
            "missing_ledger_entry",
            format!("receipt {transaction_id} has no ledger entry"),
        );
    }

    for currency in [Currency::PrimeCoins, Currency::CreatorCredits] {
        let replayed = match currency {
            Currency::PrimeCoins => report.ledger_prime_coins,
            Currency::CreatorCredits => report.ledger_creator_credits,
        };
        let balance = account.balance(currency);
        if balance != replayed {
            report.push(
                "balance_mismatch",
                format!("{currency} balance {balance} but ledger replays to {replayed}"),
            );
        }
        let lifetime = account.lifetime(currency);
        if lifetime != replayed {
            report.push(
                "lifetime_mismatch",
                format!("{currency} lifetime {lifetime} but ledger replays to {replayed}"),
            );
        }
    }
    report
}
