//! Award orchestration.
//!
//! Every award is read-evaluate-conditional-write against the account
//! record. The cap decision is made on the exact version that is later
//! swapped, so two concurrent awards can never both pass a check that only
//! one of them fits. The idempotency receipt travels inside the same write,
//! which makes a duplicate request observe the first one's outcome instead
//! of applying again.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use prime_bank_proto::{
    Account, AccountSnapshot, AwardReceipt, AwardRequest, AwardResult, BankError, CapWindow,
    Currency, Transaction, WindowSnapshot,
};
use prime_bank_store::{AccountStore, LedgerStore, SwapOutcome};
use rand_core::{OsRng, RngCore};
use tracing::{debug, info, warn};

use crate::bank_meter::BankMeterCalculator;
use crate::cap_policy::{CapLimits, CapPolicy};
use crate::caps_enforcer::{self, CapDecision};
use crate::clock::Clock;
use crate::config::{AwardLimits, BankConfig, RetryConfig};
use crate::idempotency::{derive_content_key, transaction_id_for};
use crate::ledger::LedgerWriter;

pub struct AwardCoordinator {
    accounts: Arc<dyn AccountStore>,
    ledger: LedgerWriter,
    policy: CapPolicy,
    meter: BankMeterCalculator,
    clock: Arc<dyn Clock>,
    retry: RetryConfig,
    limits: AwardLimits,
}

/// Request fields after validation, with the key resolved.
struct PreparedAward<'a> {
    request: &'a AwardRequest,
    limits: CapLimits,
    credited_amount: u64,
    idempotency_key: String,
    transaction_id: String,
    now: DateTime<Utc>,
}

impl AwardCoordinator {
    pub fn new(
        config: &BankConfig,
        accounts: Arc<dyn AccountStore>,
        ledger: Arc<dyn LedgerStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            accounts,
            ledger: LedgerWriter::new(ledger),
            policy: CapPolicy::new(config.caps.clone()),
            meter: BankMeterCalculator::new(&config.meter),
            clock,
            retry: config.retry,
            limits: config.limits,
        }
    }

    pub fn policy(&self) -> &CapPolicy {
        &self.policy
    }

    pub fn ledger(&self) -> &LedgerWriter {
        &self.ledger
    }

    /// `AwardCurrency`: applies one award at most once per idempotency key.
    pub fn award_currency(&self, request: &AwardRequest) -> Result<AwardResult, BankError> {
        let prepared = self.prepare(request)?;
        let user_id = request.user_id.as_str();
        let max_attempts = self.retry.max_attempts.max(1);

        for attempt in 0..max_attempts {
            let current = self.accounts.load(user_id)?;
            let expected_version = current.as_ref().map(|account| account.version);

            if let Some(account) = &current {
                if let Some(result) = self.replay(account, &prepared)? {
                    return Ok(result);
                }
            }

            let account = current
                .unwrap_or_else(|| Account::new(user_id, request.role, prepared.now));
            let (next, receipt) = self.apply(account, expected_version, &prepared)?;

            match self.accounts.compare_and_swap(expected_version, &next)? {
                SwapOutcome::Applied => {
                    info!(
                        user_id,
                        currency = %request.currency,
                        amount = receipt.amount,
                        transaction_id = %receipt.transaction_id,
                        balance = receipt.balance_after,
                        "award applied"
                    );
                    self.record_ledger_entry(user_id, &receipt);
                    return Ok(AwardResult::from_receipt(&receipt, false));
                }
                SwapOutcome::Conflict { current_version } => {
                    debug!(
                        user_id,
                        attempt,
                        ?expected_version,
                        ?current_version,
                        "account changed underneath award, retrying"
                    );
                    if attempt + 1 < max_attempts {
                        self.backoff(attempt);
                    }
                }
            }
        }

        warn!(user_id, attempts = max_attempts, "award abandoned after contention");
        Err(BankError::StoreConflict {
            user_id: user_id.to_string(),
            attempts: max_attempts,
        })
    }

    /// `GetAccount`: display projection with totals as of now.
    pub fn get_account(&self, user_id: &str) -> Result<AccountSnapshot, BankError> {
        let account = self
            .accounts
            .load(user_id)?
            .ok_or_else(|| BankError::NotFound {
                user_id: user_id.to_string(),
            })?;
        let now = self.clock.now();
        Ok(AccountSnapshot {
            user_id: account.user_id.clone(),
            role: account.role,
            prime_coins: account.prime_coins,
            creator_credits: account.creator_credits,
            lifetime_prime_coins: account.lifetime_prime_coins,
            lifetime_creator_credits: account.lifetime_creator_credits,
            bank_meter_progress: account.bank_meter_progress,
            prime_coin_caps: window_snapshot(
                &account.coin_window,
                &self.policy.resolve(account.role, Currency::PrimeCoins),
                now,
            ),
            creator_credit_caps: window_snapshot(
                &account.credit_window,
                &self.policy.resolve(account.role, Currency::CreatorCredits),
                now,
            ),
            updated_at: account.updated_at,
        })
    }

    pub fn history(&self, user_id: &str) -> Result<Vec<Transaction>, BankError> {
        self.ledger.history(user_id)
    }

    fn prepare<'a>(&self, request: &'a AwardRequest) -> Result<PreparedAward<'a>, BankError> {
        if request.user_id.trim().is_empty() {
            return Err(BankError::InvalidRequest {
                reason: "user_id must not be empty".to_string(),
            });
        }
        if request.source.trim().is_empty() {
            return Err(BankError::InvalidRequest {
                reason: "source must not be empty".to_string(),
            });
        }
        if request.amount <= 0 {
            return Err(BankError::InvalidAmount {
                amount: request.amount,
                reason: "amount must be positive".to_string(),
            });
        }
        let amount = request.amount as u64;
        if amount > self.limits.max_award_amount {
            return Err(BankError::InvalidAmount {
                amount: request.amount,
                reason: format!(
                    "amount exceeds the per-award maximum of {}",
                    self.limits.max_award_amount
                ),
            });
        }
        if let Some(key) = &request.idempotency_key {
            if key.trim().is_empty() || key.len() > self.limits.max_idempotency_key_bytes {
                return Err(BankError::InvalidRequest {
                    reason: format!(
                        "idempotency key must be 1..={} bytes",
                        self.limits.max_idempotency_key_bytes
                    ),
                });
            }
        }

        let limits = self.policy.resolve(request.role, request.currency);
        let credited_amount = limits.credited_amount(amount);
        if credited_amount == 0 {
            return Err(BankError::InvalidAmount {
                amount: request.amount,
                reason: "amount rounds to zero under the role multiplier".to_string(),
            });
        }

        let now = self.clock.now();
        let idempotency_key = match &request.idempotency_key {
            Some(key) => key.clone(),
            None => derive_content_key(
                &request.user_id,
                request.currency,
                &request.source,
                amount,
                now,
            ),
        };
        let transaction_id = transaction_id_for(&request.user_id, &idempotency_key);
        Ok(PreparedAward {
            request,
            limits,
            credited_amount,
            idempotency_key,
            transaction_id,
            now,
        })
    }

    /// Original outcome if this key was already applied to `account`.
    fn replay(
        &self,
        account: &Account,
        prepared: &PreparedAward<'_>,
    ) -> Result<Option<AwardResult>, BankError> {
        if let Some(receipt) = account.receipt(&prepared.transaction_id) {
            debug!(
                user_id = %account.user_id,
                transaction_id = %receipt.transaction_id,
                "duplicate award, returning recorded outcome"
            );
            self.record_ledger_entry(&account.user_id, receipt);
            return Ok(Some(AwardResult::from_receipt(receipt, true)));
        }

        // Receipt already rotated out of the account; the ledger still knows.
        let Some(transaction) = self
            .ledger
            .find(&account.user_id, &prepared.transaction_id)?
        else {
            return Ok(None);
        };
        debug!(
            user_id = %account.user_id,
            transaction_id = %transaction.transaction_id,
            "duplicate award found in ledger"
        );
        let (daily, weekly) = account
            .window(transaction.currency)
            .effective_totals(prepared.now);
        Ok(Some(AwardResult {
            transaction_id: transaction.transaction_id,
            currency: transaction.currency,
            credited_amount: transaction.amount,
            new_balance: account.balance(transaction.currency),
            new_daily_total: daily,
            new_weekly_total: weekly,
            bank_meter_progress: account.bank_meter_progress,
            replayed: true,
        }))
    }

    /// Builds the next account version, or rejects on caps.
    fn apply(
        &self,
        mut account: Account,
        expected_version: Option<u64>,
        prepared: &PreparedAward<'_>,
    ) -> Result<(Account, AwardReceipt), BankError> {
        let request = prepared.request;
        let currency = request.currency;

        let admission = match caps_enforcer::evaluate(
            account.window(currency),
            &prepared.limits,
            prepared.now,
            prepared.credited_amount,
        ) {
            CapDecision::Admitted(admission) => admission,
            CapDecision::Rejected(rejection) => {
                let suggested_max_award = prepared
                    .limits
                    .requested_for_credit(rejection.suggested_max_award)
                    .min(self.limits.max_award_amount);
                info!(
                    user_id = %request.user_id,
                    currency = %currency,
                    requested = request.amount,
                    suggested_max_award,
                    reason = %rejection.reason,
                    "award rejected by cap"
                );
                return Err(BankError::CapExceeded {
                    window: rejection.window,
                    suggested_max_award,
                });
            }
        };
        if admission.daily_rolled_over || admission.weekly_rolled_over {
            debug!(
                user_id = %request.user_id,
                currency = %currency,
                daily = admission.daily_rolled_over,
                weekly = admission.weekly_rolled_over,
                "cap window rolled over"
            );
        }

        admission.apply_to(account.window_mut(currency));
        account.credit(currency, prepared.credited_amount);
        account.role = request.role;
        account.bank_meter_progress = self.meter.recompute(&account);
        account.version = expected_version.unwrap_or(0).saturating_add(1);
        account.updated_at = prepared.now;

        let receipt = AwardReceipt {
            transaction_id: prepared.transaction_id.clone(),
            idempotency_key: prepared.idempotency_key.clone(),
            currency,
            amount: prepared.credited_amount,
            source: request.source.clone(),
            notes: request.notes.clone(),
            balance_after: account.balance(currency),
            daily_total_after: admission.new_daily_total,
            weekly_total_after: admission.new_weekly_total,
            bank_meter_after: account.bank_meter_progress,
            timestamp: prepared.now,
        };
        account.push_receipt(receipt.clone(), self.limits.idempotency_window);
        Ok((account, receipt))
    }

    /// Ledger append after the balance write. A failure here leaves the
    /// receipt on the account for the reconciler or a keyed retry to finish.
    fn record_ledger_entry(&self, user_id: &str, receipt: &AwardReceipt) {
        let transaction = Transaction::from_receipt(user_id, receipt);
        if let Err(err) = self.ledger.append_idempotent(&transaction) {
            warn!(
                user_id,
                transaction_id = %receipt.transaction_id,
                error = %err,
                "ledger append failed after balance update"
            );
        }
    }

    fn backoff(&self, attempt: u32) {
        let ceiling = self.retry.backoff_ceiling(attempt).as_millis() as u64;
        if ceiling == 0 {
            return;
        }
        let floor = ceiling / 2;
        let jitter = OsRng.next_u64() % (ceiling - floor + 1);
        thread::sleep(Duration::from_millis(floor + jitter));
    }
}

fn window_snapshot(window: &CapWindow, limits: &CapLimits, now: DateTime<Utc>) -> WindowSnapshot {
    let (daily_total, weekly_total) = window.effective_totals(now);
    WindowSnapshot {
        daily_total,
        weekly_total,
        daily_cap: limits.daily_cap,
        weekly_cap: limits.weekly_cap,
        daily_remaining: limits.daily_cap.saturating_sub(daily_total),
        weekly_remaining: limits.weekly_cap.saturating_sub(weekly_total),
    }
}
