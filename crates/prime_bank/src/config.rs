use std::fs;
use std::path::Path;
use std::time::Duration;

use prime_bank_proto::BankError;
use serde::{Deserialize, Serialize};

use crate::cap_policy::CapPolicyTable;

const DEFAULT_METER_THRESHOLD: u64 = 100;
const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 4;
const DEFAULT_RETRY_BASE_BACKOFF_MS: u64 = 2;
const DEFAULT_RETRY_MAX_BACKOFF_MS: u64 = 50;
const DEFAULT_MAX_AWARD_AMOUNT: u64 = 10_000;
const DEFAULT_IDEMPOTENCY_WINDOW: usize = 256;
const MAX_IDEMPOTENCY_KEY_BYTES: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    /// Lifetime Prime Coins per meter point.
    pub threshold: u64,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_METER_THRESHOLD,
        }
    }
}

/// Bounded retry for the conditional account write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_MAX_ATTEMPTS,
            base_backoff_ms: DEFAULT_RETRY_BASE_BACKOFF_MS,
            max_backoff_ms: DEFAULT_RETRY_MAX_BACKOFF_MS,
        }
    }
}

impl RetryConfig {
    /// Upper bound of the backoff before the retry following `attempt`
    /// (zero-based), doubling from the base up to the max.
    pub fn backoff_ceiling(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(20)).unwrap_or(u64::MAX);
        let millis = self
            .base_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwardLimits {
    pub max_award_amount: u64,
    /// Receipts kept on each account for duplicate detection.
    pub idempotency_window: usize,
    pub max_idempotency_key_bytes: usize,
}

impl Default for AwardLimits {
    fn default() -> Self {
        Self {
            max_award_amount: DEFAULT_MAX_AWARD_AMOUNT,
            idempotency_window: DEFAULT_IDEMPOTENCY_WINDOW,
            max_idempotency_key_bytes: MAX_IDEMPOTENCY_KEY_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BankConfig {
    pub caps: CapPolicyTable,
    pub meter: MeterConfig,
    pub retry: RetryConfig,
    pub limits: AwardLimits,
}

impl BankConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BankError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            BankError::Config(format!("read config {} failed: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, BankError> {
        let config: BankConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, BankError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), BankError> {
        self.caps.validate()?;
        if self.meter.threshold == 0 {
            return Err(BankError::Config(
                "meter.threshold must be positive".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(BankError::Config(
                "retry.max_attempts must be positive".to_string(),
            ));
        }
        if self.retry.base_backoff_ms > self.retry.max_backoff_ms {
            return Err(BankError::Config(format!(
                "retry.base_backoff_ms {} exceeds retry.max_backoff_ms {}",
                self.retry.base_backoff_ms, self.retry.max_backoff_ms
            )));
        }
        if self.limits.max_award_amount == 0 || self.limits.max_award_amount > i64::MAX as u64 {
            return Err(BankError::Config(
                "limits.max_award_amount must be in 1..=i64::MAX".to_string(),
            ));
        }
        if self.limits.idempotency_window == 0 {
            return Err(BankError::Config(
                "limits.idempotency_window must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
