use prime_bank_proto::Account;

use crate::config::MeterConfig;

/// Derives bank meter progress from lifetime earned Prime Coins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BankMeterCalculator {
    threshold: u64,
}

impl BankMeterCalculator {
    pub fn new(config: &MeterConfig) -> Self {
        Self {
            threshold: config.threshold.max(1),
        }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Meter value for `account`, never below the stored value.
    pub fn recompute(&self, account: &Account) -> u64 {
        let computed = account.lifetime_prime_coins / self.threshold;
        account.bank_meter_progress.max(computed)
    }
}

impl Default for BankMeterCalculator {
    fn default() -> Self {
        Self::new(&MeterConfig::default())
    }
}
