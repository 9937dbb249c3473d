use std::collections::BTreeMap;

use prime_bank_proto::{BankError, Currency, Role};
use serde::{Deserialize, Serialize};

pub const MULTIPLIER_ONE_BPS: u32 = 10_000;

const DEFAULT_FAN_DAILY_COIN_CAP: u64 = 50;
const DEFAULT_FAN_WEEKLY_COIN_CAP: u64 = 250;
const DEFAULT_BESTIE_DAILY_COIN_CAP: u64 = 100;
const DEFAULT_BESTIE_WEEKLY_COIN_CAP: u64 = 500;
const DEFAULT_CREATOR_DAILY_COIN_CAP: u64 = 200;
const DEFAULT_CREATOR_WEEKLY_COIN_CAP: u64 = 1_000;
const DEFAULT_CREATOR_DAILY_CREDIT_CAP: u64 = 500;
const DEFAULT_CREATOR_WEEKLY_CREDIT_CAP: u64 = 2_500;

fn default_multiplier_bps() -> u32 {
    MULTIPLIER_ONE_BPS
}

/// One row of the cap table as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCaps {
    pub daily_cap: u64,
    pub weekly_cap: u64,
    #[serde(default = "default_multiplier_bps")]
    pub multiplier_bps: u32,
}

impl RoleCaps {
    pub const fn new(daily_cap: u64, weekly_cap: u64) -> Self {
        Self {
            daily_cap,
            weekly_cap,
            multiplier_bps: MULTIPLIER_ONE_BPS,
        }
    }
}

/// Per-currency cap tables keyed by role name (`Fan`, `Bestie`, ...).
///
/// A currency table given in configuration replaces the default table for
/// that currency as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapPolicyTable {
    pub prime_coins: BTreeMap<String, RoleCaps>,
    pub creator_credits: BTreeMap<String, RoleCaps>,
}

impl Default for CapPolicyTable {
    fn default() -> Self {
        let prime_coins = BTreeMap::from([
            (
                Role::Fan.as_str().to_string(),
                RoleCaps::new(DEFAULT_FAN_DAILY_COIN_CAP, DEFAULT_FAN_WEEKLY_COIN_CAP),
            ),
            (
                Role::Bestie.as_str().to_string(),
                RoleCaps::new(DEFAULT_BESTIE_DAILY_COIN_CAP, DEFAULT_BESTIE_WEEKLY_COIN_CAP),
            ),
            (
                Role::Creator.as_str().to_string(),
                RoleCaps::new(
                    DEFAULT_CREATOR_DAILY_COIN_CAP,
                    DEFAULT_CREATOR_WEEKLY_COIN_CAP,
                ),
            ),
        ]);
        let creator_credits = BTreeMap::from([
            (Role::Fan.as_str().to_string(), RoleCaps::new(0, 0)),
            (Role::Bestie.as_str().to_string(), RoleCaps::new(0, 0)),
            (
                Role::Creator.as_str().to_string(),
                RoleCaps::new(
                    DEFAULT_CREATOR_DAILY_CREDIT_CAP,
                    DEFAULT_CREATOR_WEEKLY_CREDIT_CAP,
                ),
            ),
        ]);
        Self {
            prime_coins,
            creator_credits,
        }
    }
}

impl CapPolicyTable {
    pub fn rows(&self, currency: Currency) -> &BTreeMap<String, RoleCaps> {
        match currency {
            Currency::PrimeCoins => &self.prime_coins,
            Currency::CreatorCredits => &self.creator_credits,
        }
    }

    pub fn validate(&self) -> Result<(), BankError> {
        for currency in [Currency::PrimeCoins, Currency::CreatorCredits] {
            for (role, caps) in self.rows(currency) {
                role.parse::<Role>().map_err(|err| {
                    BankError::Config(format!("caps.{currency}: {err}"))
                })?;
                if caps.multiplier_bps == 0 {
                    return Err(BankError::Config(format!(
                        "caps.{currency}.{role}: multiplier_bps must be positive"
                    )));
                }
                if caps.daily_cap > caps.weekly_cap {
                    return Err(BankError::Config(format!(
                        "caps.{currency}.{role}: daily_cap {} exceeds weekly_cap {}",
                        caps.daily_cap, caps.weekly_cap
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Resolved limits for one award.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapLimits {
    pub daily_cap: u64,
    pub weekly_cap: u64,
    pub multiplier_bps: u32,
}

impl CapLimits {
    /// Admits nothing. Used when a currency has no configured rows at all.
    pub const DENY_ALL: CapLimits = CapLimits {
        daily_cap: 0,
        weekly_cap: 0,
        multiplier_bps: MULTIPLIER_ONE_BPS,
    };

    /// Amount that lands on the balance for a requested `amount`.
    pub fn credited_amount(&self, amount: u64) -> u64 {
        let scaled = u128::from(amount) * u128::from(self.multiplier_bps)
            / u128::from(MULTIPLIER_ONE_BPS);
        u64::try_from(scaled).unwrap_or(u64::MAX)
    }

    /// Largest requested amount whose credited amount fits in `room`.
    pub fn requested_for_credit(&self, room: u64) -> u64 {
        if self.multiplier_bps == 0 || room == 0 {
            return 0;
        }
        let requested = ((u128::from(room) + 1) * u128::from(MULTIPLIER_ONE_BPS) - 1)
            / u128::from(self.multiplier_bps);
        u64::try_from(requested).unwrap_or(u64::MAX)
    }
}

impl From<RoleCaps> for CapLimits {
    fn from(caps: RoleCaps) -> Self {
        Self {
            daily_cap: caps.daily_cap,
            weekly_cap: caps.weekly_cap,
            multiplier_bps: caps.multiplier_bps,
        }
    }
}

/// Role to cap lookup. Roles without a row fall back to the most restrictive
/// row of the same currency.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CapPolicy {
    table: CapPolicyTable,
}

impl CapPolicy {
    pub fn new(table: CapPolicyTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &CapPolicyTable {
        &self.table
    }

    pub fn resolve(&self, role: Role, currency: Currency) -> CapLimits {
        let rows = self.table.rows(currency);
        if let Some(caps) = rows.get(role.as_str()) {
            return CapLimits::from(*caps);
        }
        rows.values()
            .min_by_key(|caps| (caps.daily_cap, caps.weekly_cap, caps.multiplier_bps))
            .map(|caps| CapLimits::from(*caps))
            .unwrap_or(CapLimits::DENY_ALL)
    }
}
