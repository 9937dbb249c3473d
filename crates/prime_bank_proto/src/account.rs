use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Caller-supplied role that selects a cap tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    Fan,
    Bestie,
    Creator,
    Unknown,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Fan => "Fan",
            Role::Bestie => "Bestie",
            Role::Creator => "Creator",
            Role::Unknown => "Unknown",
        }
    }

    /// Lenient parse used at the entry points; anything unrecognized maps to
    /// `Unknown` so it falls back to the most restrictive tier.
    pub fn parse_lenient(raw: &str) -> Self {
        raw.parse().unwrap_or(Role::Unknown)
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Unknown
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "fan" => Ok(Role::Fan),
            "bestie" => Ok(Role::Bestie),
            "creator" => Ok(Role::Creator),
            "unknown" => Ok(Role::Unknown),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// The two independently tracked currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Currency {
    PrimeCoins,
    CreatorCredits,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::PrimeCoins => "primeCoins",
            Currency::CreatorCredits => "creatorCredits",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "primeCoins" | "prime_coins" | "coins" => Ok(Currency::PrimeCoins),
            "creatorCredits" | "creator_credits" | "credits" => Ok(Currency::CreatorCredits),
            other => Err(format!("unknown currency: {other}")),
        }
    }
}

/// UTC calendar day of `now`.
pub fn day_marker(now: DateTime<Utc>) -> NaiveDate {
    now.date_naive()
}

/// Monday that opens the ISO week containing `now`.
pub fn week_marker(now: DateTime<Utc>) -> NaiveDate {
    let day = now.date_naive();
    day - Duration::days(i64::from(day.weekday().num_days_from_monday()))
}

/// Earning counters for one currency over the current day and week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapWindow {
    pub daily_total: u64,
    pub weekly_total: u64,
    pub last_daily_reset: NaiveDate,
    pub last_weekly_reset: NaiveDate,
}

impl CapWindow {
    pub fn opened_at(now: DateTime<Utc>) -> Self {
        Self {
            daily_total: 0,
            weekly_total: 0,
            last_daily_reset: day_marker(now),
            last_weekly_reset: week_marker(now),
        }
    }

    /// True once `now` falls on a later day than the stored marker. A marker
    /// ahead of `now` (a writer with a faster clock) is not stale.
    pub fn daily_is_stale(&self, now: DateTime<Utc>) -> bool {
        self.last_daily_reset < day_marker(now)
    }

    pub fn weekly_is_stale(&self, now: DateTime<Utc>) -> bool {
        self.last_weekly_reset < week_marker(now)
    }

    /// Markers to store after an award at `now`; they never move backwards.
    pub fn next_markers(&self, now: DateTime<Utc>) -> (NaiveDate, NaiveDate) {
        (
            self.last_daily_reset.max(day_marker(now)),
            self.last_weekly_reset.max(week_marker(now)),
        )
    }

    /// Totals as they stand at `now`, treating a stale window as empty.
    pub fn effective_totals(&self, now: DateTime<Utc>) -> (u64, u64) {
        let daily = if self.daily_is_stale(now) {
            0
        } else {
            self.daily_total
        };
        let weekly = if self.weekly_is_stale(now) {
            0
        } else {
            self.weekly_total
        };
        (daily, weekly)
    }
}

/// Record of an applied award, kept on the account so a retried request
/// with the same key is recognised inside the same conditional write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AwardReceipt {
    pub transaction_id: String,
    pub idempotency_key: String,
    pub currency: Currency,
    pub amount: u64,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub balance_after: u64,
    pub daily_total_after: u64,
    pub weekly_total_after: u64,
    pub bank_meter_after: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: String,
    pub role: Role,
    pub prime_coins: u64,
    pub creator_credits: u64,
    pub lifetime_prime_coins: u64,
    pub lifetime_creator_credits: u64,
    pub bank_meter_progress: u64,
    pub coin_window: CapWindow,
    pub credit_window: CapWindow,
    /// Zero means never persisted.
    pub version: u64,
    #[serde(default)]
    pub recent_awards: Vec<AwardReceipt>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn new(user_id: impl Into<String>, role: Role, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            role,
            prime_coins: 0,
            creator_credits: 0,
            lifetime_prime_coins: 0,
            lifetime_creator_credits: 0,
            bank_meter_progress: 0,
            coin_window: CapWindow::opened_at(now),
            credit_window: CapWindow::opened_at(now),
            version: 0,
            recent_awards: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn balance(&self, currency: Currency) -> u64 {
        match currency {
            Currency::PrimeCoins => self.prime_coins,
            Currency::CreatorCredits => self.creator_credits,
        }
    }

    pub fn lifetime(&self, currency: Currency) -> u64 {
        match currency {
            Currency::PrimeCoins => self.lifetime_prime_coins,
            Currency::CreatorCredits => self.lifetime_creator_credits,
        }
    }

    pub fn window(&self, currency: Currency) -> &CapWindow {
        match currency {
            Currency::PrimeCoins => &self.coin_window,
            Currency::CreatorCredits => &self.credit_window,
        }
    }

    pub fn window_mut(&mut self, currency: Currency) -> &mut CapWindow {
        match currency {
            Currency::PrimeCoins => &mut self.coin_window,
            Currency::CreatorCredits => &mut self.credit_window,
        }
    }

    /// Credits `amount` to both the spendable balance and the lifetime total.
    pub fn credit(&mut self, currency: Currency, amount: u64) {
        match currency {
            Currency::PrimeCoins => {
                self.prime_coins = self.prime_coins.saturating_add(amount);
                self.lifetime_prime_coins = self.lifetime_prime_coins.saturating_add(amount);
            }
            Currency::CreatorCredits => {
                self.creator_credits = self.creator_credits.saturating_add(amount);
                self.lifetime_creator_credits =
                    self.lifetime_creator_credits.saturating_add(amount);
            }
        }
    }

    pub fn receipt(&self, transaction_id: &str) -> Option<&AwardReceipt> {
        self.recent_awards
            .iter()
            .find(|receipt| receipt.transaction_id == transaction_id)
    }

    /// Appends a receipt and drops the oldest ones beyond `window`.
    pub fn push_receipt(&mut self, receipt: AwardReceipt, window: usize) {
        self.recent_awards.push(receipt);
        if self.recent_awards.len() > window {
            let excess = self.recent_awards.len() - window;
            self.recent_awards.drain(..excess);
        }
    }
}

/// Display totals and caps for one currency window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSnapshot {
    pub daily_total: u64,
    pub weekly_total: u64,
    pub daily_cap: u64,
    pub weekly_cap: u64,
    pub daily_remaining: u64,
    pub weekly_remaining: u64,
}

/// Read-only projection returned by `GetAccount`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub user_id: String,
    pub role: Role,
    pub prime_coins: u64,
    pub creator_credits: u64,
    pub lifetime_prime_coins: u64,
    pub lifetime_creator_credits: u64,
    pub bank_meter_progress: u64,
    pub prime_coin_caps: WindowSnapshot,
    pub creator_credit_caps: WindowSnapshot,
    pub updated_at: DateTime<Utc>,
}
