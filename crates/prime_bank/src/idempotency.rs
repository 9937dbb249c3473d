//! Idempotency keys and the transaction ids derived from them.

use chrono::{DateTime, Utc};
use prime_bank_proto::{day_marker, Currency};
use sha2::{Digest, Sha256};

const CONTENT_KEY_PREFIX: &str = "content:v1:";
const TRANSACTION_ID_PREFIX: &str = "txn_";
const TRANSACTION_ID_HEX_CHARS: usize = 32;

pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Key for a request that arrived without one: identical awards for the same
/// user, currency, source and amount collapse within one UTC day.
pub fn derive_content_key(
    user_id: &str,
    currency: Currency,
    source: &str,
    amount: u64,
    now: DateTime<Utc>,
) -> String {
    let payload = format!(
        "{user_id}|{currency}|{source}|{amount}|{}",
        day_marker(now)
    );
    format!("{CONTENT_KEY_PREFIX}{}", sha256_hex(payload.as_bytes()))
}

/// Stable transaction id for `(user_id, idempotency_key)`.
pub fn transaction_id_for(user_id: &str, idempotency_key: &str) -> String {
    let digest = sha256_hex(format!("{user_id}|{idempotency_key}").as_bytes());
    format!(
        "{TRANSACTION_ID_PREFIX}{}",
        &digest[..TRANSACTION_ID_HEX_CHARS]
    )
}
