use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Duration, TimeZone, Utc};
use prime_bank_proto::{Account, BankError, Currency, Role, Transaction, TransactionType};

use super::*;

fn temp_dir(prefix: &str) -> PathBuf {
    let unique = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!("prime-bank-store-{prefix}-{unique}"))
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 16, 9, 0, 0)
        .single()
        .expect("valid time")
}

fn transaction(user_id: &str, transaction_id: &str, offset_secs: i64) -> Transaction {
    Transaction {
        user_id: user_id.to_string(),
        timestamp: base_time() + Duration::seconds(offset_secs),
        transaction_id: transaction_id.to_string(),
        kind: TransactionType::Earn,
        currency: Currency::PrimeCoins,
        amount: 5,
        source: "challenge_completed".to_string(),
        notes: None,
        idempotency_key: format!("key-{transaction_id}"),
    }
}

fn exercise_compare_and_swap(store: &dyn AccountStore) {
    let mut account = Account::new("alice", Role::Bestie, base_time());
    account.version = 1;
    assert_eq!(
        store.compare_and_swap(None, &account).expect("insert"),
        SwapOutcome::Applied
    );
    assert_eq!(
        store.compare_and_swap(None, &account).expect("second insert"),
        SwapOutcome::Conflict {
            current_version: Some(1)
        }
    );

    let mut next = account.clone();
    next.prime_coins = 10;
    next.version = 2;
    assert!(store
        .compare_and_swap(Some(1), &next)
        .expect("swap")
        .is_applied());

    let mut stale = account.clone();
    stale.prime_coins = 99;
    stale.version = 2;
    assert_eq!(
        store.compare_and_swap(Some(1), &stale).expect("stale swap"),
        SwapOutcome::Conflict {
            current_version: Some(2)
        }
    );

    let loaded = store.load("alice").expect("load").expect("account");
    assert_eq!(loaded.prime_coins, 10);
    assert_eq!(loaded.version, 2);
    assert!(store.load("bob").expect("load missing").is_none());
    assert_eq!(store.user_ids().expect("user ids"), vec!["alice".to_string()]);
}

fn exercise_ledger(store: &dyn LedgerStore) {
    store
        .insert_if_absent(&transaction("alice", "txn_b", 10))
        .expect("insert b");
    store
        .insert_if_absent(&transaction("alice", "txn_a", 20))
        .expect("insert a");
    store
        .insert_if_absent(&transaction("bob", "txn_a", 0))
        .expect("same id for another user");

    let duplicate = store.insert_if_absent(&transaction("alice", "txn_b", 30));
    assert_eq!(
        duplicate,
        Err(BankError::DuplicateTransaction {
            transaction_id: "txn_b".to_string()
        })
    );

    let history = store.list("alice").expect("list");
    let ids: Vec<_> = history
        .iter()
        .map(|entry| entry.transaction_id.as_str())
        .collect();
    assert_eq!(ids, vec!["txn_b", "txn_a"]);
    assert_eq!(history[0].timestamp, base_time() + Duration::seconds(10));

    assert!(store.get("alice", "txn_a").expect("get").is_some());
    assert!(store.get("alice", "txn_missing").expect("get").is_none());
    assert!(store.list("carol").expect("list empty").is_empty());
}

#[test]
fn in_memory_compare_and_swap_checks_version() {
    exercise_compare_and_swap(&InMemoryBankStore::new());
}

#[test]
fn in_memory_ledger_rejects_duplicates_and_orders_history() {
    exercise_ledger(&InMemoryBankStore::new());
}

#[test]
fn local_file_compare_and_swap_checks_version() {
    let dir = temp_dir("cas");
    exercise_compare_and_swap(&LocalFileStore::new(&dir));
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn local_file_ledger_rejects_duplicates_and_orders_history() {
    let dir = temp_dir("ledger");
    exercise_ledger(&LocalFileStore::new(&dir));
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn local_file_store_survives_reopen() {
    let dir = temp_dir("reopen");
    {
        let store = LocalFileStore::new(&dir);
        let mut account = Account::new("user/with:odd chars", Role::Creator, base_time());
        account.version = 1;
        account.creator_credits = 42;
        assert!(store
            .compare_and_swap(None, &account)
            .expect("insert")
            .is_applied());
        store
            .insert_if_absent(&transaction("user/with:odd chars", "txn_1", 0))
            .expect("append");
    }

    let reopened = LocalFileStore::new(&dir);
    let account = reopened
        .load("user/with:odd chars")
        .expect("load")
        .expect("account");
    assert_eq!(account.creator_credits, 42);
    assert_eq!(
        reopened.user_ids().expect("user ids"),
        vec!["user/with:odd chars".to_string()]
    );
    assert_eq!(reopened.list("user/with:odd chars").expect("list").len(), 1);
    let _ = std::fs::remove_dir_all(dir);
}

#[test]
fn concurrent_swaps_never_lose_increments() {
    let store = Arc::new(InMemoryBankStore::new());
    let mut seed = Account::new("hot", Role::Fan, base_time());
    seed.version = 1;
    assert!(store.compare_and_swap(None, &seed).expect("seed").is_applied());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let mut applied = 0;
                while applied < 25 {
                    let current = store.load("hot").expect("load").expect("account");
                    let mut next = current.clone();
                    next.prime_coins += 1;
                    next.version += 1;
                    if store
                        .compare_and_swap(Some(current.version), &next)
                        .expect("swap")
                        .is_applied()
                    {
                        applied += 1;
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().expect("join");
    }

    let account = store.load("hot").expect("load").expect("account");
    assert_eq!(account.prime_coins, 200);
    assert_eq!(account.version, 201);
}

#[test]
fn forget_transaction_removes_entry() {
    let store = InMemoryBankStore::new();
    store
        .insert_if_absent(&transaction("alice", "txn_1", 0))
        .expect("insert");
    assert!(store.forget_transaction("alice", "txn_1"));
    assert!(!store.forget_transaction("alice", "txn_1"));
    assert!(store.list("alice").expect("list").is_empty());
}

#[test]
fn user_locks_are_independent() {
    let slots: UserSlots<()> = UserSlots::new("test");
    let alice = slots.slot("alice").expect("alice slot");
    let _held = alice.lock().expect("lock alice");

    let bob = slots.slot("bob").expect("bob slot");
    assert!(bob.try_lock().is_ok());
    let alice_again = slots.slot("alice").expect("alice slot again");
    assert!(alice_again.try_lock().is_err());
    assert!(slots.existing("carol").expect("lookup").is_none());
}

#[test]
fn awards_for_different_users_swap_in_parallel() {
    let store = Arc::new(InMemoryBankStore::new());
    let handles: Vec<_> = (0..8)
        .map(|index| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let mut account = Account::new(format!("user-{index}"), Role::Fan, base_time());
                account.version = 1;
                store.compare_and_swap(None, &account).expect("insert")
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().expect("join"), SwapOutcome::Applied);
    }
    assert_eq!(store.user_ids().expect("user ids").len(), 8);
}

#[test]
fn local_file_store_accepts_long_user_ids() {
    let dir = temp_dir("long-id");
    let store = LocalFileStore::new(&dir);
    let user_id = "u".repeat(200);
    let mut account = Account::new(user_id.clone(), Role::Creator, base_time());
    account.version = 1;
    assert!(store
        .compare_and_swap(None, &account)
        .expect("insert long id")
        .is_applied());
    store
        .insert_if_absent(&transaction(&user_id, "txn_long", 0))
        .expect("append long id");

    let reopened = LocalFileStore::new(&dir);
    assert_eq!(
        reopened.load(&user_id).expect("load").expect("account").user_id,
        user_id
    );
    assert_eq!(reopened.user_ids().expect("user ids"), vec![user_id.clone()]);
    assert_eq!(reopened.list(&user_id).expect("list").len(), 1);
    let _ = std::fs::remove_dir_all(dir);
}
