use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use prime_bank_proto::{Account, BankError, Transaction};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{lock, sort_history, AccountStore, LedgerStore, SwapOutcome, UserSlots};

const STORE_VERSION: u64 = 1;
const ACCOUNTS_DIR: &str = "accounts";
const LEDGER_DIR: &str = "ledger";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LedgerFile {
    version: u64,
    user_id: String,
    transactions: Vec<Transaction>,
}

impl LedgerFile {
    fn empty(user_id: &str) -> Self {
        Self {
            version: STORE_VERSION,
            user_id: user_id.to_string(),
            transactions: Vec::new(),
        }
    }
}

/// JSON-file store: one file per account and one ledger file per user.
///
/// Files are named by the SHA-256 of the user id, so any id length maps to a
/// fixed-size name; the id itself is stored inside each record. Writes go
/// through a temp file and a rename under a per-user guard. The conditional
/// write is atomic within one process only; run a single writer process per
/// root.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
    accounts_dir: PathBuf,
    ledger_dir: PathBuf,
    write_guards: Arc<UserSlots<()>>,
}

impl LocalFileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref().to_path_buf();
        let accounts_dir = root.join(ACCOUNTS_DIR);
        let ledger_dir = root.join(LEDGER_DIR);
        Self {
            root,
            accounts_dir,
            ledger_dir,
            write_guards: Arc::new(UserSlots::new("file store")),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ensure_dirs(&self) -> Result<(), BankError> {
        fs::create_dir_all(&self.accounts_dir)?;
        fs::create_dir_all(&self.ledger_dir)?;
        Ok(())
    }

    fn account_path(&self, user_id: &str) -> PathBuf {
        self.accounts_dir.join(file_name_for(user_id))
    }

    fn ledger_path(&self, user_id: &str) -> PathBuf {
        self.ledger_dir.join(file_name_for(user_id))
    }

    fn read_account(&self, user_id: &str) -> Result<Option<Account>, BankError> {
        let path = self.account_path(user_id);
        if !path.exists() {
            return Ok(None);
        }
        let account: Account = read_json_from_path(&path)?;
        if account.user_id != user_id {
            return Err(BankError::Store(format!(
                "account file {} belongs to another user",
                path.display()
            )));
        }
        Ok(Some(account))
    }

    fn read_ledger(&self, user_id: &str) -> Result<LedgerFile, BankError> {
        let path = self.ledger_path(user_id);
        if !path.exists() {
            return Ok(LedgerFile::empty(user_id));
        }
        let file: LedgerFile = read_json_from_path(&path)?;
        if file.version != STORE_VERSION {
            return Err(BankError::Store(format!(
                "ledger file version mismatch: expected={STORE_VERSION} found={}",
                file.version
            )));
        }
        if file.user_id != user_id {
            return Err(BankError::Store(format!(
                "ledger file {} belongs to another user",
                path.display()
            )));
        }
        Ok(file)
    }
}

impl AccountStore for LocalFileStore {
    fn load(&self, user_id: &str) -> Result<Option<Account>, BankError> {
        self.read_account(user_id)
    }

    fn compare_and_swap(
        &self,
        expected_version: Option<u64>,
        next: &Account,
    ) -> Result<SwapOutcome, BankError> {
        let slot = self.write_guards.slot(&next.user_id)?;
        let _guard = lock(&slot, "file store")?;
        let current_version = self
            .read_account(&next.user_id)?
            .map(|account| account.version);
        if current_version != expected_version {
            return Ok(SwapOutcome::Conflict { current_version });
        }
        self.ensure_dirs()?;
        write_json_atomic(next, &self.account_path(&next.user_id))?;
        debug!(user_id = %next.user_id, version = next.version, "account written");
        Ok(SwapOutcome::Applied)
    }

    fn user_ids(&self) -> Result<Vec<String>, BankError> {
        if !self.accounts_dir.exists() {
            return Ok(Vec::new());
        }
        let mut user_ids = Vec::new();
        for entry in fs::read_dir(&self.accounts_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let account: Account = read_json_from_path(&path)?;
            user_ids.push(account.user_id);
        }
        user_ids.sort();
        Ok(user_ids)
    }
}

impl LedgerStore for LocalFileStore {
    fn insert_if_absent(&self, transaction: &Transaction) -> Result<(), BankError> {
        let slot = self.write_guards.slot(&transaction.user_id)?;
        let _guard = lock(&slot, "file store")?;
        let mut file = self.read_ledger(&transaction.user_id)?;
        if file
            .transactions
            .iter()
            .any(|existing| existing.transaction_id == transaction.transaction_id)
        {
            return Err(BankError::DuplicateTransaction {
                transaction_id: transaction.transaction_id.clone(),
            });
        }
        file.transactions.push(transaction.clone());
        sort_history(&mut file.transactions);
        self.ensure_dirs()?;
        write_json_atomic(&file, &self.ledger_path(&transaction.user_id))?;
        debug!(
            user_id = %transaction.user_id,
            transaction_id = %transaction.transaction_id,
            "ledger entry appended"
        );
        Ok(())
    }

    fn get(
        &self,
        user_id: &str,
        transaction_id: &str,
    ) -> Result<Option<Transaction>, BankError> {
        let file = self.read_ledger(user_id)?;
        Ok(file
            .transactions
            .into_iter()
            .find(|transaction| transaction.transaction_id == transaction_id))
    }

    fn list(&self, user_id: &str) -> Result<Vec<Transaction>, BankError> {
        let mut transactions = self.read_ledger(user_id)?.transactions;
        sort_history(&mut transactions);
        Ok(transactions)
    }
}

fn file_name_for(user_id: &str) -> String {
    format!("{}.json", hex::encode(Sha256::digest(user_id.as_bytes())))
}

fn write_json_atomic<T: Serialize>(value: &T, path: &Path) -> Result<(), BankError> {
    let tmp = path.with_extension("tmp");
    let data = serde_json::to_vec_pretty(value)?;
    fs::write(&tmp, data)?;
    fs::rename(tmp, path)?;
    Ok(())
}

fn read_json_from_path<T: DeserializeOwned>(path: &Path) -> Result<T, BankError> {
    let data = fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}
