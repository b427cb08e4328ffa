//! Account configuration store seam, plus an in-process implementation.

use crate::cipher::{self, CredentialCipher};
use crate::error::{Error, Result};
use crate::model::{AccountConfig, NewAccount};
use async_trait::async_trait;
use std::sync::Mutex;
use uuid::Uuid;

#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// All accounts that are not paused, oldest first.
    async fn list_enabled(&self) -> Result<Vec<AccountConfig>>;
}

/// Accounts held in memory, for tests and embedding without Postgres.
#[derive(Default)]
pub struct MemoryStore {
    accounts: Mutex<Vec<AccountConfig>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with accounts exactly as given (no encoding).
    pub fn with_accounts(accounts: Vec<AccountConfig>) -> Self {
        Self {
            accounts: Mutex::new(accounts),
        }
    }

    /// Register an account, encrypting its token first.
    pub fn add_account(
        &self,
        new: NewAccount,
        cipher: &dyn CredentialCipher,
    ) -> Result<AccountConfig> {
        let token = cipher::encode_credential(cipher, &new.token)?;
        let account = new.into_account(token);
        self.lock()?.push(account.clone());
        Ok(account)
    }

    pub fn set_paused(&self, id: Uuid, paused: bool) -> Result<()> {
        let mut accounts = self.lock()?;
        let account = accounts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| Error::Other(format!("account not found: {id}")))?;
        account.paused = paused;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<AccountConfig>>> {
        self.accounts
            .lock()
            .map_err(|_| Error::Other("account store lock poisoned".to_string()))
    }
}

#[async_trait]
impl ConfigStore for MemoryStore {
    async fn list_enabled(&self) -> Result<Vec<AccountConfig>> {
        Ok(self
            .lock()?
            .iter()
            .filter(|a| !a.paused)
            .cloned()
            .collect())
    }
}
