//! Account rows: registration, listing, pausing.
//!
//! Tokens are encoded before they are written; rows are decoded into
//! [`AccountConfig`] after they are read. Neither stage decrypts.

use crate::cipher::{self, CredentialCipher};
use crate::db::Db;
use crate::error::{Error, Result};
use crate::model::{AccountConfig, NewAccount};
use crate::store::ConfigStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

const SELECT_COLUMNS: &str = "SELECT id, account_id, guild_id, host, username, token_ciphertext,
        query, paused, budget_hours, created_at
 FROM accounts";

impl Db {
    /// Register an account. Re-registering the same user in the same guild
    /// replaces the stored settings and un-pauses the account.
    pub async fn add_account(
        &self,
        new: NewAccount,
        cipher: &dyn CredentialCipher,
    ) -> Result<AccountConfig> {
        let token = cipher::encode_credential(cipher, &new.token)?;
        let account = new.into_account(token);
        let budget = i32::try_from(account.budget_hours)
            .map_err(|_| Error::validation("budget_hours", "too large"))?;

        let row: AccountRow = sqlx::query_as(
            "INSERT INTO accounts (id, account_id, guild_id, host, username, token_ciphertext, query, paused, budget_hours, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, $8, $9)
             ON CONFLICT (account_id, guild_id) DO UPDATE SET
                host = EXCLUDED.host,
                username = EXCLUDED.username,
                token_ciphertext = EXCLUDED.token_ciphertext,
                query = EXCLUDED.query,
                budget_hours = EXCLUDED.budget_hours,
                paused = FALSE
             RETURNING id, account_id, guild_id, host, username, token_ciphertext,
                       query, paused, budget_hours, created_at",
        )
        .bind(account.id)
        .bind(&account.account_id)
        .bind(&account.guild_id)
        .bind(&account.host)
        .bind(&account.username)
        .bind(&account.token_ciphertext)
        .bind(&account.query)
        .bind(budget)
        .bind(account.created_at)
        .fetch_one(self.pool())
        .await?;
        Ok(row.into())
    }

    /// Every account, paused or not.
    pub async fn list_accounts(&self) -> Result<Vec<AccountConfig>> {
        let rows: Vec<AccountRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} ORDER BY created_at"))
                .fetch_all(self.pool())
                .await?;
        Ok(rows.into_iter().map(AccountConfig::from).collect())
    }

    pub async fn set_paused(&self, id: Uuid, paused: bool) -> Result<()> {
        let done = sqlx::query("UPDATE accounts SET paused = $2 WHERE id = $1")
            .bind(id)
            .bind(paused)
            .execute(self.pool())
            .await?;
        if done.rows_affected() == 0 {
            return Err(Error::Other(format!("account not found: {id}")));
        }
        Ok(())
    }

    pub async fn remove_account(&self, id: Uuid) -> Result<()> {
        let done = sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await?;
        if done.rows_affected() == 0 {
            return Err(Error::Other(format!("account not found: {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for Db {
    async fn list_enabled(&self) -> Result<Vec<AccountConfig>> {
        let rows: Vec<AccountRow> = sqlx::query_as(&format!(
            "{SELECT_COLUMNS} WHERE NOT paused ORDER BY created_at"
        ))
        .fetch_all(self.pool())
        .await?;
        Ok(rows.into_iter().map(AccountConfig::from).collect())
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    account_id: String,
    guild_id: String,
    host: String,
    username: String,
    token_ciphertext: String,
    query: Option<String>,
    paused: bool,
    budget_hours: i32,
    created_at: DateTime<Utc>,
}

impl From<AccountRow> for AccountConfig {
    fn from(row: AccountRow) -> Self {
        Self {
            id: row.id,
            account_id: row.account_id,
            guild_id: row.guild_id,
            host: row.host,
            username: row.username,
            token_ciphertext: row.token_ciphertext,
            query: row.query,
            paused: row.paused,
            // Negative budgets become 0 and are rejected at validation.
            budget_hours: u32::try_from(row.budget_hours).unwrap_or(0),
            created_at: row.created_at,
        }
    }
}
