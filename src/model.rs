//! Core data model.
//!
//! An account pairs a chat identity with ticketing credentials. Everything
//! else here is ephemeral: built during one account's pass through a tick
//! and dropped at the end of it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// A registered account, as persisted by the config store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Store-assigned row id.
    pub id: Uuid,

    /// Chat-platform user id of the account owner.
    pub account_id: String,

    /// Chat-platform guild the account was registered in.
    pub guild_id: String,

    /// Ticketing service host, either a bare hostname or a full base URL.
    pub host: String,

    /// Ticketing service username (also the worklog author we look for).
    pub username: String,

    /// Encrypted API token. Legacy rows may still hold plaintext.
    pub token_ciphertext: String,

    /// Overrides the default discovery query when set.
    pub query: Option<String>,

    /// Paused accounts are excluded from ticks.
    pub paused: bool,

    /// Daily effort budget in whole hours.
    pub budget_hours: u32,

    pub created_at: DateTime<Utc>,
}

pub const DEFAULT_BUDGET_HOURS: u32 = 8;

/// Builder for registering a new account. The token is plaintext here and
/// is encrypted by the store before it is written.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub(crate) account_id: String,
    pub(crate) guild_id: String,
    pub(crate) host: String,
    pub(crate) username: String,
    pub(crate) token: String,
    pub(crate) query: Option<String>,
    pub(crate) budget_hours: u32,
}

impl NewAccount {
    pub fn new(
        account_id: impl Into<String>,
        guild_id: impl Into<String>,
        host: impl Into<String>,
        username: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            guild_id: guild_id.into(),
            host: host.into(),
            username: username.into(),
            token: token.into(),
            query: None,
            budget_hours: DEFAULT_BUDGET_HOURS,
        }
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn budget_hours(mut self, hours: u32) -> Self {
        self.budget_hours = hours;
        self
    }

    /// Materialise the account with an already-encoded token.
    pub(crate) fn into_account(self, token_ciphertext: String) -> AccountConfig {
        AccountConfig {
            id: Uuid::new_v4(),
            account_id: self.account_id,
            guild_id: self.guild_id,
            host: self.host,
            username: self.username,
            token_ciphertext,
            query: self.query,
            paused: false,
            budget_hours: self.budget_hours,
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Work items and worklogs
// ---------------------------------------------------------------------------

/// A ticket the account worked on during the target day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Service-internal id, used when committing worklogs.
    pub id: String,
    /// Human key, e.g. `PROJ-123`.
    pub key: String,
    pub summary: String,
    pub assignee: String,
}

/// An existing worklog on a work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorklogEntry {
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub author_account_id: Option<String>,
    pub seconds: u64,
    pub started: Option<String>,
}

impl WorklogEntry {
    /// Whether this entry was written by `username`. Jira identifies users
    /// by name on server installs and by email on cloud sites.
    pub fn authored_by(&self, username: &str) -> bool {
        [&self.author_name, &self.author_email, &self.author_account_id]
            .into_iter()
            .flatten()
            .any(|candidate| candidate.eq_ignore_ascii_case(username))
    }
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

/// How a daily budget is split across work items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationPolicy {
    /// Equal shares, remainder seconds handed to the first items.
    #[default]
    Evenly,
    /// Randomly weighted shares on a five-minute grid.
    Fairly,
}

impl std::fmt::Display for AllocationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AllocationPolicy::Evenly => "evenly",
            AllocationPolicy::Fairly => "fairly",
        };
        write!(f, "{s}")
    }
}

impl FromStr for AllocationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "evenly" => Ok(AllocationPolicy::Evenly),
            "fairly" => Ok(AllocationPolicy::Fairly),
            other => Err(format!("unknown allocation policy: {other}")),
        }
    }
}

/// A work item paired with the seconds it will be credited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllocationResult {
    pub item: WorkItem,
    pub seconds: u64,
    /// Rendered duration, e.g. `1h 1m`.
    pub human: String,
}
