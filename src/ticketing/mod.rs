//! Ticketing service seam.
//!
//! The engine only needs three calls: find the tickets a user worked on,
//! read a ticket's worklogs, and add a worklog. [`jira::JiraClient`] is the
//! production implementation.

pub mod jira;

use crate::error::Result;
use crate::model::{WorkItem, WorklogEntry};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::Url;
use secrecy::SecretString;

pub use jira::JiraClient;

/// Connection details for one account, built fresh per tick.
pub struct Session<'a> {
    pub base_url: &'a Url,
    pub username: &'a str,
    pub token: &'a SecretString,
}

#[async_trait]
pub trait TicketingApi: Send + Sync {
    /// Run `query` and return the matching tickets.
    async fn search(&self, session: &Session<'_>, query: &str) -> Result<Vec<WorkItem>>;

    /// Worklogs on `item_key` that started at or after `since`.
    async fn list_worklogs(
        &self,
        session: &Session<'_>,
        item_key: &str,
        since: NaiveDate,
    ) -> Result<Vec<WorklogEntry>>;

    /// Record `seconds` of effort on `item_id`, starting at `started`.
    async fn commit_worklog(
        &self,
        session: &Session<'_>,
        item_id: &str,
        seconds: u64,
        started: DateTime<Utc>,
    ) -> Result<()>;
}
