//! Jira REST v2 client: issue search, worklog listing, worklog creation.

use super::{Session, TicketingApi};
use crate::error::{Error, Result};
use crate::model::{WorkItem, WorklogEntry};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

const PAGE_SIZE: u32 = 100;
const STARTED_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

pub struct JiraClient {
    http: Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchPage {
    #[serde(default)]
    issues: Vec<Issue>,
    #[serde(default)]
    total: u32,
}

#[derive(Debug, Deserialize)]
struct Issue {
    id: String,
    key: String,
    #[serde(default)]
    fields: IssueFields,
}

#[derive(Debug, Default, Deserialize)]
struct IssueFields {
    summary: Option<String>,
    assignee: Option<User>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct User {
    name: Option<String>,
    email_address: Option<String>,
    account_id: Option<String>,
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WorklogPage {
    #[serde(default)]
    worklogs: Vec<Worklog>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Worklog {
    author: Option<User>,
    #[serde(default)]
    time_spent_seconds: u64,
    started: Option<String>,
}

impl From<Issue> for WorkItem {
    fn from(issue: Issue) -> Self {
        WorkItem {
            id: issue.id,
            key: issue.key,
            summary: issue.fields.summary.unwrap_or_default(),
            assignee: issue
                .fields
                .assignee
                .and_then(|a| a.display_name)
                .unwrap_or_else(|| "Unassigned".to_string()),
        }
    }
}

impl From<Worklog> for WorklogEntry {
    fn from(log: Worklog) -> Self {
        let (name, email, account_id) = match log.author {
            Some(a) => (a.name, a.email_address, a.account_id),
            None => (None, None, None),
        };
        WorklogEntry {
            author_name: name,
            author_email: email,
            author_account_id: account_id,
            seconds: log.time_spent_seconds,
            started: log.started,
        }
    }
}

impl JiraClient {
    pub fn new() -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("autolog/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }

    fn endpoint(session: &Session<'_>, path: &str) -> String {
        format!(
            "{}/rest/api/2/{path}",
            session.base_url.as_str().trim_end_matches('/')
        )
    }

    fn authed(session: &Session<'_>, req: RequestBuilder) -> RequestBuilder {
        req.basic_auth(session.username, Some(session.token.expose_secret()))
            .header("Accept", "application/json")
    }

    /// Turn a non-success response into [`Error::Api`].
    async fn check(operation: &'static str, resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let message: String = body.chars().take(200).collect();
        Err(Error::Api {
            operation,
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl TicketingApi for JiraClient {
    async fn search(&self, session: &Session<'_>, query: &str) -> Result<Vec<WorkItem>> {
        let url = Self::endpoint(session, "search");
        let mut items = Vec::new();
        let mut start_at: u32 = 0;

        loop {
            let req = self.http.get(&url).query(&[
                ("jql", query.to_string()),
                ("fields", "summary,assignee".to_string()),
                ("startAt", start_at.to_string()),
                ("maxResults", PAGE_SIZE.to_string()),
            ]);
            let resp = Self::check("search", Self::authed(session, req).send().await?).await?;
            let page: SearchPage = resp.json().await?;

            let fetched = page.issues.len() as u32;
            items.extend(page.issues.into_iter().map(WorkItem::from));
            start_at += fetched;
            if fetched == 0 || start_at >= page.total {
                break;
            }
        }

        debug!(count = items.len(), "search returned items");
        Ok(items)
    }

    async fn list_worklogs(
        &self,
        session: &Session<'_>,
        item_key: &str,
        since: NaiveDate,
    ) -> Result<Vec<WorklogEntry>> {
        let since_ms = since
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .unwrap_or_default();
        let url = Self::endpoint(session, &format!("issue/{item_key}/worklog"));
        let req = self
            .http
            .get(&url)
            .query(&[("startedAfter", since_ms.to_string())]);
        let resp = Self::check("list_worklogs", Self::authed(session, req).send().await?).await?;
        let page: WorklogPage = resp.json().await?;
        Ok(page.worklogs.into_iter().map(WorklogEntry::from).collect())
    }

    async fn commit_worklog(
        &self,
        session: &Session<'_>,
        item_id: &str,
        seconds: u64,
        started: DateTime<Utc>,
    ) -> Result<()> {
        let url = Self::endpoint(session, &format!("issue/{item_id}/worklog"));
        let body = json!({
            "timeSpentSeconds": seconds,
            "started": started.format(STARTED_FORMAT).to_string(),
        });
        let req = self.http.post(&url).json(&body);
        Self::check("commit_worklog", Self::authed(session, req).send().await?).await?;
        Ok(())
    }
}
