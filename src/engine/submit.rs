//! Committing allocations as worklogs.
//!
//! Commits are one-way: there is no retry and no rollback. Every commit for
//! an account is started together and all of them are awaited, so one
//! failure never cancels the rest.

use crate::model::AllocationResult;
use crate::telemetry::metrics;
use crate::ticketing::{Session, TicketingApi};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use opentelemetry::KeyValue;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ItemSubmission {
    pub key: String,
    pub seconds: u64,
    pub outcome: CommitOutcome,
}

/// Per-item results for one account, in allocation order.
#[derive(Debug, Clone, Default)]
pub struct SubmissionReport {
    pub items: Vec<ItemSubmission>,
}

impl SubmissionReport {
    pub fn committed(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.outcome == CommitOutcome::Committed)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.items.len() - self.committed()
    }

    pub fn any_committed(&self) -> bool {
        self.committed() > 0
    }
}

pub async fn submit_all(
    api: &dyn TicketingApi,
    session: &Session<'_>,
    allocations: &[AllocationResult],
    started: DateTime<Utc>,
) -> SubmissionReport {
    let commits = allocations
        .iter()
        .map(|a| api.commit_worklog(session, &a.item.id, a.seconds, started));
    let results = join_all(commits).await;

    let items = allocations
        .iter()
        .zip(results)
        .map(|(allocation, result)| {
            let outcome = match result {
                Ok(()) => {
                    info!(item = %allocation.item.key, duration = %allocation.human, "worklog committed");
                    metrics::worklogs_committed().add(1, &[KeyValue::new("result", "ok")]);
                    CommitOutcome::Committed
                }
                Err(e) => {
                    warn!(item = %allocation.item.key, kind = e.kind(), "worklog commit failed: {e}");
                    metrics::worklogs_committed().add(1, &[KeyValue::new("result", "error")]);
                    CommitOutcome::Failed(e.to_string())
                }
            };
            ItemSubmission {
                key: allocation.item.key.clone(),
                seconds: allocation.seconds,
                outcome,
            }
        })
        .collect();

    SubmissionReport { items }
}
