//! Work discovery and the already-logged guard.

use crate::error::Result;
use crate::model::{WorkItem, WorklogEntry};
use crate::ticketing::{Session, TicketingApi};
use chrono::NaiveDate;
use futures::future::join_all;
use tracing::{debug, info};

/// Tickets the account worked on, according to `query`.
pub async fn discover(
    api: &dyn TicketingApi,
    session: &Session<'_>,
    query: &str,
) -> Result<Vec<WorkItem>> {
    let items = api.search(session, query).await?;
    debug!(count = items.len(), "discovered work items");
    Ok(items)
}

/// Whether `session.username` already has a worklog dated `day` on any of
/// `items`.
///
/// All lookups run concurrently and are all awaited. A match wins over
/// lookup errors, since it already decides the account is done; otherwise
/// the first error is returned.
pub async fn already_logged(
    api: &dyn TicketingApi,
    session: &Session<'_>,
    items: &[WorkItem],
    day: NaiveDate,
) -> Result<bool> {
    let lookups = items
        .iter()
        .map(|item| api.list_worklogs(session, &item.key, day));
    let results = join_all(lookups).await;

    let mut first_error = None;
    for (item, result) in items.iter().zip(results) {
        match result {
            Ok(entries) => {
                if entries
                    .iter()
                    .any(|e| started_on(e, day) && e.authored_by(session.username))
                {
                    info!(item = %item.key, %day, "worklog already present");
                    return Ok(true);
                }
            }
            Err(e) => {
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(false),
    }
}

/// Entries without a readable start date are assumed to be on `day`, since
/// the service already filtered them to start on or after it.
fn started_on(entry: &WorklogEntry, day: NaiveDate) -> bool {
    entry
        .started
        .as_deref()
        .and_then(|s| s.get(..10))
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
        .is_none_or(|started| started == day)
}
