//! Owner notification after submission.
//!
//! Delivery is best-effort: an owner who left the guild or blocks direct
//! messages simply gets nothing, and the tick carries on.

use super::submit::SubmissionReport;
use crate::allocation::format_duration;
use crate::messenger::{Messenger, MessengerError};
use crate::model::{AccountConfig, AllocationResult};
use crate::telemetry::metrics;
use chrono::NaiveDate;
use opentelemetry::KeyValue;
use serde::Deserialize;
use tracing::{debug, info, warn};

/// When a summary is sent after submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyOn {
    /// After every submission, whatever the commit results.
    #[default]
    Always,
    /// Only if at least one commit succeeded.
    AnySuccess,
}

impl NotifyOn {
    pub fn should_notify(self, report: &SubmissionReport) -> bool {
        match self {
            NotifyOn::Always => true,
            NotifyOn::AnySuccess => report.any_committed(),
        }
    }
}

/// The direct message listing what was filed for `day`.
pub fn render_summary(day: NaiveDate, allocations: &[AllocationResult]) -> String {
    let total: u64 = allocations.iter().map(|a| a.seconds).sum();
    let mut lines = Vec::with_capacity(allocations.len() + 2);
    lines.push(format!("Work logged for {day}:"));
    for a in allocations {
        lines.push(format!(
            "- `{}` ({}) {}: {}",
            a.item.key, a.item.assignee, a.item.summary, a.human
        ));
    }
    lines.push(format!("Total: {}", format_duration(total)));
    lines.join("\n")
}

/// Send `text` to the account owner. Returns whether it was delivered.
pub async fn notify(messenger: &dyn Messenger, account: &AccountConfig, text: &str) -> bool {
    match messenger
        .send_direct(&account.account_id, &account.guild_id, text)
        .await
    {
        Ok(()) => {
            info!("summary sent to owner");
            metrics::notifications().add(1, &[KeyValue::new("result", "sent")]);
            true
        }
        Err(e @ (MessengerError::NotMember { .. } | MessengerError::DirectMessagesDisabled(_))) => {
            debug!("owner unreachable: {e}");
            metrics::notifications().add(1, &[KeyValue::new("result", "undeliverable")]);
            false
        }
        Err(e) => {
            warn!("summary delivery failed: {e}");
            metrics::notifications().add(1, &[KeyValue::new("result", "undeliverable")]);
            false
        }
    }
}
