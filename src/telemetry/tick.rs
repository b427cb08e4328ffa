//! Span helpers for ticks and per-account processing.

use chrono::NaiveDate;
use tracing::Span;
use uuid::Uuid;

/// Span covering one tick.
pub fn start_tick_span(tick_id: &Uuid, target_date: NaiveDate) -> Span {
    tracing::info_span!(
        "tick.run",
        "tick.id" = %tick_id,
        "tick.target_date" = %target_date,
    )
}

/// Span covering one account's pass through a tick.
///
/// `account.stage` starts empty and is updated by [`record_stage`].
pub fn start_account_span(account_id: &str, guild_id: &str) -> Span {
    tracing::info_span!(
        "account.process",
        "account.id" = account_id,
        "account.guild" = guild_id,
        "account.stage" = tracing::field::Empty,
    )
}

/// Move the account span to `stage` and emit a transition event.
pub fn record_stage(span: &Span, from: &str, to: &str) {
    span.record("account.stage", to);
    span.in_scope(|| {
        tracing::debug!(from = from, to = to, "stage_transition");
    });
}
