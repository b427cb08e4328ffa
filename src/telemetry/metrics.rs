//! Metric instruments for autolog.
//!
//! Created from the `"autolog"` meter on the globally-registered
//! `MeterProvider`; without an OTLP endpoint they are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

fn meter() -> Meter {
    opentelemetry::global::meter("autolog")
}

/// Counter: ticks run.
/// Labels: `result` ("completed" | "skipped" | "aborted").
pub fn ticks() -> Counter<u64> {
    meter()
        .u64_counter("autolog.ticks")
        .with_description("Number of scheduled ticks")
        .build()
}

/// Histogram: wall-clock duration of a tick in milliseconds.
pub fn tick_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("autolog.tick.duration_ms")
        .with_description("Tick duration in milliseconds")
        .with_unit("ms")
        .build()
}

/// Counter: accounts processed.
/// Labels: `outcome` ("submitted" | "nothing_worked" | "already_logged" | "nothing_allocated"
/// | "invalid" | "failed").
pub fn accounts_processed() -> Counter<u64> {
    meter()
        .u64_counter("autolog.accounts.processed")
        .with_description("Accounts processed per tick, by outcome")
        .build()
}

/// Counter: worklog commits.
/// Labels: `result` ("ok" | "error").
pub fn worklogs_committed() -> Counter<u64> {
    meter()
        .u64_counter("autolog.worklogs.committed")
        .with_description("Worklog commit attempts")
        .build()
}

/// Counter: shares dropped for falling outside worklog bounds.
/// Labels: `policy`.
pub fn shares_dropped() -> Counter<u64> {
    meter()
        .u64_counter("autolog.allocation.dropped")
        .with_description("Allocation shares dropped as out of bounds")
        .build()
}

/// Counter: owner notifications.
/// Labels: `result` ("sent" | "suppressed" | "undeliverable").
pub fn notifications() -> Counter<u64> {
    meter()
        .u64_counter("autolog.notifications")
        .with_description("Owner notifications by result")
        .build()
}
