//! Splitting a daily effort budget across work items.
//!
//! Both policies return exactly `n` shares summing to `total`. Shares are
//! checked against worklog bounds afterwards by [`distribute`]; a share
//! that fails is dropped on its own and the rest of the account proceeds.

use crate::model::{AllocationPolicy, AllocationResult, WorkItem};
use crate::telemetry::metrics;
use crate::validate;
use opentelemetry::KeyValue;
use rand::Rng;
use tracing::warn;

/// Grid that `fairly` shares are rounded to.
pub const GRANULARITY_SECS: u64 = 300;

const MAX_WEIGHT: usize = 100;

/// Split `total` seconds across `n` items under `policy`.
///
/// `rng` is only consulted by [`AllocationPolicy::Fairly`]. Returns an
/// empty vector when `n` is zero.
pub fn allocate<R: Rng + ?Sized>(
    total: u64,
    n: usize,
    policy: AllocationPolicy,
    rng: &mut R,
) -> Vec<u64> {
    match policy {
        AllocationPolicy::Evenly => evenly(total, n),
        AllocationPolicy::Fairly => fairly(total, n, rng),
    }
}

/// Equal split. The first `total % n` items get one extra second.
pub fn evenly(total: u64, n: usize) -> Vec<u64> {
    if n == 0 {
        return Vec::new();
    }
    let count = n as u64;
    let base = total / count;
    let remainder = (total % count) as usize;
    (0..n)
        .map(|i| if i < remainder { base + 1 } else { base })
        .collect()
}

/// Randomly weighted split on a five-minute grid. Each item draws a
/// distinct weight.
///
/// Every share but the last is the item's weighted portion rounded to the
/// nearest [`GRANULARITY_SECS`], capped by the on-grid part of what is
/// left of the budget. The
/// last share takes the residual, so the sum is exact even when the last
/// share is off-grid.
pub fn fairly<R: Rng + ?Sized>(total: u64, n: usize, rng: &mut R) -> Vec<u64> {
    match n {
        0 => return Vec::new(),
        1 => return vec![total],
        _ => {}
    }

    let weights = draw_weights(n, rng);
    let weight_sum: u128 = weights.iter().sum();
    let grid = u128::from(GRANULARITY_SECS);

    let mut shares = Vec::with_capacity(n);
    let mut remaining = total;
    for weight in &weights[..n - 1] {
        // round(total * weight / weight_sum / grid) * grid, in integers
        let numerator = u128::from(total) * weight;
        let slots = (numerator + weight_sum * grid / 2) / (weight_sum * grid);
        let rounded = u64::try_from(slots * grid).unwrap_or(u64::MAX);
        let share = rounded.min(remaining - remaining % GRANULARITY_SECS);
        remaining -= share;
        shares.push(share);
    }
    shares.push(remaining);
    shares
}

/// `n` distinct weights from `1..=max(100, n)`.
fn draw_weights<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<u128> {
    let pool = n.max(MAX_WEIGHT);
    rand::seq::index::sample(rng, pool, n)
        .into_iter()
        .map(|i| i as u128 + 1)
        .collect()
}

/// Render seconds as days, hours, and minutes, omitting zero parts.
///
/// Leftover seconds are not shown; a duration under a minute renders
/// as `0h`.
pub fn format_duration(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;

    let parts: Vec<String> = [(days, "d"), (hours, "h"), (minutes, "m")]
        .into_iter()
        .filter(|(value, _)| *value > 0)
        .map(|(value, unit)| format!("{value}{unit}"))
        .collect();

    if parts.is_empty() {
        "0h".to_string()
    } else {
        parts.join(" ")
    }
}

/// Allocate `budget_hours` across `items` and pair each share with its item.
///
/// Shares outside the worklog bounds are dropped with a warning rather
/// than failing the account.
pub fn distribute<R: Rng + ?Sized>(
    items: Vec<WorkItem>,
    budget_hours: u32,
    policy: AllocationPolicy,
    rng: &mut R,
) -> Vec<AllocationResult> {
    let total = u64::from(budget_hours) * 3_600;
    let shares = allocate(total, items.len(), policy, rng);

    items
        .into_iter()
        .zip(shares)
        .filter_map(|(item, seconds)| match validate::share_seconds(seconds) {
            Ok(seconds) => Some(AllocationResult {
                human: format_duration(seconds),
                item,
                seconds,
            }),
            Err(e) => {
                warn!(item = %item.key, seconds, %policy, "dropping share: {e}");
                metrics::shares_dropped().add(1, &[KeyValue::new("policy", policy.to_string())]);
                None
            }
        })
        .collect()
}
