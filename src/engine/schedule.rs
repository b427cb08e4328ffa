//! Daily schedule: sleep until the next fire time, run a tick, repeat.

use super::tick::{TickDriver, TickReport};
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

pub struct Scheduler {
    driver: Arc<TickDriver>,
    run_at: NaiveTime,
    days_back: u32,
    shutdown: Arc<Notify>,
}

impl Clone for Scheduler {
    fn clone(&self) -> Self {
        Self {
            driver: Arc::clone(&self.driver),
            run_at: self.run_at,
            days_back: self.days_back,
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

impl Scheduler {
    pub fn new(driver: Arc<TickDriver>, run_at: NaiveTime, days_back: u32) -> Self {
        Self {
            driver,
            run_at,
            days_back,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Signal the scheduler to stop. A tick in progress runs to completion.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Run ticks until shutdown.
    ///
    /// Ticks run inline, so they never overlap. A tick that overruns the
    /// next fire time pushes that fire to the following day.
    pub async fn run(&self) {
        info!(run_at = %self.run_at, days_back = self.days_back, "scheduler started");
        loop {
            let now = Utc::now();
            let fire_at = next_fire(now, self.run_at);
            let wait = (fire_at - now).to_std().unwrap_or_default();
            info!(%fire_at, "next tick scheduled");

            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("scheduler shutting down");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            let target = target_date(fire_at.date_naive(), self.days_back);
            if let TickReport::Completed { accounts, .. } = self.driver.run_tick(target).await {
                info!(%target, accounts = accounts.len(), "scheduled tick complete");
            }
        }
    }
}

/// The first `run_at` strictly after `now`.
pub fn next_fire(now: DateTime<Utc>, run_at: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(run_at).and_utc();
    if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    }
}

/// The day a tick fired on `fire_day` fills in.
pub fn target_date(fire_day: NaiveDate, days_back: u32) -> NaiveDate {
    fire_day
        .checked_sub_days(Days::new(u64::from(days_back)))
        .unwrap_or(fire_day)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn next_fire_is_later_today_when_not_yet_passed() {
        let now = Utc.with_ymd_and_hms(2024, 3, 7, 0, 10, 0).unwrap();
        let at = NaiveTime::from_hms_opt(0, 30, 0).unwrap();
        assert_eq!(next_fire(now, at), Utc.with_ymd_and_hms(2024, 3, 7, 0, 30, 0).unwrap());
    }

    #[test]
    fn next_fire_rolls_to_tomorrow_at_or_after_run_time() {
        let at = NaiveTime::from_hms_opt(0, 30, 0).unwrap();
        let exactly = Utc.with_ymd_and_hms(2024, 3, 7, 0, 30, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 3, 7, 18, 0, 0).unwrap();
        let tomorrow = Utc.with_ymd_and_hms(2024, 3, 8, 0, 30, 0).unwrap();
        assert_eq!(next_fire(exactly, at), tomorrow);
        assert_eq!(next_fire(later, at), tomorrow);
    }

    #[test]
    fn target_date_counts_back_from_fire_day() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(target_date(day, 1), NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(target_date(day, 0), day);
    }
}
