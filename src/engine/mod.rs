//! The distribution job: per-account pipeline, tick driver, daily schedule.

pub mod discovery;
pub mod notify;
pub mod schedule;
pub mod submit;
pub mod tick;

pub use notify::NotifyOn;
pub use schedule::Scheduler;
pub use submit::SubmissionReport;
pub use tick::{AccountOutcome, AccountReport, TickDriver, TickReport, TickSettings};
