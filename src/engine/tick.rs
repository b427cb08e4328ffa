//! The tick driver: one pass over every enabled account.
//!
//! Accounts are handled one at a time. Each goes through
//! validate → discover → guard → allocate → submit → notify, and any error
//! along the way ends that account's pass only. Failing to list accounts
//! aborts the tick; the next tick starts fresh.

use super::notify::{self, NotifyOn};
use super::{discovery, submit};
use crate::allocation;
use crate::cipher::{self, CredentialCipher};
use crate::config::Settings;
use crate::error::Error;
use crate::messenger::Messenger;
use crate::model::{AccountConfig, AllocationPolicy};
use crate::query;
use crate::store::ConfigStore;
use crate::telemetry::metrics;
use crate::telemetry::tick::{record_stage, start_account_span, start_tick_span};
use crate::ticketing::{Session, TicketingApi};
use crate::validate;
use chrono::{NaiveDate, NaiveTime};
use opentelemetry::KeyValue;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

/// The parts of [`Settings`] a tick needs.
#[derive(Debug, Clone)]
pub struct TickSettings {
    pub policy: AllocationPolicy,
    pub default_query: Option<String>,
    pub notify_on: NotifyOn,
    pub start_time: NaiveTime,
}

impl Default for TickSettings {
    fn default() -> Self {
        Self::from(&Settings::default())
    }
}

impl From<&Settings> for TickSettings {
    fn from(settings: &Settings) -> Self {
        Self {
            policy: settings.allocation.policy,
            default_query: settings.discovery.default_query.clone(),
            notify_on: settings.notify.on,
            start_time: settings.submit.start_time,
        }
    }
}

/// How one account's pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountOutcome {
    /// Worklogs were submitted. Counts are per item.
    Submitted {
        committed: usize,
        failed: usize,
        notified: bool,
    },
    /// Discovery found no tickets for the day.
    NothingWorked,
    /// The account already has worklogs for the day.
    AlreadyLogged,
    /// Every share was out of bounds, so nothing was submitted.
    NothingAllocated,
    /// A configuration field failed validation; no external call was made.
    Invalid(String),
    /// An external call or unexpected error ended the pass.
    Failed(String),
}

impl AccountOutcome {
    fn label(&self) -> &'static str {
        match self {
            AccountOutcome::Submitted { .. } => "submitted",
            AccountOutcome::NothingWorked => "nothing_worked",
            AccountOutcome::AlreadyLogged => "already_logged",
            AccountOutcome::NothingAllocated => "nothing_allocated",
            AccountOutcome::Invalid(_) => "invalid",
            AccountOutcome::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct AccountReport {
    pub account_id: String,
    pub guild_id: String,
    pub outcome: AccountOutcome,
}

#[derive(Debug, Clone)]
pub enum TickReport {
    Completed {
        tick_id: Uuid,
        target_date: NaiveDate,
        accounts: Vec<AccountReport>,
    },
    /// Another tick was still running.
    Skipped,
    /// Accounts could not be listed.
    Aborted { error: String },
}

pub struct TickDriver {
    store: Arc<dyn ConfigStore>,
    api: Arc<dyn TicketingApi>,
    cipher: Arc<dyn CredentialCipher>,
    messenger: Arc<dyn Messenger>,
    settings: TickSettings,
    running: Mutex<()>,
}

impl TickDriver {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        api: Arc<dyn TicketingApi>,
        cipher: Arc<dyn CredentialCipher>,
        messenger: Arc<dyn Messenger>,
        settings: TickSettings,
    ) -> Self {
        Self {
            store,
            api,
            cipher,
            messenger,
            settings,
            running: Mutex::new(()),
        }
    }

    /// Fill in `target_date` for every enabled account.
    ///
    /// Returns [`TickReport::Skipped`] without doing anything if another
    /// tick is in progress.
    pub async fn run_tick(&self, target_date: NaiveDate) -> TickReport {
        let Ok(_guard) = self.running.try_lock() else {
            warn!(%target_date, "previous tick still running, skipping");
            metrics::ticks().add(1, &[KeyValue::new("result", "skipped")]);
            return TickReport::Skipped;
        };

        let tick_id = Uuid::new_v4();
        let span = start_tick_span(&tick_id, target_date);
        let started = Instant::now();

        let report = async {
            let accounts = match self.store.list_enabled().await {
                Ok(accounts) => accounts,
                Err(e) => {
                    error!("cannot list accounts, aborting tick: {e}");
                    return TickReport::Aborted {
                        error: e.to_string(),
                    };
                }
            };
            info!(accounts = accounts.len(), "tick started");

            let mut reports = Vec::with_capacity(accounts.len());
            for account in &accounts {
                let outcome = self.run_account(account, target_date).await;
                metrics::accounts_processed().add(1, &[KeyValue::new("outcome", outcome.label())]);
                reports.push(AccountReport {
                    account_id: account.account_id.clone(),
                    guild_id: account.guild_id.clone(),
                    outcome,
                });
            }

            info!(accounts = reports.len(), "tick finished");
            TickReport::Completed {
                tick_id,
                target_date,
                accounts: reports,
            }
        }
        .instrument(span)
        .await;

        let result = match report {
            TickReport::Completed { .. } => "completed",
            TickReport::Aborted { .. } => "aborted",
            TickReport::Skipped => "skipped",
        };
        metrics::ticks().add(1, &[KeyValue::new("result", result)]);
        metrics::tick_duration_ms().record(started.elapsed().as_secs_f64() * 1_000.0, &[]);
        report
    }

    /// One account's pass. Never returns an error: failures become outcomes.
    async fn run_account(&self, account: &AccountConfig, target_date: NaiveDate) -> AccountOutcome {
        let span = start_account_span(&account.account_id, &account.guild_id);
        let result = self
            .process_account(account, target_date, &span)
            .instrument(span.clone())
            .await;

        span.in_scope(|| match result {
            Ok(outcome) => {
                info!(outcome = outcome.label(), "account done");
                outcome
            }
            Err(e @ Error::Validation { .. }) => {
                warn!(
                    account_id = %account.account_id,
                    guild_id = %account.guild_id,
                    "skipping account with invalid config: {e}"
                );
                AccountOutcome::Invalid(e.to_string())
            }
            Err(e) => {
                let status = match &e {
                    Error::Api { status, .. } => Some(*status),
                    _ => None,
                };
                error!(
                    account_id = %account.account_id,
                    guild_id = %account.guild_id,
                    host = %account.host,
                    kind = e.kind(),
                    status,
                    "account failed: {e}"
                );
                AccountOutcome::Failed(e.to_string())
            }
        })
    }

    async fn process_account(
        &self,
        account: &AccountConfig,
        target_date: NaiveDate,
        span: &tracing::Span,
    ) -> crate::error::Result<AccountOutcome> {
        record_stage(span, "start", "validate");
        let valid = validate::validate_account(account)?;
        let token = cipher::decode_credential(self.cipher.as_ref(), &account.token_ciphertext);
        let session = Session {
            base_url: &valid.base_url,
            username: &valid.username,
            token: &token,
        };

        record_stage(span, "validate", "discover");
        let template = valid.query.as_deref().or(self.settings.default_query.as_deref());
        let jql = query::for_day(template, target_date);
        let items = discovery::discover(self.api.as_ref(), &session, &jql).await?;
        if items.is_empty() {
            info!(%target_date, "no work items for the day");
            return Ok(AccountOutcome::NothingWorked);
        }

        record_stage(span, "discover", "guard");
        if discovery::already_logged(self.api.as_ref(), &session, &items, target_date).await? {
            return Ok(AccountOutcome::AlreadyLogged);
        }

        record_stage(span, "guard", "allocate");
        let allocations = allocation::distribute(
            items,
            valid.budget_hours,
            self.settings.policy,
            &mut rand::thread_rng(),
        );
        if allocations.is_empty() {
            warn!("every share was out of bounds, nothing to submit");
            return Ok(AccountOutcome::NothingAllocated);
        }

        record_stage(span, "allocate", "submit");
        let started = target_date.and_time(self.settings.start_time).and_utc();
        let report = submit::submit_all(self.api.as_ref(), &session, &allocations, started).await;

        record_stage(span, "submit", "notify");
        let notified = if self.settings.notify_on.should_notify(&report) {
            let text = notify::render_summary(target_date, &allocations);
            notify::notify(self.messenger.as_ref(), account, &text).await
        } else {
            info!(failed = report.failed(), "no commit succeeded, summary suppressed");
            metrics::notifications().add(1, &[KeyValue::new("result", "suppressed")]);
            false
        };

        Ok(AccountOutcome::Submitted {
            committed: report.committed(),
            failed: report.failed(),
            notified,
        })
    }
}
