//! Integration tests for the tick driver, using in-memory collaborators.

use async_trait::async_trait;
use autolog::allocation::GRANULARITY_SECS;
use autolog::cipher::{AesGcmCipher, CredentialCipher};
use autolog::engine::{AccountOutcome, NotifyOn, TickDriver, TickReport, TickSettings};
use autolog::error::{Error, Result};
use autolog::messenger::{Messenger, MessengerError};
use autolog::model::{AccountConfig, AllocationPolicy, WorkItem, WorklogEntry};
use autolog::store::{ConfigStore, MemoryStore};
use autolog::ticketing::{Session, TicketingApi};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use secrecy::ExposeSecret;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct Commit {
    username: String,
    item_id: String,
    seconds: u64,
    started: DateTime<Utc>,
}

/// Ticketing service keyed by username.
#[derive(Default)]
struct FakeTicketing {
    items: HashMap<String, Vec<WorkItem>>,
    search_status: HashMap<String, u16>,
    worklogs: HashMap<String, Vec<WorklogEntry>>,
    failing_commits: HashSet<String>,
    failing_worklogs: HashSet<String>,
    searches: Mutex<Vec<(String, String)>>,
    tokens: Mutex<Vec<String>>,
    commits: Mutex<Vec<Commit>>,
    /// When set, `search` signals `entered` and waits on `release`.
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl FakeTicketing {
    fn with_items(mut self, username: &str, keys: &[&str]) -> Self {
        self.items.insert(
            username.to_string(),
            keys.iter().map(|k| item(k)).collect(),
        );
        self
    }

    fn commits(&self) -> Vec<Commit> {
        self.commits.lock().unwrap().clone()
    }

    fn searched_users(&self) -> Vec<String> {
        self.searches.lock().unwrap().iter().map(|(u, _)| u.clone()).collect()
    }
}

#[async_trait]
impl TicketingApi for FakeTicketing {
    async fn search(&self, session: &Session<'_>, query: &str) -> Result<Vec<WorkItem>> {
        self.searches
            .lock()
            .unwrap()
            .push((session.username.to_string(), query.to_string()));
        self.tokens
            .lock()
            .unwrap()
            .push(session.token.expose_secret().to_string());
        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }
        if let Some(status) = self.search_status.get(session.username) {
            return Err(Error::Api {
                operation: "search",
                status: *status,
                message: "upstream unavailable".to_string(),
            });
        }
        Ok(self.items.get(session.username).cloned().unwrap_or_default())
    }

    async fn list_worklogs(
        &self,
        _session: &Session<'_>,
        item_key: &str,
        _since: NaiveDate,
    ) -> Result<Vec<WorklogEntry>> {
        if self.failing_worklogs.contains(item_key) {
            return Err(Error::Api {
                operation: "list_worklogs",
                status: 502,
                message: "bad gateway".to_string(),
            });
        }
        Ok(self.worklogs.get(item_key).cloned().unwrap_or_default())
    }

    async fn commit_worklog(
        &self,
        session: &Session<'_>,
        item_id: &str,
        seconds: u64,
        started: DateTime<Utc>,
    ) -> Result<()> {
        if self.failing_commits.contains(item_id) {
            return Err(Error::Api {
                operation: "commit_worklog",
                status: 400,
                message: "rejected".to_string(),
            });
        }
        self.commits.lock().unwrap().push(Commit {
            username: session.username.to_string(),
            item_id: item_id.to_string(),
            seconds,
            started,
        });
        Ok(())
    }
}

#[derive(Default)]
struct FakeMessenger {
    sent: Mutex<Vec<(String, String, String)>>,
    not_member: bool,
}

impl FakeMessenger {
    fn sent(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn send_direct(
        &self,
        account_id: &str,
        guild_id: &str,
        text: &str,
    ) -> std::result::Result<(), MessengerError> {
        if self.not_member {
            return Err(MessengerError::NotMember {
                account_id: account_id.to_string(),
                guild_id: guild_id.to_string(),
            });
        }
        self.sent.lock().unwrap().push((
            account_id.to_string(),
            guild_id.to_string(),
            text.to_string(),
        ));
        Ok(())
    }
}

struct BrokenStore;

#[async_trait]
impl ConfigStore for BrokenStore {
    async fn list_enabled(&self) -> Result<Vec<AccountConfig>> {
        Err(Error::Other("connection refused".to_string()))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn cipher() -> AesGcmCipher {
    AesGcmCipher::from_key_bytes(&[42u8; 32]).unwrap()
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 7).unwrap()
}

fn item(key: &str) -> WorkItem {
    WorkItem {
        id: format!("id-{key}"),
        key: key.to_string(),
        summary: format!("Work on {key}"),
        assignee: "Dana Scott".to_string(),
    }
}

fn account(username: &str) -> AccountConfig {
    AccountConfig {
        id: Uuid::new_v4(),
        account_id: format!("user-{username}"),
        guild_id: "guild-1".to_string(),
        host: "jira.example.com".to_string(),
        username: username.to_string(),
        token_ciphertext: cipher().encrypt(&format!("token-{username}")).unwrap(),
        query: None,
        paused: false,
        budget_hours: 8,
        created_at: Utc::now(),
    }
}

fn worklog_by(author: &str) -> WorklogEntry {
    WorklogEntry {
        author_name: Some(author.to_string()),
        author_email: None,
        author_account_id: None,
        seconds: 3_600,
        started: Some("2024-03-07T09:00:00.000+0000".to_string()),
    }
}

fn driver(
    accounts: Vec<AccountConfig>,
    api: Arc<FakeTicketing>,
    messenger: Arc<FakeMessenger>,
    settings: TickSettings,
) -> TickDriver {
    TickDriver::new(
        Arc::new(MemoryStore::with_accounts(accounts)),
        api,
        Arc::new(cipher()),
        messenger,
        settings,
    )
}

fn outcomes(report: TickReport) -> Vec<AccountOutcome> {
    match report {
        TickReport::Completed { accounts, .. } => accounts.into_iter().map(|a| a.outcome).collect(),
        other => panic!("expected Completed, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn splits_budget_evenly_and_notifies_owner() {
    let api = Arc::new(FakeTicketing::default().with_items("dana", &["OPS-1", "OPS-2", "OPS-3"]));
    let messenger = Arc::new(FakeMessenger::default());
    let driver = driver(vec![account("dana")], api.clone(), messenger.clone(), TickSettings::default());

    let outcomes = outcomes(driver.run_tick(day()).await);
    assert_eq!(
        outcomes,
        vec![AccountOutcome::Submitted {
            committed: 3,
            failed: 0,
            notified: true
        }]
    );

    let commits = api.commits();
    assert_eq!(commits.len(), 3);
    assert!(commits.iter().all(|c| c.seconds == 9_600 && c.username == "dana"));
    assert!(commits.iter().all(|c| c.started == Utc.with_ymd_and_hms(2024, 3, 7, 9, 0, 0).unwrap()));
    let mut ids: Vec<_> = commits.iter().map(|c| c.item_id.clone()).collect();
    ids.sort();
    assert_eq!(ids, vec!["id-OPS-1", "id-OPS-2", "id-OPS-3"]);

    let sent = messenger.sent();
    assert_eq!(sent.len(), 1);
    let (to, guild, text) = &sent[0];
    assert_eq!(to, "user-dana");
    assert_eq!(guild, "guild-1");
    assert!(text.contains("`OPS-1` (Dana Scott) Work on OPS-1: 2h 40m"), "{text}");
    assert!(text.contains("Total: 8h"), "{text}");
}

#[tokio::test]
async fn default_query_targets_the_day() {
    let api = Arc::new(FakeTicketing::default().with_items("dana", &["OPS-1"]));
    let mut custom = account("lee");
    custom.query = Some("project = WEB AND worklogDate = \"{0}\"".to_string());
    let driver = driver(
        vec![account("dana"), custom],
        api.clone(),
        Arc::new(FakeMessenger::default()),
        TickSettings::default(),
    );

    driver.run_tick(day()).await;

    let searches = api.searches.lock().unwrap().clone();
    assert_eq!(searches.len(), 2);
    assert!(searches[0].1.contains("ON \"2024/03/07\""), "{}", searches[0].1);
    assert_eq!(searches[1].1, "project = WEB AND worklogDate = \"2024/03/07\"");
}

// ---------------------------------------------------------------------------
// Idempotency guard
// ---------------------------------------------------------------------------

#[tokio::test]
async fn existing_worklog_by_account_skips_the_whole_account() {
    let mut fake = FakeTicketing::default().with_items("dana", &["OPS-1", "OPS-2"]);
    fake.worklogs.insert("OPS-2".to_string(), vec![worklog_by("Dana")]);
    let api = Arc::new(fake);
    let messenger = Arc::new(FakeMessenger::default());
    let driver = driver(vec![account("dana")], api.clone(), messenger.clone(), TickSettings::default());

    assert_eq!(outcomes(driver.run_tick(day()).await), vec![AccountOutcome::AlreadyLogged]);
    assert!(api.commits().is_empty());
    assert!(messenger.sent().is_empty());
}

#[tokio::test]
async fn worklogs_by_other_authors_do_not_count() {
    let mut fake = FakeTicketing::default().with_items("dana", &["OPS-1"]);
    fake.worklogs.insert("OPS-1".to_string(), vec![worklog_by("lee")]);
    let api = Arc::new(fake);
    let driver = driver(
        vec![account("dana")],
        api.clone(),
        Arc::new(FakeMessenger::default()),
        TickSettings::default(),
    );

    driver.run_tick(day()).await;
    assert_eq!(api.commits().len(), 1);
    assert_eq!(api.commits()[0].seconds, 28_800);
}

#[tokio::test]
async fn failed_worklog_lookup_fails_the_account_without_commits() {
    let mut fake = FakeTicketing::default()
        .with_items("dana", &["OPS-1", "OPS-2"])
        .with_items("lee", &["WEB-1"]);
    fake.failing_worklogs.insert("OPS-2".to_string());
    let api = Arc::new(fake);
    let messenger = Arc::new(FakeMessenger::default());
    let driver = driver(
        vec![account("dana"), account("lee")],
        api.clone(),
        messenger.clone(),
        TickSettings::default(),
    );

    let outcomes = outcomes(driver.run_tick(day()).await);
    assert!(
        matches!(&outcomes[0], AccountOutcome::Failed(msg) if msg.contains("list_worklogs") && msg.contains("502")),
        "{outcomes:?}"
    );
    assert!(matches!(outcomes[1], AccountOutcome::Submitted { committed: 1, .. }));
    assert!(api.commits().iter().all(|c| c.username == "lee"));
    assert_eq!(messenger.sent().len(), 1);
}

#[tokio::test]
async fn existing_worklog_wins_over_a_failed_lookup() {
    let mut fake = FakeTicketing::default().with_items("dana", &["OPS-1", "OPS-2"]);
    fake.failing_worklogs.insert("OPS-1".to_string());
    fake.worklogs.insert("OPS-2".to_string(), vec![worklog_by("dana")]);
    let api = Arc::new(fake);
    let driver = driver(
        vec![account("dana")],
        api.clone(),
        Arc::new(FakeMessenger::default()),
        TickSettings::default(),
    );

    assert_eq!(outcomes(driver.run_tick(day()).await), vec![AccountOutcome::AlreadyLogged]);
    assert!(api.commits().is_empty());
}

#[tokio::test]
async fn nothing_worked_is_skipped_quietly() {
    let api = Arc::new(FakeTicketing::default());
    let messenger = Arc::new(FakeMessenger::default());
    let driver = driver(vec![account("dana")], api.clone(), messenger.clone(), TickSettings::default());

    assert_eq!(outcomes(driver.run_tick(day()).await), vec![AccountOutcome::NothingWorked]);
    assert!(api.commits().is_empty());
    assert!(messenger.sent().is_empty());
}

// ---------------------------------------------------------------------------
// Failure isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_discovery_does_not_stop_the_next_account() {
    let mut fake = FakeTicketing::default()
        .with_items("dana", &["OPS-1"])
        .with_items("lee", &["WEB-1", "WEB-2"]);
    fake.search_status.insert("dana".to_string(), 503);
    let api = Arc::new(fake);
    let messenger = Arc::new(FakeMessenger::default());
    let driver = driver(
        vec![account("dana"), account("lee")],
        api.clone(),
        messenger.clone(),
        TickSettings::default(),
    );

    let outcomes = outcomes(driver.run_tick(day()).await);
    assert!(matches!(&outcomes[0], AccountOutcome::Failed(msg) if msg.contains("503")));
    assert_eq!(
        outcomes[1],
        AccountOutcome::Submitted {
            committed: 2,
            failed: 0,
            notified: true
        }
    );
    assert!(api.commits().iter().all(|c| c.username == "lee"));
    assert_eq!(messenger.sent().len(), 1);
}

#[tokio::test]
async fn invalid_account_makes_no_external_calls() {
    let api = Arc::new(FakeTicketing::default().with_items("lee", &["WEB-1"]));
    let mut broken = account("dana");
    broken.budget_hours = 0;
    let driver = driver(
        vec![broken, account("lee")],
        api.clone(),
        Arc::new(FakeMessenger::default()),
        TickSettings::default(),
    );

    let outcomes = outcomes(driver.run_tick(day()).await);
    assert!(matches!(&outcomes[0], AccountOutcome::Invalid(msg) if msg.contains("budget_hours")));
    assert_eq!(api.searched_users(), vec!["lee"]);
}

#[tokio::test]
async fn scheme_only_host_is_invalid_before_any_call() {
    let mut broken = account("dana");
    broken.host = "https://".to_string();
    let api = Arc::new(FakeTicketing::default().with_items("dana", &["OPS-1"]));
    let driver = driver(vec![broken], api.clone(), Arc::new(FakeMessenger::default()), TickSettings::default());

    let outcomes = outcomes(driver.run_tick(day()).await);
    assert!(matches!(&outcomes[0], AccountOutcome::Invalid(msg) if msg.contains("host")), "{outcomes:?}");
    assert!(api.searched_users().is_empty());
    assert!(api.commits().is_empty());
}

#[tokio::test]
async fn listing_failure_aborts_only_that_tick() {
    let driver = TickDriver::new(
        Arc::new(BrokenStore),
        Arc::new(FakeTicketing::default()),
        Arc::new(cipher()),
        Arc::new(FakeMessenger::default()),
        TickSettings::default(),
    );
    assert!(matches!(driver.run_tick(day()).await, TickReport::Aborted { .. }));
    assert!(matches!(driver.run_tick(day()).await, TickReport::Aborted { .. }));
}

#[tokio::test]
async fn unreachable_owner_does_not_fail_the_account() {
    let api = Arc::new(FakeTicketing::default().with_items("dana", &["OPS-1"]));
    let messenger = Arc::new(FakeMessenger {
        not_member: true,
        ..Default::default()
    });
    let driver = driver(vec![account("dana")], api.clone(), messenger, TickSettings::default());

    assert_eq!(
        outcomes(driver.run_tick(day()).await),
        vec![AccountOutcome::Submitted {
            committed: 1,
            failed: 0,
            notified: false
        }]
    );
}

// ---------------------------------------------------------------------------
// Submission outcomes and notification
// ---------------------------------------------------------------------------

#[tokio::test]
async fn partial_commit_failure_still_commits_the_rest_and_notifies() {
    let mut fake = FakeTicketing::default().with_items("dana", &["OPS-1", "OPS-2", "OPS-3"]);
    fake.failing_commits.insert("id-OPS-2".to_string());
    let api = Arc::new(fake);
    let messenger = Arc::new(FakeMessenger::default());
    let driver = driver(vec![account("dana")], api.clone(), messenger.clone(), TickSettings::default());

    assert_eq!(
        outcomes(driver.run_tick(day()).await),
        vec![AccountOutcome::Submitted {
            committed: 2,
            failed: 1,
            notified: true
        }]
    );
    assert_eq!(api.commits().len(), 2);
    assert!(messenger.sent()[0].2.contains("OPS-2"));
}

#[tokio::test]
async fn any_success_policy_suppresses_summary_when_every_commit_fails() {
    let mut fake = FakeTicketing::default().with_items("dana", &["OPS-1"]);
    fake.failing_commits.insert("id-OPS-1".to_string());
    let api = Arc::new(fake);
    let messenger = Arc::new(FakeMessenger::default());
    let settings = TickSettings {
        notify_on: NotifyOn::AnySuccess,
        ..TickSettings::default()
    };
    let driver = driver(vec![account("dana")], api, messenger.clone(), settings);

    assert_eq!(
        outcomes(driver.run_tick(day()).await),
        vec![AccountOutcome::Submitted {
            committed: 0,
            failed: 1,
            notified: false
        }]
    );
    assert!(messenger.sent().is_empty());
}

#[tokio::test]
async fn fairly_policy_fills_the_budget_on_the_grid() {
    let api = Arc::new(FakeTicketing::default().with_items("dana", &["OPS-1", "OPS-2", "OPS-3"]));
    let settings = TickSettings {
        policy: AllocationPolicy::Fairly,
        ..TickSettings::default()
    };
    let driver = driver(vec![account("dana")], api.clone(), Arc::new(FakeMessenger::default()), settings);

    let outcomes = outcomes(driver.run_tick(day()).await);
    let AccountOutcome::Submitted { committed, failed: 0, .. } = outcomes[0] else {
        panic!("expected Submitted, got {outcomes:?}");
    };

    // A whole-hour budget keeps every share on the grid, so the only share
    // that can be dropped is an empty one and the total is always exact.
    let commits = api.commits();
    assert!((1..=3).contains(&committed));
    assert_eq!(commits.len(), committed);
    assert_eq!(commits.iter().map(|c| c.seconds).sum::<u64>(), 28_800);
    for c in &commits {
        assert_eq!(c.seconds % GRANULARITY_SECS, 0, "{commits:?}");
    }
}

#[tokio::test]
async fn out_of_bound_shares_are_dropped_without_failing_the_account() {
    // One hour over 61 items: only the first share reaches a full minute.
    let keys: Vec<String> = (0..61).map(|i| format!("OPS-{i}")).collect();
    let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
    let api = Arc::new(FakeTicketing::default().with_items("dana", &key_refs));
    let mut small = account("dana");
    small.budget_hours = 1;
    let driver = driver(vec![small], api.clone(), Arc::new(FakeMessenger::default()), TickSettings::default());

    assert_eq!(
        outcomes(driver.run_tick(day()).await),
        vec![AccountOutcome::Submitted {
            committed: 1,
            failed: 0,
            notified: true
        }]
    );
    let commits = api.commits();
    assert_eq!(commits[0].item_id, "id-OPS-0");
    assert_eq!(commits[0].seconds, 60);
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

#[tokio::test]
async fn encrypted_token_is_decrypted_for_the_session() {
    let api = Arc::new(FakeTicketing::default());
    let driver = driver(
        vec![account("dana")],
        api.clone(),
        Arc::new(FakeMessenger::default()),
        TickSettings::default(),
    );
    driver.run_tick(day()).await;
    assert_eq!(*api.tokens.lock().unwrap(), vec!["token-dana".to_string()]);
}

/// Counts WARN events whose message contains `needle`.
struct WarnCounter {
    needle: &'static str,
    hits: Arc<AtomicUsize>,
}

struct MessageVisitor(String);

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{value:?}");
        }
    }
}

impl<S: tracing::Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() != tracing::Level::WARN {
            return;
        }
        let mut visitor = MessageVisitor(String::new());
        event.record(&mut visitor);
        if visitor.0.contains(self.needle) {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[tokio::test]
async fn legacy_plaintext_token_is_used_verbatim_with_one_warning() {
    let hits = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(WarnCounter {
        needle: "not encrypted",
        hits: Arc::clone(&hits),
    });
    let _default = tracing::subscriber::set_default(subscriber);

    let mut legacy = account("dana");
    legacy.token_ciphertext = "plain-legacy-token".to_string();
    let api = Arc::new(FakeTicketing::default().with_items("dana", &["OPS-1"]));
    let driver = driver(vec![legacy], api.clone(), Arc::new(FakeMessenger::default()), TickSettings::default());

    let outcomes = outcomes(driver.run_tick(day()).await);
    assert!(matches!(outcomes[0], AccountOutcome::Submitted { committed: 1, .. }));
    assert_eq!(*api.tokens.lock().unwrap(), vec!["plain-legacy-token".to_string()]);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// At most one tick
// ---------------------------------------------------------------------------

#[tokio::test]
async fn overlapping_tick_is_skipped() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let fake = FakeTicketing {
        gate: Some((Arc::clone(&entered), Arc::clone(&release))),
        ..FakeTicketing::default()
    }
    .with_items("dana", &["OPS-1"]);
    let api = Arc::new(fake);
    let driver = driver(
        vec![account("dana")],
        api.clone(),
        Arc::new(FakeMessenger::default()),
        TickSettings::default(),
    );

    let (first, second) = tokio::join!(driver.run_tick(day()), async {
        entered.notified().await;
        let second = driver.run_tick(day()).await;
        release.notify_one();
        second
    });

    assert!(matches!(second, TickReport::Skipped));
    assert!(matches!(first, TickReport::Completed { .. }));
    assert_eq!(api.commits().len(), 1);

    // The guard is released once the first tick finishes.
    release.notify_one();
    assert!(matches!(driver.run_tick(day()).await, TickReport::Completed { .. }));
}
