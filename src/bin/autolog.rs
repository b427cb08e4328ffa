//! autolog CLI, the operator interface to the work-log distributor.

use anyhow::Context;
use autolog::allocation::{allocate, format_duration};
use autolog::cipher::AesGcmCipher;
use autolog::config::{Config, Settings};
use autolog::db::Db;
use autolog::engine::schedule::target_date;
use autolog::engine::{AccountOutcome, Scheduler, TickDriver, TickReport, TickSettings};
use autolog::messenger::{DiscordMessenger, LogMessenger, Messenger};
use autolog::model::{AllocationPolicy, NewAccount};
use autolog::telemetry::{TelemetryConfig, TelemetryGuard, init_telemetry};
use autolog::ticketing::JiraClient;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "autolog", about = "Fill in yesterday's worklogs for every registered account")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daily scheduler
    Serve,
    /// Run one tick now
    Tick {
        /// Day to fill in (defaults to the scheduled target day)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Account operations
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },
    /// Print the split a policy would produce
    Preview {
        /// Budget in hours
        #[arg(long, default_value_t = 8)]
        hours: u32,
        /// Number of work items
        #[arg(long)]
        items: usize,
        /// evenly | fairly
        #[arg(long, default_value = "evenly")]
        policy: AllocationPolicy,
    },
    /// Generate a new AUTOLOG_CIPHER_KEY
    Keygen,
}

#[derive(Subcommand)]
enum AccountAction {
    /// Register an account (re-registering replaces it)
    Add {
        /// Chat user id of the owner
        #[arg(long)]
        user: String,
        /// Chat guild id
        #[arg(long)]
        guild: String,
        /// Ticketing host or base URL
        #[arg(long)]
        host: String,
        /// Ticketing username
        #[arg(long)]
        username: String,
        /// Ticketing API token (read from AUTOLOG_TOKEN if omitted)
        #[arg(long, env = "AUTOLOG_TOKEN", hide_env_values = true)]
        token: String,
        /// Custom discovery query; `{0}` is replaced with the day
        #[arg(long)]
        query: Option<String>,
        /// Daily budget in hours
        #[arg(long, default_value_t = 8)]
        budget: u32,
    },
    /// List accounts
    List,
    /// Stop filling in worklogs for an account
    Pause { id: Uuid },
    /// Resume a paused account
    Resume { id: Uuid },
    /// Delete an account
    Remove { id: Uuid },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve => cmd_serve().await,
        Command::Tick { date } => cmd_tick(date).await,
        Command::Account { action } => {
            let config = Config::from_env()?;
            let db = connect(&config).await?;
            match action {
                AccountAction::Add {
                    user,
                    guild,
                    host,
                    username,
                    token,
                    query,
                    budget,
                } => {
                    let cipher = AesGcmCipher::from_base64_key(&config.cipher_key)?;
                    let mut new =
                        NewAccount::new(user, guild, host, username, token).budget_hours(budget);
                    if let Some(q) = query {
                        new = new.query(q);
                    }
                    let account = db.add_account(new, &cipher).await?;
                    println!("Registered: {} ({}@{})", account.id, account.username, account.host);
                    Ok(())
                }
                AccountAction::List => cmd_account_list(&db).await,
                AccountAction::Pause { id } => {
                    db.set_paused(id, true).await?;
                    println!("Paused: {id}");
                    Ok(())
                }
                AccountAction::Resume { id } => {
                    db.set_paused(id, false).await?;
                    println!("Resumed: {id}");
                    Ok(())
                }
                AccountAction::Remove { id } => {
                    db.remove_account(id).await?;
                    println!("Removed: {id}");
                    Ok(())
                }
            }
        }
        Command::Preview {
            hours,
            items,
            policy,
        } => cmd_preview(hours, items, policy),
        Command::Keygen => {
            println!("{}", AesGcmCipher::generate_key());
            Ok(())
        }
    }
}

async fn connect(config: &Config) -> anyhow::Result<Db> {
    let db = Db::connect(config.database_url.expose_secret())
        .await
        .context("connecting to database")?;
    db.migrate().await?;
    Ok(db)
}

fn telemetry(config: &Config) -> anyhow::Result<TelemetryGuard> {
    Ok(init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "autolog".to_string(),
        log_level: config.log_level.clone(),
    })?)
}

async fn build_driver(config: &Config, settings: &Settings) -> anyhow::Result<TickDriver> {
    let db = connect(config).await?;
    let cipher = AesGcmCipher::from_base64_key(&config.cipher_key)?;
    let messenger: Arc<dyn Messenger> = match &config.discord_token {
        Some(token) => {
            let token = SecretString::from(token.expose_secret().to_owned());
            Arc::new(match &config.discord_api_base {
                Some(base) => DiscordMessenger::with_api_base(token, base.clone())?,
                None => DiscordMessenger::new(token)?,
            })
        }
        None => {
            tracing::warn!("DISCORD_BOT_TOKEN not set, summaries will only be logged");
            Arc::new(LogMessenger)
        }
    };

    Ok(TickDriver::new(
        Arc::new(db),
        Arc::new(JiraClient::new()?),
        Arc::new(cipher),
        messenger,
        TickSettings::from(settings),
    ))
}

async fn cmd_serve() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let settings = config.settings()?;
    let _guard = telemetry(&config)?;

    let driver = build_driver(&config, &settings).await?;
    let scheduler = Scheduler::new(
        Arc::new(driver),
        settings.schedule.run_at,
        settings.schedule.days_back,
    );

    let sched = scheduler.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        sched.shutdown();
    });

    scheduler.run().await;
    Ok(())
}

async fn cmd_tick(date: Option<NaiveDate>) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let settings = config.settings()?;
    let guard = telemetry(&config)?;

    let driver = build_driver(&config, &settings).await?;
    let target =
        date.unwrap_or_else(|| target_date(Utc::now().date_naive(), settings.schedule.days_back));
    let report = driver.run_tick(target).await;
    guard.force_flush();

    match report {
        TickReport::Completed { accounts, .. } => {
            println!("Tick for {target}: {} account(s)", accounts.len());
            for a in accounts {
                println!("  {}@{}: {}", a.account_id, a.guild_id, describe(&a.outcome));
            }
            Ok(())
        }
        TickReport::Skipped => anyhow::bail!("another tick is already running"),
        TickReport::Aborted { error } => anyhow::bail!("tick aborted: {error}"),
    }
}

fn describe(outcome: &AccountOutcome) -> String {
    match outcome {
        AccountOutcome::Submitted {
            committed,
            failed,
            notified,
        } => format!(
            "submitted {committed} worklog(s), {failed} failed{}",
            if *notified { ", owner notified" } else { "" }
        ),
        AccountOutcome::NothingWorked => "no work items".to_string(),
        AccountOutcome::AlreadyLogged => "already logged".to_string(),
        AccountOutcome::NothingAllocated => "no share within bounds".to_string(),
        AccountOutcome::Invalid(e) => format!("invalid config: {e}"),
        AccountOutcome::Failed(e) => format!("failed: {e}"),
    }
}

async fn cmd_account_list(db: &Db) -> anyhow::Result<()> {
    let accounts = db.list_accounts().await?;
    if accounts.is_empty() {
        println!("No accounts registered.");
        return Ok(());
    }

    println!(
        "{:<36}  {:<20}  {:<20}  {:<28}  {:>5}  STATE",
        "ID", "USER", "GUILD", "LOGIN", "HOURS"
    );
    for a in &accounts {
        let login = format!("{}@{}", a.username, a.host);
        println!(
            "{:<36}  {:<20}  {:<20}  {:<28}  {:>5}  {}",
            a.id,
            a.account_id,
            a.guild_id,
            login,
            a.budget_hours,
            if a.paused { "paused" } else { "active" }
        );
    }
    println!("\n{} account(s)", accounts.len());
    Ok(())
}

fn cmd_preview(hours: u32, items: usize, policy: AllocationPolicy) -> anyhow::Result<()> {
    anyhow::ensure!(items > 0, "--items must be at least 1");
    let total = u64::from(hours) * 3_600;
    let shares = allocate(total, items, policy, &mut rand::thread_rng());
    for (i, seconds) in shares.iter().enumerate() {
        println!("item {:>3}: {:>6}s  {}", i + 1, seconds, format_duration(*seconds));
    }
    println!("total:    {:>6}s  {}", shares.iter().sum::<u64>(), format_duration(total));
    Ok(())
}
