//! Typed configuration.
//!
//! [`Config`] comes from environment variables, is loaded once at startup,
//! and fails fast if required vars are missing. Sensitive values are
//! wrapped in secrecy::SecretString to prevent log leaks. [`Settings`]
//! holds the tunable job behaviour and is read from an optional TOML file.

pub mod secrets;

use crate::engine::notify::NotifyOn;
use crate::error::{Error, Result};
use crate::model::AllocationPolicy;
use chrono::NaiveTime;
use secrets::SecretString;
use serde::{Deserialize, Deserializer};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    /// Base64-encoded AES-256 key for stored ticketing tokens.
    pub cipher_key: SecretString,
    /// Discord bot token. Without it, summaries are only logged.
    pub discord_token: Option<SecretString>,
    pub discord_api_base: Option<String>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
    pub settings_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    /// In production, systemd EnvironmentFile provides the vars.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            cipher_key: SecretString::from(required_var("AUTOLOG_CIPHER_KEY")?),
            discord_token: optional_var("DISCORD_BOT_TOKEN").map(SecretString::from),
            discord_api_base: optional_var("DISCORD_API_BASE"),
            otel_endpoint: optional_var("OTEL_ENDPOINT"),
            log_level: optional_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            settings_path: optional_var("AUTOLOG_SETTINGS").map(PathBuf::from),
        })
    }

    /// Settings from `AUTOLOG_SETTINGS`, or defaults when unset.
    pub fn settings(&self) -> Result<Settings> {
        match &self.settings_path {
            Some(path) => Settings::load(path),
            None => Ok(Settings::default()),
        }
    }
}

fn required_var(name: &str) -> Result<String> {
    optional_var(name)
        .ok_or_else(|| Error::Config(format!("required environment variable {name} is not set")))
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// Job behaviour. Every section and field is optional in the TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub schedule: ScheduleSettings,
    pub allocation: AllocationSettings,
    pub discovery: DiscoverySettings,
    pub notify: NotifySettings,
    pub submit: SubmitSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleSettings {
    /// UTC time of day the daily tick fires.
    #[serde(deserialize_with = "hh_mm")]
    pub run_at: NaiveTime,
    /// The tick fills in the day this many days before the fire date.
    pub days_back: u32,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            run_at: NaiveTime::from_hms_opt(0, 30, 0).unwrap_or_default(),
            days_back: 1,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AllocationSettings {
    pub policy: AllocationPolicy,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoverySettings {
    /// Replaces the built-in query for accounts without an override.
    pub default_query: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotifySettings {
    pub on: NotifyOn,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubmitSettings {
    /// UTC start time stamped on committed worklogs.
    #[serde(deserialize_with = "hh_mm")]
    pub start_time: NaiveTime,
}

impl Default for SubmitSettings {
    fn default() -> Self {
        Self {
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read settings {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("bad settings {}: {e}", path.display())))
    }

    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

fn hh_mm<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<NaiveTime, D::Error> {
    let raw = String::deserialize(deserializer)?;
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .map_err(|e| serde::de::Error::custom(format!("expected HH:MM, got {raw:?}: {e}")))
}
