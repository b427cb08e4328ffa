//! Field validators for account configuration and allocation shares.
//!
//! Each validator returns the sanitised value or an [`Error::Validation`].

use crate::error::{Error, Result};
use crate::model::AccountConfig;
use reqwest::Url;

pub const MIN_SHARE_SECS: u64 = 60;
pub const MAX_SHARE_SECS: u64 = 86_400;
pub const MAX_BUDGET_HOURS: u32 = 24;
const MAX_USERNAME_LEN: usize = 255;
const MAX_QUERY_LEN: usize = 2_000;

/// An account whose fields passed validation, ready for external calls.
#[derive(Debug, Clone)]
pub struct ValidatedAccount {
    pub base_url: Url,
    pub username: String,
    pub query: Option<String>,
    pub budget_hours: u32,
}

pub fn validate_account(account: &AccountConfig) -> Result<ValidatedAccount> {
    Ok(ValidatedAccount {
        base_url: host(&account.host)?,
        username: username(&account.username)?,
        query: query(account.query.as_deref())?,
        budget_hours: budget_hours(account.budget_hours)?,
    })
}

/// Accepts `example.atlassian.net` or a full `http(s)://` base URL.
pub fn host(raw: &str) -> Result<Url> {
    let input = raw.trim();
    if input.is_empty() {
        return Err(Error::validation("host", "must not be empty"));
    }
    // Detect the scheme before trailing slashes are stripped.
    let trimmed = input.trim_end_matches('/');
    let candidate = match input.split_once("://") {
        Some((_, rest)) if rest.trim_matches('/').is_empty() => {
            return Err(Error::validation("host", "missing host name"));
        }
        Some(_) => trimmed.to_string(),
        None => format!("https://{trimmed}"),
    };
    let url = Url::parse(&candidate)
        .map_err(|e| Error::validation("host", format!("{trimmed:?} is not a valid URL: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(Error::validation(
            "host",
            format!("unsupported scheme {:?}", url.scheme()),
        ));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::validation("host", "missing host name"));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(Error::validation("host", "must not carry a query or fragment"));
    }
    Ok(url)
}

pub fn username(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::validation("username", "must not be empty"));
    }
    if trimmed.len() > MAX_USERNAME_LEN {
        return Err(Error::validation(
            "username",
            format!("longer than {MAX_USERNAME_LEN} characters"),
        ));
    }
    if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::validation(
            "username",
            "must not contain whitespace or control characters",
        ));
    }
    Ok(trimmed.to_string())
}

pub fn budget_hours(hours: u32) -> Result<u32> {
    if hours == 0 || hours > MAX_BUDGET_HOURS {
        return Err(Error::validation(
            "budget_hours",
            format!("{hours} is outside 1..={MAX_BUDGET_HOURS}"),
        ));
    }
    Ok(hours)
}

/// Blank overrides collapse to `None` so the default query applies.
pub fn query(raw: Option<&str>) -> Result<Option<String>> {
    let Some(trimmed) = raw.map(str::trim).filter(|q| !q.is_empty()) else {
        return Ok(None);
    };
    if trimmed.len() > MAX_QUERY_LEN {
        return Err(Error::validation(
            "query",
            format!("longer than {MAX_QUERY_LEN} characters"),
        ));
    }
    Ok(Some(trimmed.to_string()))
}

/// A single worklog must be between one minute and one day.
pub fn share_seconds(seconds: u64) -> Result<u64> {
    if !(MIN_SHARE_SECS..=MAX_SHARE_SECS).contains(&seconds) {
        return Err(Error::Allocation {
            seconds,
            message: format!("outside {MIN_SHARE_SECS}..={MAX_SHARE_SECS} seconds"),
        });
    }
    Ok(seconds)
}
