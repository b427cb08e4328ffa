//! Discord direct messages via the bot REST API.

use super::{Messenger, MessengerError};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

pub const DEFAULT_API_BASE: &str = "https://discord.com/api/v10";

/// Discord rejects message content longer than this.
pub const MESSAGE_LIMIT: usize = 2_000;

/// "Cannot send messages to this user".
const CANNOT_MESSAGE_USER: u64 = 50_007;

pub struct DiscordMessenger {
    http: Client,
    api_base: String,
    token: SecretString,
}

#[derive(Debug, Deserialize)]
struct Channel {
    id: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: u64,
    #[serde(default)]
    message: String,
}

impl DiscordMessenger {
    pub fn new(token: SecretString) -> Result<Self, MessengerError> {
        Self::with_api_base(token, DEFAULT_API_BASE)
    }

    pub fn with_api_base(
        token: SecretString,
        api_base: impl Into<String>,
    ) -> Result<Self, MessengerError> {
        let http = Client::builder()
            .user_agent(concat!("autolog/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn auth_header(&self) -> String {
        format!("Bot {}", self.token.expose_secret())
    }

    async fn api_error(resp: Response) -> MessengerError {
        let status = resp.status().as_u16();
        let body: ApiErrorBody = resp.json().await.unwrap_or_default();
        MessengerError::Api {
            status,
            message: body.message,
        }
    }

    async fn ensure_member(&self, account_id: &str, guild_id: &str) -> Result<(), MessengerError> {
        let resp = self
            .http
            .get(format!(
                "{}/guilds/{guild_id}/members/{account_id}",
                self.api_base
            ))
            .header("Authorization", self.auth_header())
            .send()
            .await?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(MessengerError::NotMember {
                account_id: account_id.to_string(),
                guild_id: guild_id.to_string(),
            }),
            _ => Err(Self::api_error(resp).await),
        }
    }

    async fn open_dm(&self, account_id: &str) -> Result<String, MessengerError> {
        let resp = self
            .http
            .post(format!("{}/users/@me/channels", self.api_base))
            .header("Authorization", self.auth_header())
            .json(&json!({ "recipient_id": account_id }))
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(Self::api_error(resp).await);
        }
        let channel: Channel = resp.json().await?;
        Ok(channel.id)
    }

    async fn post(&self, account_id: &str, channel_id: &str, content: &str) -> Result<(), MessengerError> {
        let resp = self
            .http
            .post(format!("{}/channels/{channel_id}/messages", self.api_base))
            .header("Authorization", self.auth_header())
            .json(&json!({ "content": content }))
            .send()
            .await?;
        if resp.status().is_success() {
            return Ok(());
        }
        let status = resp.status().as_u16();
        let body: ApiErrorBody = resp.json().await.unwrap_or_default();
        if body.code == CANNOT_MESSAGE_USER {
            return Err(MessengerError::DirectMessagesDisabled(account_id.to_string()));
        }
        Err(MessengerError::Api {
            status,
            message: body.message,
        })
    }
}

#[async_trait]
impl Messenger for DiscordMessenger {
    async fn send_direct(
        &self,
        account_id: &str,
        guild_id: &str,
        text: &str,
    ) -> Result<(), MessengerError> {
        self.ensure_member(account_id, guild_id).await?;
        let channel_id = self.open_dm(account_id).await?;
        for chunk in split_message(text, MESSAGE_LIMIT) {
            self.post(account_id, &channel_id, &chunk).await?;
        }
        Ok(())
    }
}

/// Split `text` into pieces of at most `limit` characters, preferring line
/// boundaries. Lines longer than `limit` are cut mid-line.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.lines() {
        let line_len = line.chars().count();
        let needed = if current.is_empty() { line_len } else { line_len + 1 };
        if current_len + needed <= limit {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
            current_len += needed;
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        let chars: Vec<char> = line.chars().collect();
        let mut pieces = chars.chunks(limit.max(1)).peekable();
        while let Some(piece) = pieces.next() {
            let piece: String = piece.iter().collect();
            if pieces.peek().is_some() {
                chunks.push(piece);
            } else {
                current_len = piece.chars().count();
                current = piece;
            }
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
