//! Direct messages to account owners.

pub mod discord;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

pub use discord::DiscordMessenger;

#[derive(Debug, Error)]
pub enum MessengerError {
    #[error("user {account_id} is not a member of guild {guild_id}")]
    NotMember { account_id: String, guild_id: String },

    #[error("user {0} does not accept direct messages")]
    DirectMessagesDisabled(String),

    #[error("chat api returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("chat transport error: {0}")]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait Messenger: Send + Sync {
    async fn send_direct(
        &self,
        account_id: &str,
        guild_id: &str,
        text: &str,
    ) -> std::result::Result<(), MessengerError>;
}

/// Writes messages to the log instead of delivering them. Used when no
/// chat credentials are configured.
pub struct LogMessenger;

#[async_trait]
impl Messenger for LogMessenger {
    async fn send_direct(
        &self,
        account_id: &str,
        guild_id: &str,
        text: &str,
    ) -> std::result::Result<(), MessengerError> {
        info!(account_id, guild_id, "direct message (not delivered):\n{text}");
        Ok(())
    }
}
