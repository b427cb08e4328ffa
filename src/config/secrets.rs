//! Secret handling utilities.
//!
//! Re-exports the secrecy types used for the database URL, the cipher key,
//! the chat bot token, and decrypted ticketing tokens.

pub use secrecy::{ExposeSecret, SecretString};
