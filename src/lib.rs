//! # autolog
//!
//! Daily work-log distribution. Once per scheduled tick, every enabled
//! account that has not yet logged effort for the target day gets its
//! daily budget split across the tickets it worked on, the split is
//! committed to the ticketing service, and the owner is sent a summary.
//!
//! The tick driver ([`engine::TickDriver`]) takes its collaborators
//! explicitly: a [`store::ConfigStore`], a [`ticketing::TicketingApi`], a
//! [`cipher::CredentialCipher`], and a [`messenger::Messenger`].

pub mod allocation;
pub mod cipher;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod messenger;
pub mod model;
pub mod query;
pub mod store;
pub mod telemetry;
pub mod ticketing;
pub mod validate;
