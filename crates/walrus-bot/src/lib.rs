//! Walrus guild bot
//!
//! Binds the `election` engine to its outside world:
//!
//! - [`discord::DiscordClient`]: Discord REST implementation of
//!   `GuildMembershipProvider`
//! - [`foundry::FoundryClient`]: Foundry ontology implementation of
//!   `OntologyClient`
//! - [`api`]: HTTP trigger, status and gateway relay routes
//! - [`commands`]: `election` / `nextresult` chat commands
//! - [`config`]: TOML + environment configuration
//! - [`event_log`]: election events written to the tracing log

#![allow(clippy::uninlined_format_args)]

pub mod api;
pub mod commands;
pub mod config;
pub mod discord;
pub mod event_log;
pub mod foundry;

pub use config::BotConfig;
