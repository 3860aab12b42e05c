//! Guild role elections
//!
//! This library drives the "election" mini-game of the walrus bot: a
//! per-guild background task that, at a fixed cadence, picks an unused member
//! and a role from two pools, applies the role change on the chat platform,
//! announces the result and records it in the ontology, until every member has
//! been picked.
//!
//! # Components
//!
//! - [`controller::ElectionController`]: validated entry point
//!   (`initiate_election`) used by both the chat command and the HTTP API
//! - [`runner::ElectionLoop`]: the per-guild selection loop
//! - [`store::ElectionStore`]: reads election settings out of the ontology
//! - [`registry::ElectionRegistry`]: in-process guild lock table and handles to
//!   running elections
//! - [`sync::OntologySync`]: mirrors guilds, members, roles and text channels
//!   into the ontology
//!
//! The chat platform and the ontology are reached only through the
//! [`platform::GuildMembershipProvider`] and [`ontology::OntologyClient`]
//! capability traits.

#![allow(clippy::uninlined_format_args)]

pub mod controller;
pub mod error;
pub mod events;
pub mod ontology;
pub mod platform;
pub mod registry;
pub mod run;
pub mod runner;
pub mod state_machine;
pub mod store;
pub mod sync;
pub mod types;

pub use controller::{ControllerConfig, ElectionController, StartedElection};
pub use error::{ElectionError, ErrorKind};
pub use events::{ElectionEvent, EventBus, SharedEventBus};
pub use ontology::{InMemoryOntology, OntologyClient, OntologyError};
pub use platform::{GuildMembershipProvider, PlatformError};
pub use registry::{ElectionRegistry, ElectionStatus, SharedRegistry};
pub use run::ElectionRun;
pub use runner::{ElectionLoop, ElectionSummary, LoopOutcome, Selection};
pub use state_machine::{ElectionPhase, ElectionStateMachine};
pub use store::{ElectionStore, StoreError};
pub use sync::{OntologySync, SyncError, SyncReport};
pub use types::{
    ChannelCategory, ChannelId, ElectionId, ElectionResult, Guild, GuildElectionSettings, GuildId,
    Member, MemberId, OntologyMemberId, Role, RoleId, TextChannel,
};
