//! Identifiers and platform value types.
//!
//! Platform objects (guilds, channels, members, roles) are plain immutable
//! values snapshotted from the chat platform. Identifiers are Discord-style
//! snowflakes (`u64`) wrapped in newtypes so a role id can never be passed
//! where a member id is expected.

use std::collections::BTreeSet;
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Error returned when a string is not a valid snowflake.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{input}' is not a valid {kind} id: {source}")]
pub struct ParseIdError {
    pub kind: &'static str,
    pub input: String,
    #[source]
    pub source: ParseIntError,
}

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<u64>().map($name).map_err(|source| ParseIdError {
                    kind: $kind,
                    input: s.to_string(),
                    source,
                })
            }
        }
    };
}

snowflake_id!(
    /// A chat-platform guild (server).
    GuildId,
    "guild"
);
snowflake_id!(
    /// A text channel inside a guild.
    ChannelId,
    "channel"
);
snowflake_id!(
    /// A platform user id. The same user has the same id in every guild.
    MemberId,
    "member"
);
snowflake_id!(
    /// A role inside a guild.
    RoleId,
    "role"
);

/// Per-guild member identifier used by the ontology.
///
/// The raw platform id is shared by a user across all guilds, so the
/// ontology keys members as `{guild_id}_{member_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OntologyMemberId(String);

impl OntologyMemberId {
    pub fn derive(guild: GuildId, member: MemberId) -> Self {
        Self(format!("{}_{}", guild, member))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for OntologyMemberId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for OntologyMemberId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for OntologyMemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one election run, written as the guild's live-election marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElectionId(Uuid);

impl ElectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ElectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ElectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A guild as seen by the bot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    pub id: GuildId,
    pub name: String,
    pub owner_id: MemberId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

/// A text channel of a guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChannel {
    pub id: ChannelId,
    pub guild_id: GuildId,
    pub name: String,
    /// Parent category, if the channel sits in one.
    #[serde(default)]
    pub category_id: Option<ChannelId>,
    #[serde(default)]
    pub position: i64,
}

/// A channel category grouping text channels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelCategory {
    pub id: ChannelId,
    pub guild_id: GuildId,
    pub name: String,
    #[serde(default)]
    pub position: i64,
}

/// A guild member snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub guild_id: GuildId,
    /// Account name.
    pub name: String,
    /// Guild-specific nickname.
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub bot: bool,
    /// Roles currently held by the member.
    #[serde(default)]
    pub roles: Vec<RoleId>,
}

impl Member {
    /// Nickname when set, account name otherwise.
    pub fn display_name(&self) -> &str {
        self.nick.as_deref().unwrap_or(&self.name)
    }

    /// Platform mention markup for this member.
    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }

    pub fn ontology_id(&self) -> OntologyMemberId {
        OntologyMemberId::derive(self.guild_id, self.id)
    }
}

/// A guild role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub guild_id: GuildId,
    pub name: String,
}

/// Election settings of one guild, as read from the ontology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildElectionSettings {
    pub guild_id: GuildId,
    /// Derived member ids eligible for selection.
    pub eligible_member_ids: BTreeSet<OntologyMemberId>,
    pub eligible_role_ids: BTreeSet<RoleId>,
    /// Minutes between two selections. `None` when the guild never set it.
    pub cadence_minutes: Option<u32>,
    /// Marker of the election currently running for this guild, if any.
    pub live_election: Option<String>,
}

impl GuildElectionSettings {
    pub fn has_live_election(&self) -> bool {
        self.live_election.is_some()
    }
}

/// One selection, appended to the ontology after every cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionResult {
    pub guild_id: GuildId,
    pub member_id: OntologyMemberId,
    pub role_id: RoleId,
    pub recorded_at: DateTime<Utc>,
}

impl ElectionResult {
    pub fn new(guild_id: GuildId, member_id: OntologyMemberId, role_id: RoleId) -> Self {
        Self {
            guild_id,
            member_id,
            role_id,
            recorded_at: Utc::now(),
        }
    }
}
