//! Ontology capability: durable guild settings, live-election markers,
//! election results, and the mirrored guild/member/role/channel objects.
//!
//! Object shapes follow the ontology's property api names, so records
//! (de)serialize directly to and from the wire.

mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ElectionId, ElectionResult, GuildId};

pub use memory::InMemoryOntology;

/// Sentinel some records carry instead of an absent live-election id.
pub const NO_LIVE_ELECTION: &str = "none";

/// Errors from the ontology.
#[derive(Debug, Clone, Error)]
pub enum OntologyError {
    /// A conditional write found conflicting state (e.g. a live marker).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The ontology validated the action and rejected it.
    #[error("action rejected: {0}")]
    Rejected(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("decode error: {0}")]
    Decode(String),
}

/// Mirrored object types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Guild,
    Member,
    Role,
    TextChannel,
    ChannelCategory,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 5] = [
        Self::Guild,
        Self::Member,
        Self::Role,
        Self::TextChannel,
        Self::ChannelCategory,
    ];

    /// Object type api name.
    pub fn object_type(self) -> &'static str {
        match self {
            Self::Guild => "Guild",
            Self::Member => "Member",
            Self::Role => "Role",
            Self::TextChannel => "TextChannel",
            Self::ChannelCategory => "ChannelCategory",
        }
    }

    /// Primary key property.
    pub fn primary_key(self) -> &'static str {
        match self {
            Self::Guild => "server_id",
            Self::Member => "member_id",
            Self::Role => "role_id",
            Self::TextChannel => "channel_id",
            Self::ChannelCategory => "category_id",
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.object_type())
    }
}

/// `Guild` object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuildRecord {
    pub server_id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub icon_url: Option<String>,
    pub setting_election_members: Vec<String>,
    pub setting_election_roles: Vec<String>,
    pub setting_election_cadence: Option<i64>,
    pub live_election_id: Option<String>,
}

impl GuildRecord {
    /// Live-election marker, treating the `"none"` sentinel and blanks as absent.
    pub fn live_election(&self) -> Option<&str> {
        self.live_election_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty() && !id.eq_ignore_ascii_case(NO_LIVE_ELECTION))
    }
}

/// `Member` object, keyed by the derived per-guild member id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberRecord {
    pub member_id: String,
    pub name: String,
    pub is_bot: bool,
    pub linked_server_id: String,
    pub display_name: String,
    pub roles_ids: Vec<String>,
    pub roles_names: Vec<String>,
}

/// `Role` object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleRecord {
    pub role_id: String,
    pub linked_server_id: String,
    pub name: String,
}

/// `TextChannel` object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextChannelRecord {
    pub channel_id: String,
    pub linked_server_id: String,
    pub name: String,
    pub linked_category_id: Option<String>,
    pub position: i64,
}

/// `ChannelCategory` object, referenced by `TextChannelRecord::linked_category_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelCategoryRecord {
    pub category_id: String,
    pub linked_server_id: String,
    pub name: String,
    pub position: i64,
}

/// Durable store behind the election engine and the mirror sync.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OntologyClient: Send + Sync {
    /// Fetch the `Guild` object; `None` when the guild has no record.
    async fn get_guild(&self, guild: GuildId) -> Result<Option<GuildRecord>, OntologyError>;

    /// Set the guild's live-election marker.
    ///
    /// Fails with [`OntologyError::Conflict`] when a marker is already set.
    /// Implementations without a conditional write check then write, which
    /// leaves a window between the two.
    async fn begin_election(&self, guild: GuildId, election: ElectionId)
        -> Result<(), OntologyError>;

    /// Clear the guild's live-election marker if it still names `election`.
    ///
    /// An already cleared marker is a no-op; a marker naming another
    /// election fails with [`OntologyError::Conflict`] and is left alone.
    async fn end_election(&self, guild: GuildId, election: ElectionId)
        -> Result<(), OntologyError>;

    /// Append one election result.
    async fn record_election_result(&self, result: &ElectionResult) -> Result<(), OntologyError>;

    /// Primary keys of every object of `kind`.
    async fn list_object_ids(&self, kind: ObjectKind) -> Result<Vec<String>, OntologyError>;

    async fn upsert_guild(&self, record: &GuildRecord) -> Result<(), OntologyError>;

    async fn upsert_member(&self, record: &MemberRecord) -> Result<(), OntologyError>;

    async fn upsert_role(&self, record: &RoleRecord) -> Result<(), OntologyError>;

    async fn upsert_text_channel(&self, record: &TextChannelRecord) -> Result<(), OntologyError>;

    async fn upsert_channel_category(
        &self,
        record: &ChannelCategoryRecord,
    ) -> Result<(), OntologyError>;

    /// Delete objects of `kind` by primary key. An empty slice is a no-op.
    async fn delete_objects(&self, kind: ObjectKind, ids: &[String]) -> Result<(), OntologyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_election_sentinels() {
        let mut record = GuildRecord::default();
        assert_eq!(record.live_election(), None);

        record.live_election_id = Some("none".into());
        assert_eq!(record.live_election(), None);

        record.live_election_id = Some("  ".into());
        assert_eq!(record.live_election(), None);

        record.live_election_id = Some("7f3c".into());
        assert_eq!(record.live_election(), Some("7f3c"));
    }

    #[test]
    fn guild_record_tolerates_missing_fields() {
        let record: GuildRecord = serde_json::from_str(
            r#"{"server_id": "12", "setting_election_cadence": 30, "__rid": "ri.x"}"#,
        )
        .unwrap();
        assert_eq!(record.server_id, "12");
        assert_eq!(record.setting_election_cadence, Some(30));
        assert!(record.setting_election_members.is_empty());
        assert!(record.live_election_id.is_none());
    }

    #[test]
    fn object_kind_names() {
        assert_eq!(ObjectKind::TextChannel.object_type(), "TextChannel");
        assert_eq!(ObjectKind::Member.primary_key(), "member_id");
        assert_eq!(ObjectKind::Guild.to_string(), "Guild");
        assert_eq!(ObjectKind::ChannelCategory.primary_key(), "category_id");
    }
}
