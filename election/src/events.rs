//! Election event bus
//!
//! Election progress is published on a Tokio broadcast channel. Subscribers
//! see every start, refill, selection, recovered failure and termination.
//! The bot binary drains the bus into its tracing log; tests subscribe to
//! assert on loop progress. Publishing never blocks and never fails for lack
//! of subscribers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::types::{ElectionId, GuildId, MemberId, RoleId};

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Something that happened to an election.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElectionEvent {
    Started {
        guild_id: GuildId,
        election_id: ElectionId,
        members: usize,
        roles: usize,
        at: DateTime<Utc>,
    },
    /// The role pool ran dry and was refilled from the original roles.
    RolePoolRefilled {
        guild_id: GuildId,
        cycle: u32,
        roles: Vec<RoleId>,
    },
    Selected {
        guild_id: GuildId,
        cycle: u32,
        member_id: MemberId,
        role_id: RoleId,
    },
    /// Role mutation failed; the loop carried on.
    RoleMutationFailed {
        guild_id: GuildId,
        cycle: u32,
        member_id: MemberId,
        permission_denied: bool,
        message: String,
    },
    /// Result could not be written to the ontology; the loop carried on.
    ResultRecordFailed {
        guild_id: GuildId,
        cycle: u32,
        message: String,
    },
    Completed {
        guild_id: GuildId,
        election_id: ElectionId,
        selections: usize,
    },
    Cancelled {
        guild_id: GuildId,
        election_id: ElectionId,
        remaining_members: usize,
    },
}

impl ElectionEvent {
    pub fn guild_id(&self) -> GuildId {
        match self {
            Self::Started { guild_id, .. }
            | Self::RolePoolRefilled { guild_id, .. }
            | Self::Selected { guild_id, .. }
            | Self::RoleMutationFailed { guild_id, .. }
            | Self::ResultRecordFailed { guild_id, .. }
            | Self::Completed { guild_id, .. }
            | Self::Cancelled { guild_id, .. } => *guild_id,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::RolePoolRefilled { .. } => "role_pool_refilled",
            Self::Selected { .. } => "selected",
            Self::RoleMutationFailed { .. } => "role_mutation_failed",
            Self::ResultRecordFailed { .. } => "result_record_failed",
            Self::Completed { .. } => "completed",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// Whether this event ends an election.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Cancelled { .. })
    }
}

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Broadcast bus for [`ElectionEvent`]s.
pub struct EventBus {
    sender: broadcast::Sender<ElectionEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: ElectionEvent) {
        let event_type = event.event_type();
        let guild_id = event.guild_id();
        match self.sender.send(event) {
            Ok(receivers) => debug!(event_type, %guild_id, receivers, "Election event published"),
            Err(_) => debug!(event_type, %guild_id, "Election event published (no receivers)"),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ElectionEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.publish(ElectionEvent::Completed {
            guild_id: GuildId(1),
            election_id: ElectionId::new(),
            selections: 0,
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(ElectionEvent::Selected {
            guild_id: GuildId(1),
            cycle: 1,
            member_id: MemberId(2),
            role_id: RoleId(3),
        });

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "selected");
        assert_eq!(event.guild_id(), GuildId(1));
        assert!(!event.is_terminal());
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = ElectionEvent::RolePoolRefilled {
            guild_id: GuildId(1),
            cycle: 4,
            roles: vec![RoleId(10)],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "role_pool_refilled");
        assert_eq!(json["roles"][0], 10);
    }
}
