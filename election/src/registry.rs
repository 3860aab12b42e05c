//! In-process election registry.
//!
//! Two jobs:
//! - a guild lock table: a trigger must hold a [`Reservation`] for its guild
//!   before it reads settings, so two triggers in the same process can never
//!   both pass the live-marker check;
//! - handles to running elections, addressable by guild id, carrying the next
//!   scheduled selection time and a cancellation token.
//!
//! Cross-process exclusivity still rests on the ontology's live marker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::types::{ChannelId, ElectionId, GuildId};

/// Shared reference to ElectionRegistry
pub type SharedRegistry = Arc<ElectionRegistry>;

/// Handle to a running election.
#[derive(Debug, Clone)]
pub struct ActiveElection {
    pub election_id: ElectionId,
    pub channel_id: ChannelId,
    pub started_at: DateTime<Utc>,
    /// Updated by the loop before every sleep; `None` once it stops.
    pub next_selection: watch::Receiver<Option<DateTime<Utc>>>,
    pub cancel: CancellationToken,
}

/// Point-in-time view of a running election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElectionStatus {
    pub guild_id: GuildId,
    pub election_id: ElectionId,
    pub channel_id: ChannelId,
    pub started_at: DateTime<Utc>,
    pub next_selection_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum Slot {
    Reserved,
    Active(ActiveElection),
}

/// Guild lock table plus running election handles.
#[derive(Debug, Default)]
pub struct ElectionRegistry {
    slots: Mutex<HashMap<GuildId, Slot>>,
}

impl ElectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedRegistry {
        Arc::new(self)
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<GuildId, Slot>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim `guild`. `None` when another trigger or a running election holds it.
    pub fn try_reserve(self: &Arc<Self>, guild: GuildId) -> Option<Reservation> {
        let mut slots = self.slots();
        if slots.contains_key(&guild) {
            debug!(%guild, "Guild already reserved");
            return None;
        }
        slots.insert(guild, Slot::Reserved);
        Some(Reservation {
            registry: Arc::clone(self),
            guild,
            activated: false,
        })
    }

    /// Whether `guild` is reserved or running.
    pub fn is_busy(&self, guild: GuildId) -> bool {
        self.slots().contains_key(&guild)
    }

    /// Status of the election running in `guild`, if any.
    pub fn status(&self, guild: GuildId) -> Option<ElectionStatus> {
        match self.slots().get(&guild) {
            Some(Slot::Active(active)) => Some(ElectionStatus {
                guild_id: guild,
                election_id: active.election_id,
                channel_id: active.channel_id,
                started_at: active.started_at,
                next_selection_at: *active.next_selection.borrow(),
            }),
            _ => None,
        }
    }

    /// Number of running elections.
    pub fn active_count(&self) -> usize {
        self.slots()
            .values()
            .filter(|slot| matches!(slot, Slot::Active(_)))
            .count()
    }

    /// Request cancellation of the election running in `guild`.
    pub fn cancel(&self, guild: GuildId) -> bool {
        match self.slots().get(&guild) {
            Some(Slot::Active(active)) => {
                active.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Request cancellation of every running election. Returns how many.
    pub fn cancel_all(&self) -> usize {
        let slots = self.slots();
        let mut cancelled = 0;
        for slot in slots.values() {
            if let Slot::Active(active) = slot {
                active.cancel.cancel();
                cancelled += 1;
            }
        }
        cancelled
    }

    fn release(&self, guild: GuildId) {
        if self.slots().remove(&guild).is_some() {
            debug!(%guild, "Guild released");
        }
    }
}

/// Exclusive claim on a guild, released on drop unless activated.
#[derive(Debug)]
pub struct Reservation {
    registry: SharedRegistry,
    guild: GuildId,
    activated: bool,
}

impl Reservation {
    pub fn guild(&self) -> GuildId {
        self.guild
    }

    /// Turn the reservation into a running election. The returned lease keeps
    /// the guild claimed until it is dropped by the election task.
    pub fn activate(mut self, active: ActiveElection) -> Lease {
        self.registry
            .slots()
            .insert(self.guild, Slot::Active(active));
        self.activated = true;
        Lease {
            registry: Arc::clone(&self.registry),
            guild: self.guild,
        }
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.activated {
            self.registry.release(self.guild);
        }
    }
}

/// Claim held by a running election task.
#[derive(Debug)]
pub struct Lease {
    registry: SharedRegistry,
    guild: GuildId,
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.registry.release(self.guild);
    }
}
