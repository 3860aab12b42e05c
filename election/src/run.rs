//! Pool state of one election.
//!
//! An [`ElectionRun`] is created by the controller and moved into its loop
//! task, which is the only code that ever mutates it. The member pool only
//! shrinks; the role pool is cyclic and refills from the original roles once
//! it runs dry.

use std::collections::BTreeMap;
use std::time::Duration;

use rand::seq::IteratorRandom;
use rand::Rng;

use crate::error::ElectionError;
use crate::types::{ChannelId, ElectionId, GuildId, Member, MemberId, Role, RoleId};

/// In-memory state of one election.
#[derive(Debug, Clone)]
pub struct ElectionRun {
    guild_id: GuildId,
    election_id: ElectionId,
    channel_id: ChannelId,
    remaining_members: BTreeMap<MemberId, Member>,
    remaining_roles: BTreeMap<RoleId, Role>,
    original_roles: BTreeMap<RoleId, Role>,
    cadence_minutes: u32,
}

impl ElectionRun {
    pub fn new(
        guild_id: GuildId,
        election_id: ElectionId,
        channel_id: ChannelId,
        members: impl IntoIterator<Item = Member>,
        roles: impl IntoIterator<Item = Role>,
        cadence_minutes: u32,
    ) -> Self {
        let original_roles: BTreeMap<RoleId, Role> =
            roles.into_iter().map(|role| (role.id, role)).collect();
        Self {
            guild_id,
            election_id,
            channel_id,
            remaining_members: members
                .into_iter()
                .map(|member| (member.id, member))
                .collect(),
            remaining_roles: original_roles.clone(),
            original_roles,
            cadence_minutes,
        }
    }

    /// Loop preconditions: both pools non-empty and a positive cadence.
    pub fn validate(&self) -> Result<(), ElectionError> {
        if self.remaining_members.is_empty() {
            return Err(ElectionError::Invariant(format!(
                "election for guild {} has no members",
                self.guild_id
            )));
        }
        if self.original_roles.is_empty() {
            return Err(ElectionError::Invariant(format!(
                "election for guild {} has no roles",
                self.guild_id
            )));
        }
        if self.cadence_minutes == 0 {
            return Err(ElectionError::Invariant(format!(
                "election for guild {} has a zero cadence",
                self.guild_id
            )));
        }
        Ok(())
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    pub fn election_id(&self) -> ElectionId {
        self.election_id
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// Time between two selections.
    pub fn cadence(&self) -> Duration {
        Duration::from_secs(u64::from(self.cadence_minutes) * 60)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_members.is_empty()
    }

    pub fn remaining_members(&self) -> impl Iterator<Item = &Member> {
        self.remaining_members.values()
    }

    pub fn remaining_member_count(&self) -> usize {
        self.remaining_members.len()
    }

    pub fn remaining_role_ids(&self) -> Vec<RoleId> {
        self.remaining_roles.keys().copied().collect()
    }

    pub fn original_role_ids(&self) -> Vec<RoleId> {
        self.original_roles.keys().copied().collect()
    }

    /// Refill an empty role pool from the original roles. Returns whether a
    /// refill happened.
    pub fn refill_roles_if_exhausted(&mut self) -> bool {
        if !self.remaining_roles.is_empty() {
            return false;
        }
        self.remaining_roles = self.original_roles.clone();
        true
    }

    /// Pick a member and a role uniformly at random from the remaining pools.
    pub fn select<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<(Member, Role)> {
        let member = self.remaining_members.values().choose(rng)?;
        let role = self.remaining_roles.values().choose(rng)?;
        Some((member.clone(), role.clone()))
    }

    /// Roles of the original pool that `member` currently holds.
    pub fn pool_roles_held_by(&self, member: &Member) -> Vec<RoleId> {
        member
            .roles
            .iter()
            .copied()
            .filter(|role| self.original_roles.contains_key(role))
            .collect()
    }

    /// Take a selected pair out of the pools.
    pub fn consume(&mut self, member: MemberId, role: RoleId) {
        self.remaining_members.remove(&member);
        self.remaining_roles.remove(&role);
    }
}
