//! In-process ontology.
//!
//! Backs the bot's `--in-memory-ontology` mode and the test suites. Unlike the
//! remote client, [`OntologyClient::begin_election`] is a true compare-and-set
//! here because every operation runs under one lock.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use super::{
    ChannelCategoryRecord, GuildRecord, MemberRecord, ObjectKind, OntologyClient, OntologyError,
    RoleRecord, TextChannelRecord,
};
use crate::types::{ElectionId, ElectionResult, GuildId};

#[derive(Debug, Default)]
struct State {
    guilds: BTreeMap<String, GuildRecord>,
    members: BTreeMap<String, MemberRecord>,
    roles: BTreeMap<String, RoleRecord>,
    text_channels: BTreeMap<String, TextChannelRecord>,
    categories: BTreeMap<String, ChannelCategoryRecord>,
    results: Vec<ElectionResult>,
}

/// Ontology kept in memory.
#[derive(Debug, Default)]
pub struct InMemoryOntology {
    state: Mutex<State>,
}

impl InMemoryOntology {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert or replace a guild record.
    pub fn insert_guild(&self, record: GuildRecord) {
        self.state().guilds.insert(record.server_id.clone(), record);
    }

    pub fn guild(&self, guild: GuildId) -> Option<GuildRecord> {
        self.state().guilds.get(&guild.to_string()).cloned()
    }

    /// Current live-election marker of `guild`.
    pub fn live_election(&self, guild: GuildId) -> Option<String> {
        self.guild(guild)
            .and_then(|record| record.live_election().map(str::to_string))
    }

    /// Every recorded result, in insertion order.
    pub fn results(&self) -> Vec<ElectionResult> {
        self.state().results.clone()
    }

    pub fn member(&self, member_id: &str) -> Option<MemberRecord> {
        self.state().members.get(member_id).cloned()
    }

    pub fn role(&self, role_id: &str) -> Option<RoleRecord> {
        self.state().roles.get(role_id).cloned()
    }

    pub fn text_channel(&self, channel_id: &str) -> Option<TextChannelRecord> {
        self.state().text_channels.get(channel_id).cloned()
    }

    pub fn channel_category(&self, category_id: &str) -> Option<ChannelCategoryRecord> {
        self.state().categories.get(category_id).cloned()
    }
}

#[async_trait]
impl OntologyClient for InMemoryOntology {
    async fn get_guild(&self, guild: GuildId) -> Result<Option<GuildRecord>, OntologyError> {
        Ok(self.guild(guild))
    }

    async fn begin_election(
        &self,
        guild: GuildId,
        election: ElectionId,
    ) -> Result<(), OntologyError> {
        let mut state = self.state();
        let record = state
            .guilds
            .get_mut(&guild.to_string())
            .ok_or_else(|| OntologyError::Rejected(format!("no Guild object for {}", guild)))?;

        if let Some(live) = record.live_election() {
            return Err(OntologyError::Conflict(format!(
                "guild {} already has live election {}",
                guild, live
            )));
        }

        record.live_election_id = Some(election.to_string());
        Ok(())
    }

    async fn end_election(
        &self,
        guild: GuildId,
        election: ElectionId,
    ) -> Result<(), OntologyError> {
        let mut state = self.state();
        let record = state
            .guilds
            .get_mut(&guild.to_string())
            .ok_or_else(|| OntologyError::Rejected(format!("no Guild object for {}", guild)))?;

        match record.live_election() {
            None => Ok(()),
            Some(live) if live == election.to_string() => {
                record.live_election_id = None;
                Ok(())
            }
            Some(live) => Err(OntologyError::Conflict(format!(
                "guild {} marker belongs to election {}, not {}",
                guild, live, election
            ))),
        }
    }

    async fn record_election_result(&self, result: &ElectionResult) -> Result<(), OntologyError> {
        self.state().results.push(result.clone());
        Ok(())
    }

    async fn list_object_ids(&self, kind: ObjectKind) -> Result<Vec<String>, OntologyError> {
        let state = self.state();
        let ids = match kind {
            ObjectKind::Guild => state.guilds.keys().cloned().collect(),
            ObjectKind::Member => state.members.keys().cloned().collect(),
            ObjectKind::Role => state.roles.keys().cloned().collect(),
            ObjectKind::TextChannel => state.text_channels.keys().cloned().collect(),
            ObjectKind::ChannelCategory => state.categories.keys().cloned().collect(),
        };
        Ok(ids)
    }

    async fn upsert_guild(&self, record: &GuildRecord) -> Result<(), OntologyError> {
        self.insert_guild(record.clone());
        Ok(())
    }

    async fn upsert_member(&self, record: &MemberRecord) -> Result<(), OntologyError> {
        self.state()
            .members
            .insert(record.member_id.clone(), record.clone());
        Ok(())
    }

    async fn upsert_role(&self, record: &RoleRecord) -> Result<(), OntologyError> {
        self.state()
            .roles
            .insert(record.role_id.clone(), record.clone());
        Ok(())
    }

    async fn upsert_text_channel(&self, record: &TextChannelRecord) -> Result<(), OntologyError> {
        self.state()
            .text_channels
            .insert(record.channel_id.clone(), record.clone());
        Ok(())
    }

    async fn upsert_channel_category(
        &self,
        record: &ChannelCategoryRecord,
    ) -> Result<(), OntologyError> {
        self.state()
            .categories
            .insert(record.category_id.clone(), record.clone());
        Ok(())
    }

    async fn delete_objects(&self, kind: ObjectKind, ids: &[String]) -> Result<(), OntologyError> {
        let mut state = self.state();
        for id in ids {
            match kind {
                ObjectKind::Guild => {
                    state.guilds.remove(id);
                }
                ObjectKind::Member => {
                    state.members.remove(id);
                }
                ObjectKind::Role => {
                    state.roles.remove(id);
                }
                ObjectKind::TextChannel => {
                    state.text_channels.remove(id);
                }
                ObjectKind::ChannelCategory => {
                    state.categories.remove(id);
                }
            }
        }
        Ok(())
    }
}
