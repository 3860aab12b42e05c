//! Ontology mirror sync.
//!
//! Copies the guilds the bot sees, with their roles, members, channel
//! categories and text channels, into the ontology and removes objects that no longer exist on
//! the platform. Only missing objects are written unless the sync is forced.
//! A failed write is logged and counted; it never aborts the sync.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::ontology::{
    ChannelCategoryRecord, GuildRecord, MemberRecord, ObjectKind, OntologyClient, OntologyError,
    RoleRecord, TextChannelRecord,
};
use crate::platform::{GuildMembershipProvider, PlatformError};
use crate::types::{ChannelCategory, Guild, Member, Role, RoleId, TextChannel};

/// Errors that stop a sync before it writes anything.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("could not list guilds: {0}")]
    Platform(#[from] PlatformError),

    #[error("could not list ontology objects: {0}")]
    Ontology(#[from] OntologyError),
}

/// Counts of one sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub guilds: usize,
    pub upserted: usize,
    pub deleted: usize,
    pub failures: usize,
}

/// Object ids seen on the platform, per kind. A kind whose listing failed for
/// some guild is marked incomplete and skipped by the deletion pass.
#[derive(Default)]
struct Seen {
    ids: HashMap<ObjectKind, BTreeSet<String>>,
    incomplete: HashSet<ObjectKind>,
}

impl Seen {
    fn insert(&mut self, kind: ObjectKind, id: String) {
        self.ids.entry(kind).or_default().insert(id);
    }

    fn mark_incomplete(&mut self, kind: ObjectKind) {
        self.incomplete.insert(kind);
    }

    fn is_complete(&self, kind: ObjectKind) -> bool {
        !self.incomplete.contains(&kind)
    }

    fn contains(&self, kind: ObjectKind, id: &str) -> bool {
        self.ids.get(&kind).is_some_and(|ids| ids.contains(id))
    }
}

/// Mirrors platform state into the ontology.
pub struct OntologySync {
    platform: Arc<dyn GuildMembershipProvider>,
    ontology: Arc<dyn OntologyClient>,
}

impl OntologySync {
    pub fn new(
        platform: Arc<dyn GuildMembershipProvider>,
        ontology: Arc<dyn OntologyClient>,
    ) -> Self {
        Self { platform, ontology }
    }

    /// Run one sync pass. `force` rewrites objects that already exist.
    pub async fn sync_ontology(&self, force: bool) -> Result<SyncReport, SyncError> {
        info!(force, "Syncing ontology");

        let guilds = self.platform.guilds().await?;
        let mut existing: HashMap<ObjectKind, BTreeSet<String>> = HashMap::new();
        for kind in ObjectKind::ALL {
            let ids = self.ontology.list_object_ids(kind).await?;
            existing.insert(kind, ids.into_iter().collect());
        }
        let is_missing = |kind: ObjectKind, id: &str| {
            force || !existing.get(&kind).is_some_and(|ids| ids.contains(id))
        };

        let mut report = SyncReport {
            guilds: guilds.len(),
            ..Default::default()
        };
        let mut seen = Seen::default();

        for guild in &guilds {
            info!(guild_id = %guild.id, name = %guild.name, "Syncing guild");
            let guild_key = guild.id.to_string();
            seen.insert(ObjectKind::Guild, guild_key.clone());

            if is_missing(ObjectKind::Guild, &guild_key) {
                let outcome = self.upsert_guild(guild).await;
                tally(&mut report, ObjectKind::Guild, &guild_key, outcome);
            }

            let roles = match self.platform.current_roles(guild.id).await {
                Ok(roles) => roles,
                Err(err) => {
                    warn!(guild_id = %guild.id, error = %err, "Could not list roles");
                    report.failures += 1;
                    seen.mark_incomplete(ObjectKind::Role);
                    Vec::new()
                }
            };
            for role in &roles {
                let key = role.id.to_string();
                if is_missing(ObjectKind::Role, &key) {
                    let outcome = self.ontology.upsert_role(&role_record(role)).await;
                    tally(&mut report, ObjectKind::Role, &key, outcome);
                }
                seen.insert(ObjectKind::Role, key);
            }

            match self.platform.current_members(guild.id).await {
                Ok(members) => {
                    let role_names: HashMap<RoleId, &str> = roles
                        .iter()
                        .map(|role| (role.id, role.name.as_str()))
                        .collect();
                    for member in &members {
                        let key = member.ontology_id().as_str().to_string();
                        if is_missing(ObjectKind::Member, &key) {
                            let record = member_record(member, &role_names);
                            let outcome = self.ontology.upsert_member(&record).await;
                            tally(&mut report, ObjectKind::Member, &key, outcome);
                        }
                        seen.insert(ObjectKind::Member, key);
                    }
                }
                Err(err) => {
                    warn!(guild_id = %guild.id, error = %err, "Could not list members");
                    report.failures += 1;
                    seen.mark_incomplete(ObjectKind::Member);
                }
            }

            // Categories before the text channels that link to them
            match self.platform.categories(guild.id).await {
                Ok(categories) => {
                    for category in &categories {
                        let key = category.id.to_string();
                        if is_missing(ObjectKind::ChannelCategory, &key) {
                            let record = channel_category_record(category);
                            let outcome = self.ontology.upsert_channel_category(&record).await;
                            tally(&mut report, ObjectKind::ChannelCategory, &key, outcome);
                        }
                        seen.insert(ObjectKind::ChannelCategory, key);
                    }
                }
                Err(err) => {
                    warn!(guild_id = %guild.id, error = %err, "Could not list channel categories");
                    report.failures += 1;
                    seen.mark_incomplete(ObjectKind::ChannelCategory);
                }
            }

            match self.platform.text_channels(guild.id).await {
                Ok(channels) => {
                    for channel in &channels {
                        let key = channel.id.to_string();
                        if is_missing(ObjectKind::TextChannel, &key) {
                            let record = text_channel_record(channel);
                            let outcome = self.ontology.upsert_text_channel(&record).await;
                            tally(&mut report, ObjectKind::TextChannel, &key, outcome);
                        }
                        seen.insert(ObjectKind::TextChannel, key);
                    }
                }
                Err(err) => {
                    warn!(guild_id = %guild.id, error = %err, "Could not list text channels");
                    report.failures += 1;
                    seen.mark_incomplete(ObjectKind::TextChannel);
                }
            }
        }

        // Guilds last, after their dependents
        for kind in [
            ObjectKind::Role,
            ObjectKind::Member,
            ObjectKind::TextChannel,
            ObjectKind::ChannelCategory,
            ObjectKind::Guild,
        ] {
            if !seen.is_complete(kind) {
                warn!(%kind, "Skipping stale object cleanup after incomplete listing");
                continue;
            }
            let stale: Vec<String> = existing
                .get(&kind)
                .map(|ids| {
                    ids.iter()
                        .filter(|id| !seen.contains(kind, id))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            if stale.is_empty() {
                continue;
            }
            match self.ontology.delete_objects(kind, &stale).await {
                Ok(()) => {
                    info!(%kind, count = stale.len(), "Deleted stale ontology objects");
                    report.deleted += stale.len();
                }
                Err(err) => {
                    warn!(%kind, count = stale.len(), error = %err, "Failed to delete stale objects");
                    report.failures += 1;
                }
            }
        }

        info!(
            guilds = report.guilds,
            upserted = report.upserted,
            deleted = report.deleted,
            failures = report.failures,
            "Ontology sync complete"
        );
        Ok(report)
    }

    /// Upsert a guild without touching its election settings.
    async fn upsert_guild(&self, guild: &Guild) -> Result<(), OntologyError> {
        let existing = self.ontology.get_guild(guild.id).await?;
        self.ontology
            .upsert_guild(&guild_record(guild, existing))
            .await
    }
}

fn tally(report: &mut SyncReport, kind: ObjectKind, id: &str, outcome: Result<(), OntologyError>) {
    match outcome {
        Ok(()) => {
            debug!(%kind, id, "Upserted ontology object");
            report.upserted += 1;
        }
        Err(err) => {
            warn!(%kind, id, error = %err, "Failed to upsert ontology object");
            report.failures += 1;
        }
    }
}

fn guild_record(guild: &Guild, existing: Option<GuildRecord>) -> GuildRecord {
    let existing = existing.unwrap_or_default();
    GuildRecord {
        server_id: guild.id.to_string(),
        name: Some(guild.name.clone()),
        description: guild.description.clone(),
        icon_url: guild.icon_url.clone(),
        setting_election_members: existing.setting_election_members,
        setting_election_roles: existing.setting_election_roles,
        setting_election_cadence: existing.setting_election_cadence,
        live_election_id: existing.live_election_id,
    }
}

fn member_record(member: &Member, role_names: &HashMap<RoleId, &str>) -> MemberRecord {
    MemberRecord {
        member_id: member.ontology_id().as_str().to_string(),
        name: member.name.clone(),
        is_bot: member.bot,
        linked_server_id: member.guild_id.to_string(),
        display_name: member.display_name().to_string(),
        roles_ids: member.roles.iter().map(ToString::to_string).collect(),
        roles_names: member
            .roles
            .iter()
            .filter_map(|id| role_names.get(id).map(|name| name.to_string()))
            .collect(),
    }
}

fn role_record(role: &Role) -> RoleRecord {
    RoleRecord {
        role_id: role.id.to_string(),
        linked_server_id: role.guild_id.to_string(),
        name: role.name.clone(),
    }
}

fn text_channel_record(channel: &TextChannel) -> TextChannelRecord {
    TextChannelRecord {
        channel_id: channel.id.to_string(),
        linked_server_id: channel.guild_id.to_string(),
        name: channel.name.clone(),
        linked_category_id: channel.category_id.map(|id| id.to_string()),
        position: channel.position,
    }
}

fn channel_category_record(category: &ChannelCategory) -> ChannelCategoryRecord {
    ChannelCategoryRecord {
        category_id: category.id.to_string(),
        linked_server_id: category.guild_id.to_string(),
        name: category.name.clone(),
        position: category.position,
    }
}
