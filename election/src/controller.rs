//! Election controller
//!
//! Validated entry point shared by the chat command and the HTTP trigger.
//! `initiate_election` runs every check synchronously, so callers see
//! resolution and state failures directly; only a fully validated election
//! reaches the background loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::error::ElectionError;
use crate::events::{ElectionEvent, SharedEventBus};
use crate::ontology::{OntologyClient, OntologyError};
use crate::platform::{send_long_message, GuildMembershipProvider};
use crate::registry::{ActiveElection, ElectionStatus, SharedRegistry};
use crate::run::ElectionRun;
use crate::runner::{ElectionLoop, ElectionSummary};
use crate::state_machine::{ElectionPhase, ElectionStateMachine};
use crate::store::ElectionStore;
use crate::types::{ChannelId, ElectionId, Guild, GuildId, Member, Role, TextChannel};

/// Channel used when a trigger names none.
pub const DEFAULT_FALLBACK_CHANNEL: &str = "general";

/// Controller settings.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Name of the text channel announcements go to when no channel is given.
    pub fallback_channel: String,
    /// Fixed RNG seed. Each election derives its own stream from it.
    pub rng_seed: Option<u64>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            fallback_channel: DEFAULT_FALLBACK_CHANNEL.to_string(),
            rng_seed: None,
        }
    }
}

/// An election that passed validation and is now running.
pub struct StartedElection {
    pub guild: Guild,
    pub channel: TextChannel,
    pub election_id: ElectionId,
    pub members: Vec<Member>,
    pub roles: Vec<Role>,
    /// The loop task. Dropping the handle detaches it.
    pub handle: JoinHandle<Result<ElectionSummary, ElectionError>>,
}

/// Starts elections and keeps track of their tasks.
pub struct ElectionController {
    platform: Arc<dyn GuildMembershipProvider>,
    ontology: Arc<dyn OntologyClient>,
    store: ElectionStore,
    registry: SharedRegistry,
    events: SharedEventBus,
    config: ControllerConfig,
    tracker: TaskTracker,
    elections_started: AtomicU64,
}

impl ElectionController {
    pub fn new(
        platform: Arc<dyn GuildMembershipProvider>,
        ontology: Arc<dyn OntologyClient>,
        registry: SharedRegistry,
        events: SharedEventBus,
        config: ControllerConfig,
    ) -> Self {
        Self {
            store: ElectionStore::new(Arc::clone(&ontology)),
            platform,
            ontology,
            registry,
            events,
            config,
            tracker: TaskTracker::new(),
            elections_started: AtomicU64::new(0),
        }
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn events(&self) -> &SharedEventBus {
        &self.events
    }

    /// Status of the election running in `guild`, if any.
    pub fn status(&self, guild: GuildId) -> Option<ElectionStatus> {
        self.registry.status(guild)
    }

    /// Validate and start an election for `guild_id`.
    ///
    /// `channel_id` selects the announcement channel; without it the guild's
    /// fallback channel (`general` by default) is used. The loop is spawned
    /// but not awaited.
    pub async fn initiate_election(
        &self,
        guild_id: &str,
        channel_id: Option<&str>,
    ) -> Result<StartedElection, ElectionError> {
        let (guild, channel) = self.resolve(guild_id, channel_id).await?;
        let guild_id = guild.id;

        let mut machine = ElectionStateMachine::new();
        advance(&mut machine, ElectionPhase::Validating, "trigger resolved")?;

        // Held until the loop takes over or validation fails.
        let reservation = self
            .registry
            .try_reserve(guild_id)
            .ok_or(ElectionError::AlreadyInProgress(guild_id))?;

        let settings = self.store.settings(guild_id).await.map_err(|e| {
            ElectionError::state(format!(
                "could not read election settings for '{}' (id: {}): {}",
                guild.name, guild_id, e
            ))
        })?;

        if settings.has_live_election() {
            return Err(ElectionError::AlreadyInProgress(guild_id));
        }

        let cadence_minutes = settings.cadence_minutes.ok_or_else(|| {
            ElectionError::state(format!(
                "'{}' (id: {}) has no election cadence configured",
                guild.name, guild_id
            ))
        })?;

        let members: Vec<Member> = self
            .platform
            .current_members(guild_id)
            .await
            .map_err(|e| ElectionError::state(format!("could not list guild members: {}", e)))?
            .into_iter()
            .filter(|member| settings.eligible_member_ids.contains(&member.ontology_id()))
            .collect();
        let roles: Vec<Role> = self
            .platform
            .current_roles(guild_id)
            .await
            .map_err(|e| ElectionError::state(format!("could not list guild roles: {}", e)))?
            .into_iter()
            .filter(|role| settings.eligible_role_ids.contains(&role.id))
            .collect();

        info!(
            %guild_id,
            members = members.len(),
            roles = roles.len(),
            cadence_minutes,
            "Election pools built"
        );

        if members.is_empty() {
            return Err(ElectionError::state(format!(
                "'{}' (id: {}) has no eligible members for an election",
                guild.name, guild_id
            )));
        }
        if roles.is_empty() {
            return Err(ElectionError::state(format!(
                "'{}' (id: {}) has no eligible roles for an election",
                guild.name, guild_id
            )));
        }

        let run = ElectionRun::new(
            guild_id,
            ElectionId::new(),
            channel.id,
            members.iter().cloned(),
            roles.iter().cloned(),
            cadence_minutes,
        );
        run.validate()?;
        let election_id = run.election_id();

        self.ontology
            .begin_election(guild_id, election_id)
            .await
            .map_err(|e| match e {
                OntologyError::Conflict(_) => ElectionError::AlreadyInProgress(guild_id),
                other => ElectionError::state(format!(
                    "could not mark the election as live: {}",
                    other
                )),
            })?;

        advance(&mut machine, ElectionPhase::Running, "live marker set")?;

        let cancel = CancellationToken::new();
        let (schedule, next_selection) = watch::channel(None);
        let lease = reservation.activate(ActiveElection {
            election_id,
            channel_id: channel.id,
            started_at: Utc::now(),
            next_selection,
            cancel: cancel.clone(),
        });

        let election = ElectionLoop::new(
            run,
            Arc::clone(&self.platform),
            Arc::clone(&self.ontology),
            Arc::clone(&self.events),
            self.rng(),
            machine,
            cancel,
            schedule,
        );
        let handle = self.tracker.spawn(async move {
            let _lease = lease;
            let result = election.run().await;
            if let Err(err) = &result {
                error!(%guild_id, error = %err, "Election loop failed");
            }
            result
        });

        info!(%guild_id, %election_id, channel_id = %channel.id, "Election loop started in background");

        let announcement = pool_announcement(&members, &roles);
        if let Err(err) = send_long_message(self.platform.as_ref(), channel.id, &announcement).await {
            warn!(%guild_id, channel_id = %channel.id, error = %err, "Failed to announce election pools");
        }

        self.events.publish(ElectionEvent::Started {
            guild_id,
            election_id,
            members: members.len(),
            roles: roles.len(),
            at: Utc::now(),
        });

        Ok(StartedElection {
            guild,
            channel,
            election_id,
            members,
            roles,
            handle,
        })
    }

    /// Cancel every running election and wait for their loops to wind down.
    pub async fn shutdown(&self) {
        let cancelled = self.registry.cancel_all();
        info!(cancelled, "Shutting down elections");
        self.tracker.close();
        self.tracker.wait().await;
    }

    async fn resolve(
        &self,
        guild_id: &str,
        channel_id: Option<&str>,
    ) -> Result<(Guild, TextChannel), ElectionError> {
        let parsed_guild: GuildId = guild_id
            .trim()
            .parse()
            .map_err(|e| ElectionError::resolution(format!("invalid server id: {}", e)))?;

        let guild = self
            .platform
            .resolve_guild(parsed_guild)
            .await
            .map_err(|e| {
                ElectionError::resolution(format!("could not resolve server {}: {}", parsed_guild, e))
            })?
            .ok_or_else(|| ElectionError::resolution(format!("unknown server {}", parsed_guild)))?;

        let channel = match channel_id {
            Some(raw) => {
                let parsed_channel: ChannelId = raw
                    .trim()
                    .parse()
                    .map_err(|e| ElectionError::resolution(format!("invalid channel id: {}", e)))?;
                self.platform
                    .resolve_channel(guild.id, parsed_channel)
                    .await
                    .map_err(|e| {
                        ElectionError::resolution(format!(
                            "could not resolve channel {}: {}",
                            parsed_channel, e
                        ))
                    })?
                    .ok_or_else(|| {
                        ElectionError::resolution(format!(
                            "channel {} is not a text channel of '{}'",
                            parsed_channel, guild.name
                        ))
                    })?
            }
            None => self
                .platform
                .text_channels(guild.id)
                .await
                .map_err(|e| {
                    ElectionError::resolution(format!(
                        "could not list channels of '{}': {}",
                        guild.name, e
                    ))
                })?
                .into_iter()
                .find(|channel| channel.name == self.config.fallback_channel)
                .ok_or_else(|| {
                    ElectionError::resolution(format!(
                        "no channel id provided and '{}' has no `{}` channel",
                        guild.name, self.config.fallback_channel
                    ))
                })?,
        };

        Ok((guild, channel))
    }

    fn rng(&self) -> StdRng {
        let n = self.elections_started.fetch_add(1, Ordering::Relaxed);
        match self.config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(n)),
            None => StdRng::from_entropy(),
        }
    }
}

fn advance(
    machine: &mut ElectionStateMachine,
    to: ElectionPhase,
    reason: &str,
) -> Result<(), ElectionError> {
    machine
        .advance(to, Some(reason))
        .map_err(|e| ElectionError::Invariant(e.to_string()))
}

/// Start-of-election message listing both pools.
pub fn pool_announcement(members: &[Member], roles: &[Role]) -> String {
    let mut message = String::from("@everyone **Election has started!**\n```members:\n");
    for member in members {
        message.push_str(&format!("- {} ({})\n", member.display_name(), member.name));
    }
    message.push_str("roles:\n");
    for role in roles {
        message.push_str(&format!("- {}\n", role.name));
    }
    message.push_str("```");
    message
}
