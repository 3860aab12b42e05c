//! The election loop.
//!
//! One [`ElectionLoop`] drives one [`ElectionRun`] from its first selection
//! to exhaustion:
//!
//! ```text
//! RUNNING --(members empty)--> EXHAUSTED --> TERMINATING --> COMPLETE
//! RUNNING --(sleep, select, mutate roles, record)--> RUNNING
//! any     --(cancelled)--> ABORTED
//! ```
//!
//! Cycles are strictly sequential. A failed role mutation or result write is
//! reported and logged, never fatal: one member's failure must not stop the
//! election for everybody else.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::ElectionError;
use crate::events::{ElectionEvent, SharedEventBus};
use crate::ontology::OntologyClient;
use crate::platform::{send_long_message, GuildMembershipProvider};
use crate::run::ElectionRun;
use crate::state_machine::{ElectionPhase, ElectionStateMachine, TransitionRecord};
use crate::types::{ElectionId, ElectionResult, GuildId, Member, MemberId, Role, RoleId};

/// How a loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopOutcome {
    Completed,
    Cancelled,
}

/// One cycle's selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Selection {
    pub cycle: u32,
    pub member_id: MemberId,
    pub role_id: RoleId,
    /// Role change went through on the platform.
    pub role_applied: bool,
    /// Result reached the ontology.
    pub recorded: bool,
}

/// What a finished loop did.
#[derive(Debug, Clone, Serialize)]
pub struct ElectionSummary {
    pub guild_id: GuildId,
    pub election_id: ElectionId,
    pub outcome: LoopOutcome,
    pub selections: Vec<Selection>,
    pub role_refills: u32,
    pub transitions: Vec<TransitionRecord>,
}

/// Long-lived task state for one election.
pub struct ElectionLoop {
    run: ElectionRun,
    platform: Arc<dyn GuildMembershipProvider>,
    ontology: Arc<dyn OntologyClient>,
    events: SharedEventBus,
    rng: StdRng,
    machine: ElectionStateMachine,
    cancel: CancellationToken,
    schedule: watch::Sender<Option<DateTime<Utc>>>,
}

impl ElectionLoop {
    /// `machine` must already be in [`ElectionPhase::Running`].
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        run: ElectionRun,
        platform: Arc<dyn GuildMembershipProvider>,
        ontology: Arc<dyn OntologyClient>,
        events: SharedEventBus,
        rng: StdRng,
        machine: ElectionStateMachine,
        cancel: CancellationToken,
        schedule: watch::Sender<Option<DateTime<Utc>>>,
    ) -> Self {
        Self {
            run,
            platform,
            ontology,
            events,
            rng,
            machine,
            cancel,
            schedule,
        }
    }

    /// Run until the member pool is drained or the loop is cancelled.
    pub async fn run(mut self) -> Result<ElectionSummary, ElectionError> {
        if let Err(err) = self.run.validate() {
            if let Err(transition) = self.machine.abort(&err.to_string()) {
                warn!(
                    guild_id = %self.run.guild_id(),
                    error = %transition,
                    "Unexpected election transition"
                );
            }
            error!(guild_id = %self.run.guild_id(), error = %err, "Refusing to start election loop");
            return Err(err);
        }
        if self.machine.current() != ElectionPhase::Running {
            return Err(ElectionError::Invariant(format!(
                "election loop started in phase {}",
                self.machine.current()
            )));
        }

        let guild_id = self.run.guild_id();
        let mut selections = Vec::new();
        let mut role_refills = 0;
        let mut cycle = 0;

        info!(
            %guild_id,
            election_id = %self.run.election_id(),
            members = self.run.remaining_member_count(),
            cadence_secs = self.run.cadence().as_secs(),
            "Election loop started"
        );

        while !self.run.is_exhausted() {
            cycle += 1;
            self.machine.set_cycle(cycle);

            if !self.wait_for_next_selection().await {
                return Ok(self.cancelled(selections, role_refills).await);
            }

            if self.run.refill_roles_if_exhausted() {
                role_refills += 1;
                info!(%guild_id, cycle, "Role pool exhausted, refilled from original roles");
                self.events.publish(ElectionEvent::RolePoolRefilled {
                    guild_id,
                    cycle,
                    roles: self.run.remaining_role_ids(),
                });
            }

            let Some((member, role)) = self.run.select(&mut self.rng) else {
                return Err(ElectionError::Invariant(format!(
                    "nothing to select in cycle {} for guild {}",
                    cycle, guild_id
                )));
            };

            info!(%guild_id, cycle, member_id = %member.id, role_id = %role.id, "Election selection");
            self.events.publish(ElectionEvent::Selected {
                guild_id,
                cycle,
                member_id: member.id,
                role_id: role.id,
            });
            self.announce(&format!(
                "@everyone **New Election Result**: {} is assigned the role of `{}`",
                member.mention(),
                role.name
            ))
            .await;

            let role_applied = self.apply_roles(cycle, &member, &role).await;

            self.run.consume(member.id, role.id);

            let recorded = self.record(cycle, &member, &role).await;

            selections.push(Selection {
                cycle,
                member_id: member.id,
                role_id: role.id,
                role_applied,
                recorded,
            });
        }

        Ok(self.complete(selections, role_refills).await)
    }

    /// Sleep one cadence. Returns `false` if cancelled while waiting.
    async fn wait_for_next_selection(&mut self) -> bool {
        let cadence = self.run.cadence();
        let next_at = chrono::Duration::from_std(cadence)
            .ok()
            .map(|delay| Utc::now() + delay);
        self.schedule.send_replace(next_at);

        tokio::select! {
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(cadence) => true,
        }
    }

    /// Strip every pool role the member holds, then grant the chosen one.
    async fn apply_roles(&self, cycle: u32, member: &Member, role: &Role) -> bool {
        let guild_id = self.run.guild_id();
        let live = self.live_member(cycle, member).await;
        let remove = self.run.pool_roles_held_by(live.as_ref().unwrap_or(member));

        match self
            .platform
            .mutate_roles(guild_id, member.id, &remove, role.id)
            .await
        {
            Ok(()) => true,
            Err(err) => {
                let permission_denied = err.is_permission_denied();
                warn!(
                    %guild_id,
                    cycle,
                    member_id = %member.id,
                    permission_denied,
                    error = %err,
                    "Failed to update member roles"
                );
                self.events.publish(ElectionEvent::RoleMutationFailed {
                    guild_id,
                    cycle,
                    member_id: member.id,
                    permission_denied,
                    message: err.to_string(),
                });
                if permission_denied {
                    self.announce(&format!(
                        "I don't have permission to update `{}`'s roles, you'll have to update \
                         their role manually",
                        member.display_name()
                    ))
                    .await;
                }
                false
            }
        }
    }

    /// Current platform state of `member`. Roles may have changed by hand
    /// since the pools were built; `None` falls back to that snapshot.
    async fn live_member(&self, cycle: u32, member: &Member) -> Option<Member> {
        let guild_id = self.run.guild_id();
        match self.platform.resolve_member(guild_id, member.id).await {
            Ok(Some(live)) => Some(live),
            Ok(None) => {
                warn!(
                    %guild_id,
                    cycle,
                    member_id = %member.id,
                    "Selected member is no longer in the guild"
                );
                None
            }
            Err(err) => {
                warn!(
                    %guild_id,
                    cycle,
                    member_id = %member.id,
                    error = %err,
                    "Could not refresh member roles, using pool snapshot"
                );
                None
            }
        }
    }

    /// Best-effort result write.
    async fn record(&self, cycle: u32, member: &Member, role: &Role) -> bool {
        let guild_id = self.run.guild_id();
        let result = ElectionResult::new(guild_id, member.ontology_id(), role.id);

        match self.ontology.record_election_result(&result).await {
            Ok(()) => true,
            Err(err) => {
                warn!(%guild_id, cycle, error = %err, "Failed to record election result");
                self.events.publish(ElectionEvent::ResultRecordFailed {
                    guild_id,
                    cycle,
                    message: err.to_string(),
                });
                false
            }
        }
    }

    async fn announce(&self, content: &str) {
        if let Err(err) =
            send_long_message(self.platform.as_ref(), self.run.channel_id(), content).await
        {
            warn!(
                guild_id = %self.run.guild_id(),
                channel_id = %self.run.channel_id(),
                error = %err,
                "Failed to send election announcement"
            );
        }
    }

    async fn clear_marker(&self) {
        let guild_id = self.run.guild_id();
        if let Err(err) = self
            .ontology
            .end_election(guild_id, self.run.election_id())
            .await
        {
            error!(%guild_id, error = %err, "Failed to clear live election marker");
        }
    }

    fn advance(&mut self, to: ElectionPhase, reason: &str) {
        if let Err(err) = self.machine.advance(to, Some(reason)) {
            warn!(guild_id = %self.run.guild_id(), error = %err, "Unexpected election transition");
        }
    }

    async fn complete(mut self, selections: Vec<Selection>, role_refills: u32) -> ElectionSummary {
        let guild_id = self.run.guild_id();
        self.schedule.send_replace(None);
        self.advance(ElectionPhase::Exhausted, "member pool drained");

        self.announce("@everyone **Election complete!**").await;

        self.advance(ElectionPhase::Terminating, "clearing live marker");
        self.clear_marker().await;
        self.advance(ElectionPhase::Complete, "election finished");

        info!(%guild_id, selections = selections.len(), summary = %self.machine.summary(), "Election complete");
        self.events.publish(ElectionEvent::Completed {
            guild_id,
            election_id: self.run.election_id(),
            selections: selections.len(),
        });

        self.into_summary(LoopOutcome::Completed, selections, role_refills)
    }

    async fn cancelled(mut self, selections: Vec<Selection>, role_refills: u32) -> ElectionSummary {
        let guild_id = self.run.guild_id();
        self.schedule.send_replace(None);

        self.announce("@everyone **Election cancelled.**").await;
        self.clear_marker().await;
        self.advance(ElectionPhase::Aborted, "cancelled");

        info!(
            %guild_id,
            remaining_members = self.run.remaining_member_count(),
            "Election cancelled"
        );
        self.events.publish(ElectionEvent::Cancelled {
            guild_id,
            election_id: self.run.election_id(),
            remaining_members: self.run.remaining_member_count(),
        });

        self.into_summary(LoopOutcome::Cancelled, selections, role_refills)
    }

    fn into_summary(
        self,
        outcome: LoopOutcome,
        selections: Vec<Selection>,
        role_refills: u32,
    ) -> ElectionSummary {
        ElectionSummary {
            guild_id: self.run.guild_id(),
            election_id: self.run.election_id(),
            outcome,
            selections,
            role_refills,
            transitions: self.machine.into_transitions(),
        }
    }
}
