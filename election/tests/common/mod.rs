//! Shared fixtures for election integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use election::ontology::GuildRecord;
use election::{
    ChannelCategory, ChannelId, ControllerConfig, ElectionController, ElectionRegistry, EventBus, Guild, GuildId,
    GuildMembershipProvider, InMemoryOntology, Member, MemberId, PlatformError, Role, RoleId,
    TextChannel,
};

pub const GUILD: GuildId = GuildId(1);
pub const GENERAL: ChannelId = ChannelId(5);
pub const OWNER: MemberId = MemberId(100);

#[derive(Default)]
struct State {
    guilds: Vec<Guild>,
    channels: Vec<TextChannel>,
    categories: Vec<ChannelCategory>,
    members: Vec<Member>,
    roles: Vec<Role>,
    messages: Vec<(ChannelId, String)>,
    mutations: Vec<(MemberId, Vec<RoleId>, RoleId)>,
    forbidden: HashSet<MemberId>,
}

/// In-memory chat platform.
#[derive(Default)]
pub struct FakePlatform {
    state: Mutex<State>,
}

impl FakePlatform {
    /// One guild with a `general` channel, `members` and `roles`.
    pub fn with_guild(members: &[u64], roles: &[u64]) -> Self {
        let platform = Self::default();
        {
            let mut state = platform.state.lock().unwrap();
            state.guilds.push(Guild {
                id: GUILD,
                name: "Walrus Land".into(),
                owner_id: OWNER,
                description: None,
                icon_url: None,
            });
            state.channels.push(TextChannel {
                id: GENERAL,
                guild_id: GUILD,
                name: "general".into(),
                category_id: None,
                position: 0,
            });
            state.members = members.iter().map(|id| member(*id)).collect();
            state.roles = roles.iter().map(|id| role(*id)).collect();
        }
        platform
    }

    pub fn add_channel(&self, id: u64, name: &str) {
        self.state.lock().unwrap().channels.push(TextChannel {
            id: ChannelId(id),
            guild_id: GUILD,
            name: name.into(),
            category_id: None,
            position: 1,
        });
    }

    pub fn add_category(&self, id: u64, name: &str) {
        self.state.lock().unwrap().categories.push(ChannelCategory {
            id: ChannelId(id),
            guild_id: GUILD,
            name: name.into(),
            position: 0,
        });
    }

    pub fn remove_category(&self, id: u64) {
        self.state
            .lock()
            .unwrap()
            .categories
            .retain(|category| category.id != ChannelId(id));
    }

    /// Hand a role to `member` outside of any election.
    pub fn grant_role(&self, member: u64, role: u64) {
        if let Some(target) = self
            .state
            .lock()
            .unwrap()
            .members
            .iter_mut()
            .find(|m| m.id == MemberId(member))
        {
            target.roles.push(RoleId(role));
        }
    }

    pub fn remove_member(&self, id: u64) {
        self.state
            .lock()
            .unwrap()
            .members
            .retain(|member| member.id != MemberId(id));
    }

    /// Role mutations of `member` fail with a permission error.
    pub fn forbid(&self, member: u64) {
        self.state.lock().unwrap().forbidden.insert(MemberId(member));
    }

    pub fn messages(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .messages
            .iter()
            .map(|(_, content)| content.clone())
            .collect()
    }

    pub fn messages_to(&self, channel: ChannelId) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .messages
            .iter()
            .filter(|(to, _)| *to == channel)
            .map(|(_, content)| content.clone())
            .collect()
    }

    pub fn mutations(&self) -> Vec<(MemberId, Vec<RoleId>, RoleId)> {
        self.state.lock().unwrap().mutations.clone()
    }

    pub fn member_roles(&self, id: u64) -> Vec<RoleId> {
        self.state
            .lock()
            .unwrap()
            .members
            .iter()
            .find(|member| member.id == MemberId(id))
            .map(|member| member.roles.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl GuildMembershipProvider for FakePlatform {
    async fn guilds(&self) -> Result<Vec<Guild>, PlatformError> {
        Ok(self.state.lock().unwrap().guilds.clone())
    }

    async fn resolve_guild(&self, guild: GuildId) -> Result<Option<Guild>, PlatformError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .guilds
            .iter()
            .find(|g| g.id == guild)
            .cloned())
    }

    async fn resolve_channel(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<Option<TextChannel>, PlatformError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .channels
            .iter()
            .find(|c| c.id == channel && c.guild_id == guild)
            .cloned())
    }

    async fn text_channels(&self, guild: GuildId) -> Result<Vec<TextChannel>, PlatformError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .channels
            .iter()
            .filter(|c| c.guild_id == guild)
            .cloned()
            .collect())
    }

    async fn categories(&self, guild: GuildId) -> Result<Vec<ChannelCategory>, PlatformError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .categories
            .iter()
            .filter(|c| c.guild_id == guild)
            .cloned()
            .collect())
    }

    async fn resolve_member(
        &self,
        guild: GuildId,
        member: MemberId,
    ) -> Result<Option<Member>, PlatformError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .members
            .iter()
            .find(|m| m.id == member && m.guild_id == guild)
            .cloned())
    }

    async fn current_members(&self, guild: GuildId) -> Result<Vec<Member>, PlatformError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .members
            .iter()
            .filter(|m| m.guild_id == guild)
            .cloned()
            .collect())
    }

    async fn current_roles(&self, guild: GuildId) -> Result<Vec<Role>, PlatformError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .roles
            .iter()
            .filter(|r| r.guild_id == guild)
            .cloned()
            .collect())
    }

    async fn mutate_roles(
        &self,
        _guild: GuildId,
        member: MemberId,
        remove: &[RoleId],
        grant: RoleId,
    ) -> Result<(), PlatformError> {
        let mut state = self.state.lock().unwrap();
        if state.forbidden.contains(&member) {
            return Err(PlatformError::PermissionDenied("Missing Permissions".into()));
        }
        state.mutations.push((member, remove.to_vec(), grant));
        if let Some(target) = state.members.iter_mut().find(|m| m.id == member) {
            target.roles.retain(|role| !remove.contains(role));
            target.roles.push(grant);
        }
        Ok(())
    }

    async fn send_message(&self, channel: ChannelId, content: &str) -> Result<(), PlatformError> {
        self.state
            .lock()
            .unwrap()
            .messages
            .push((channel, content.to_string()));
        Ok(())
    }
}

pub fn member(id: u64) -> Member {
    Member {
        id: MemberId(id),
        guild_id: GUILD,
        name: format!("walrus{id}"),
        nick: None,
        bot: false,
        roles: Vec::new(),
    }
}

pub fn role(id: u64) -> Role {
    Role {
        id: RoleId(id),
        guild_id: GUILD,
        name: format!("role{id}"),
    }
}

/// Guild record making `members` and `roles` eligible.
pub fn settings(members: &[u64], roles: &[u64], cadence: Option<i64>) -> GuildRecord {
    GuildRecord {
        server_id: GUILD.to_string(),
        name: Some("Walrus Land".into()),
        setting_election_members: members.iter().map(|id| format!("{GUILD}_{id}")).collect(),
        setting_election_roles: roles.iter().map(|id| id.to_string()).collect(),
        setting_election_cadence: cadence,
        live_election_id: Some("none".into()),
        ..Default::default()
    }
}

/// Route engine logs to the test harness; `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn controller(
    platform: Arc<FakePlatform>,
    ontology: Arc<InMemoryOntology>,
) -> ElectionController {
    init_tracing();
    ElectionController::new(
        platform,
        ontology,
        ElectionRegistry::new().shared(),
        EventBus::new().shared(),
        ControllerConfig {
            rng_seed: Some(7),
            ..Default::default()
        },
    )
}
