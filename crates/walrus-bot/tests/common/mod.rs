//! Shared fixtures for walrus-bot integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use election::ontology::GuildRecord;
use election::{
    ChannelCategory, ChannelId, ControllerConfig, ElectionController, ElectionRegistry, EventBus, Guild, GuildId,
    GuildMembershipProvider, InMemoryOntology, Member, MemberId, PlatformError, Role, RoleId,
    TextChannel,
};
use walrus_bot::api::{create_router, AppState};
use walrus_bot::commands::CommandDispatcher;

pub const GUILD: GuildId = GuildId(1);
pub const GENERAL: ChannelId = ChannelId(5);
pub const OWNER: MemberId = MemberId(100);
pub const API_TOKEN: &str = "walrus-secret";

/// Chat platform with one guild and a `general` channel.
pub struct FakePlatform {
    members: Vec<Member>,
    roles: Vec<Role>,
    messages: Mutex<Vec<(ChannelId, String)>>,
}

impl FakePlatform {
    pub fn new(members: &[u64], roles: &[u64]) -> Self {
        Self {
            members: members
                .iter()
                .map(|id| Member {
                    id: MemberId(*id),
                    guild_id: GUILD,
                    name: format!("walrus{id}"),
                    nick: None,
                    bot: false,
                    roles: Vec::new(),
                })
                .collect(),
            roles: roles
                .iter()
                .map(|id| Role {
                    id: RoleId(*id),
                    guild_id: GUILD,
                    name: format!("role{id}"),
                })
                .collect(),
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn messages_to(&self, channel: ChannelId) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| *to == channel)
            .map(|(_, content)| content.clone())
            .collect()
    }
}

#[async_trait]
impl GuildMembershipProvider for FakePlatform {
    async fn guilds(&self) -> Result<Vec<Guild>, PlatformError> {
        Ok(vec![guild()])
    }

    async fn resolve_guild(&self, id: GuildId) -> Result<Option<Guild>, PlatformError> {
        Ok((id == GUILD).then(guild))
    }

    async fn resolve_channel(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<Option<TextChannel>, PlatformError> {
        Ok((guild == GUILD && channel == GENERAL).then(general))
    }

    async fn text_channels(&self, guild: GuildId) -> Result<Vec<TextChannel>, PlatformError> {
        Ok(if guild == GUILD { vec![general()] } else { Vec::new() })
    }

    async fn categories(&self, _guild: GuildId) -> Result<Vec<ChannelCategory>, PlatformError> {
        Ok(Vec::new())
    }

    async fn resolve_member(
        &self,
        _guild: GuildId,
        member: MemberId,
    ) -> Result<Option<Member>, PlatformError> {
        Ok(self.members.iter().find(|m| m.id == member).cloned())
    }

    async fn current_members(&self, _guild: GuildId) -> Result<Vec<Member>, PlatformError> {
        Ok(self.members.clone())
    }

    async fn current_roles(&self, _guild: GuildId) -> Result<Vec<Role>, PlatformError> {
        Ok(self.roles.clone())
    }

    async fn mutate_roles(
        &self,
        _guild: GuildId,
        _member: MemberId,
        _remove: &[RoleId],
        _grant: RoleId,
    ) -> Result<(), PlatformError> {
        Ok(())
    }

    async fn send_message(&self, channel: ChannelId, content: &str) -> Result<(), PlatformError> {
        self.messages
            .lock()
            .unwrap()
            .push((channel, content.to_string()));
        Ok(())
    }
}

fn guild() -> Guild {
    Guild {
        id: GUILD,
        name: "Walrus Land".into(),
        owner_id: OWNER,
        description: None,
        icon_url: None,
    }
}

fn general() -> TextChannel {
    TextChannel {
        id: GENERAL,
        guild_id: GUILD,
        name: "general".into(),
        category_id: None,
        position: 0,
    }
}

/// Guild record making `members` and `roles` eligible, with a long cadence
/// so no selection happens during a test.
pub fn settings(members: &[u64], roles: &[u64]) -> GuildRecord {
    GuildRecord {
        server_id: GUILD.to_string(),
        name: Some("Walrus Land".into()),
        setting_election_members: members.iter().map(|id| format!("{GUILD}_{id}")).collect(),
        setting_election_roles: roles.iter().map(|id| id.to_string()).collect(),
        setting_election_cadence: Some(600),
        live_election_id: Some("none".into()),
        ..Default::default()
    }
}

pub struct TestApp {
    pub router: Router,
    pub platform: Arc<FakePlatform>,
    pub ontology: Arc<InMemoryOntology>,
    pub controller: Arc<ElectionController>,
}

/// Router over a fake platform whose guild has members 1..=3 and role 10,
/// all eligible.
pub fn test_app() -> TestApp {
    let platform = Arc::new(FakePlatform::new(&[1, 2, 3], &[10]));
    let ontology = Arc::new(InMemoryOntology::new());
    ontology.insert_guild(settings(&[1, 2, 3], &[10]));

    let controller = Arc::new(ElectionController::new(
        platform.clone(),
        ontology.clone(),
        ElectionRegistry::new().shared(),
        EventBus::new().shared(),
        ControllerConfig {
            rng_seed: Some(3),
            ..Default::default()
        },
    ));
    let commands = Arc::new(CommandDispatcher::new(
        controller.clone(),
        platform.clone(),
        "!",
    ));
    let router = create_router(AppState::new(controller.clone(), commands, API_TOKEN));

    TestApp {
        router,
        platform,
        ontology,
        controller,
    }
}
