//! Chat-platform capability used by the election engine.
//!
//! The engine never talks to the platform directly: it resolves guilds and
//! channels, lists members and roles, mutates roles and posts messages through
//! [`GuildMembershipProvider`]. The bot crate implements it over the Discord
//! REST API; tests use in-memory fakes.

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{
    ChannelCategory, ChannelId, Guild, GuildId, Member, MemberId, Role, RoleId, TextChannel,
};

/// Maximum length of one platform message, in characters.
pub const MESSAGE_LIMIT: usize = 2000;

/// Errors reported by the chat platform.
#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    /// The bot lacks the permission for the requested operation.
    #[error("missing permission: {0}")]
    PermissionDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Network failure or unexpected status.
    #[error("transport error: {0}")]
    Transport(String),

    /// The platform answered with a body we could not understand.
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl PlatformError {
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}

/// Live guild state and mutations on the chat platform.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GuildMembershipProvider: Send + Sync {
    /// Guilds the bot is currently connected to.
    async fn guilds(&self) -> Result<Vec<Guild>, PlatformError>;

    /// Look up a guild; `None` when the bot does not know it.
    async fn resolve_guild(&self, guild: GuildId) -> Result<Option<Guild>, PlatformError>;

    /// Look up a text channel; `None` unless it is a text channel of `guild`.
    async fn resolve_channel(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<Option<TextChannel>, PlatformError>;

    async fn text_channels(&self, guild: GuildId) -> Result<Vec<TextChannel>, PlatformError>;

    async fn categories(&self, guild: GuildId) -> Result<Vec<ChannelCategory>, PlatformError>;

    async fn current_members(&self, guild: GuildId) -> Result<Vec<Member>, PlatformError>;

    /// Live state of one member; `None` once they have left `guild`.
    async fn resolve_member(
        &self,
        guild: GuildId,
        member: MemberId,
    ) -> Result<Option<Member>, PlatformError>;

    async fn current_roles(&self, guild: GuildId) -> Result<Vec<Role>, PlatformError>;

    /// Remove `remove` from the member, then grant `grant`.
    async fn mutate_roles(
        &self,
        guild: GuildId,
        member: MemberId,
        remove: &[RoleId],
        grant: RoleId,
    ) -> Result<(), PlatformError>;

    async fn send_message(&self, channel: ChannelId, content: &str) -> Result<(), PlatformError>;
}

/// Split `content` into chunks of at most `limit` characters.
///
/// Chunks break on line boundaries; a single line longer than `limit` is cut
/// into `limit`-sized pieces.
pub fn split_message(content: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    if content.chars().count() <= limit {
        return vec![content.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in content.split_inclusive('\n') {
        let line_len = line.chars().count();

        if current_len + line_len > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len > limit {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(limit) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Send `content` to `channel`, split into several messages when it exceeds
/// [`MESSAGE_LIMIT`].
pub async fn send_long_message(
    platform: &dyn GuildMembershipProvider,
    channel: ChannelId,
    content: &str,
) -> Result<(), PlatformError> {
    for chunk in split_message(content, MESSAGE_LIMIT) {
        platform.send_message(channel, &chunk).await?;
    }
    Ok(())
}
