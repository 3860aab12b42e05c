//! Discord REST adapter.
//!
//! Implements [`GuildMembershipProvider`] over the Discord HTTP API with a
//! bot token. Snowflakes arrive as JSON strings and are parsed into the
//! election id types here, at the boundary.

use std::time::Duration;

use async_trait::async_trait;
use election::{
    ChannelCategory, ChannelId, Guild, GuildId, GuildMembershipProvider, Member, MemberId,
    PlatformError, Role, RoleId, TextChannel,
};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Discord channel type of a guild text channel.
const GUILD_TEXT: u8 = 0;

/// Discord channel type of a channel category.
const GUILD_CATEGORY: u8 = 4;

/// Page size of the member listing endpoint.
const MEMBER_PAGE_SIZE: usize = 1000;

/// Retries after a 429 before giving up.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

#[derive(Debug, Deserialize)]
struct PartialGuildDto {
    id: String,
}

#[derive(Debug, Deserialize)]
struct GuildDto {
    id: String,
    name: String,
    owner_id: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    icon: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChannelDto {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    guild_id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    parent_id: Option<String>,
    #[serde(default)]
    position: i64,
}

#[derive(Debug, Deserialize)]
struct UserDto {
    id: String,
    username: String,
    #[serde(default)]
    bot: bool,
}

#[derive(Debug, Deserialize)]
struct MemberDto {
    user: UserDto,
    #[serde(default)]
    nick: Option<String>,
    #[serde(default)]
    roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RoleDto {
    id: String,
    name: String,
}

#[derive(Debug, Serialize)]
struct MessageBody<'a> {
    content: &'a str,
}

#[derive(Debug, Default, Deserialize)]
struct RateLimitBody {
    #[serde(default)]
    retry_after: f64,
}

fn snowflake<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, PlatformError>
where
    T::Err: std::fmt::Display,
{
    raw.parse()
        .map_err(|e| PlatformError::Decode(format!("bad {} id {:?}: {}", what, raw, e)))
}

impl GuildDto {
    fn into_guild(self) -> Result<Guild, PlatformError> {
        let id: GuildId = snowflake(&self.id, "guild")?;
        Ok(Guild {
            icon_url: self
                .icon
                .map(|hash| format!("https://cdn.discordapp.com/icons/{}/{}.png", id, hash)),
            id,
            name: self.name,
            owner_id: snowflake(&self.owner_id, "owner")?,
            description: self.description,
        })
    }
}

impl ChannelDto {
    /// `None` for anything but a text channel of `guild`.
    fn into_text_channel(self, guild: GuildId) -> Result<Option<TextChannel>, PlatformError> {
        if self.kind != GUILD_TEXT || !self.belongs_to(guild)? {
            return Ok(None);
        }
        Ok(Some(TextChannel {
            id: snowflake(&self.id, "channel")?,
            guild_id: guild,
            name: self.name.unwrap_or_default(),
            category_id: self
                .parent_id
                .as_deref()
                .map(|id| snowflake(id, "category"))
                .transpose()?,
            position: self.position,
        }))
    }

    fn into_category(self, guild: GuildId) -> Result<Option<ChannelCategory>, PlatformError> {
        if self.kind != GUILD_CATEGORY || !self.belongs_to(guild)? {
            return Ok(None);
        }
        Ok(Some(ChannelCategory {
            id: snowflake(&self.id, "category")?,
            guild_id: guild,
            name: self.name.unwrap_or_default(),
            position: self.position,
        }))
    }

    /// Channels fetched by id carry their guild; listings may omit it.
    fn belongs_to(&self, guild: GuildId) -> Result<bool, PlatformError> {
        match &self.guild_id {
            Some(owner) => Ok(snowflake::<GuildId>(owner, "guild")? == guild),
            None => Ok(true),
        }
    }
}

impl MemberDto {
    fn into_member(self, guild: GuildId) -> Result<Member, PlatformError> {
        Ok(Member {
            id: snowflake(&self.user.id, "user")?,
            guild_id: guild,
            name: self.user.username,
            nick: self.nick,
            bot: self.user.bot,
            roles: self
                .roles
                .iter()
                .map(|id| snowflake(id, "role"))
                .collect::<Result<_, _>>()?,
        })
    }
}

/// Discord REST client.
#[derive(Clone)]
pub struct DiscordClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl DiscordClient {
    pub fn new(api_base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, PlatformError> {
        let url = format!("{}{}", self.api_base, path);
        let mut attempt = 0;
        loop {
            let mut request = self
                .http
                .request(method.clone(), &url)
                .header("Authorization", format!("Bot {}", self.token))
                .query(query);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request
                .send()
                .await
                .map_err(|e| PlatformError::Transport(format!("{} {}: {}", method, path, e)))?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS && attempt < MAX_RATE_LIMIT_RETRIES
            {
                attempt += 1;
                let limit: RateLimitBody = response.json().await.unwrap_or_default();
                let wait = Duration::from_secs_f64(limit.retry_after.clamp(0.0, 60.0));
                warn!(%method, path, attempt, wait_ms = wait.as_millis() as u64, "Discord rate limited");
                tokio::time::sleep(wait).await;
                continue;
            }

            debug!(%method, path, status = %response.status(), "Discord request");
            return Ok(response);
        }
    }

    /// Map non-success statuses onto [`PlatformError`].
    async fn check(
        response: reqwest::Response,
        path: &str,
    ) -> Result<reqwest::Response, PlatformError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = format!("{} {}: {}", status.as_u16(), path, body);
        Err(match status {
            StatusCode::FORBIDDEN | StatusCode::UNAUTHORIZED => {
                PlatformError::PermissionDenied(message)
            }
            StatusCode::NOT_FOUND => PlatformError::NotFound(message),
            _ => PlatformError::Transport(message),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, PlatformError> {
        let response = self.send(Method::GET, path, query, None).await?;
        Self::check(response, path)
            .await?
            .json()
            .await
            .map_err(|e| PlatformError::Decode(format!("{}: {}", path, e)))
    }

    /// Like `get_json`, with 404 mapped to `None`.
    async fn get_optional<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, PlatformError> {
        match self.get_json(path, &[]).await {
            Ok(value) => Ok(Some(value)),
            Err(PlatformError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn no_content(&self, method: Method, path: &str) -> Result<(), PlatformError> {
        let response = self.send(method, path, &[], None).await?;
        Self::check(response, path).await?;
        Ok(())
    }
}

#[async_trait]
impl GuildMembershipProvider for DiscordClient {
    async fn guilds(&self) -> Result<Vec<Guild>, PlatformError> {
        let partial: Vec<PartialGuildDto> = self.get_json("/users/@me/guilds", &[]).await?;
        let mut guilds = Vec::with_capacity(partial.len());
        for summary in partial {
            let guild: GuildDto = self.get_json(&format!("/guilds/{}", summary.id), &[]).await?;
            guilds.push(guild.into_guild()?);
        }
        Ok(guilds)
    }

    async fn resolve_guild(&self, guild: GuildId) -> Result<Option<Guild>, PlatformError> {
        self.get_optional::<GuildDto>(&format!("/guilds/{}", guild))
            .await?
            .map(GuildDto::into_guild)
            .transpose()
    }

    async fn resolve_channel(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<Option<TextChannel>, PlatformError> {
        match self
            .get_optional::<ChannelDto>(&format!("/channels/{}", channel))
            .await?
        {
            Some(dto) => dto.into_text_channel(guild),
            None => Ok(None),
        }
    }

    async fn text_channels(&self, guild: GuildId) -> Result<Vec<TextChannel>, PlatformError> {
        let channels: Vec<ChannelDto> = self
            .get_json(&format!("/guilds/{}/channels", guild), &[])
            .await?;
        let mut text = Vec::new();
        for dto in channels {
            if let Some(channel) = dto.into_text_channel(guild)? {
                text.push(channel);
            }
        }
        text.sort_by_key(|channel| channel.position);
        Ok(text)
    }

    async fn categories(&self, guild: GuildId) -> Result<Vec<ChannelCategory>, PlatformError> {
        let channels: Vec<ChannelDto> = self
            .get_json(&format!("/guilds/{}/channels", guild), &[])
            .await?;
        let mut categories = Vec::new();
        for dto in channels {
            if let Some(category) = dto.into_category(guild)? {
                categories.push(category);
            }
        }
        categories.sort_by_key(|category| category.position);
        Ok(categories)
    }

    async fn resolve_member(
        &self,
        guild: GuildId,
        member: MemberId,
    ) -> Result<Option<Member>, PlatformError> {
        self.get_optional::<MemberDto>(&format!("/guilds/{}/members/{}", guild, member))
            .await?
            .map(|dto| dto.into_member(guild))
            .transpose()
    }

    async fn current_members(&self, guild: GuildId) -> Result<Vec<Member>, PlatformError> {
        let path = format!("/guilds/{}/members", guild);
        let mut members = Vec::new();
        let mut after = MemberId(0);
        loop {
            let page: Vec<MemberDto> = self
                .get_json(
                    &path,
                    &[
                        ("limit", MEMBER_PAGE_SIZE.to_string()),
                        ("after", after.to_string()),
                    ],
                )
                .await?;
            let page_len = page.len();
            for dto in page {
                let member = dto.into_member(guild)?;
                after = after.max(member.id);
                members.push(member);
            }
            if page_len < MEMBER_PAGE_SIZE {
                break;
            }
        }
        Ok(members)
    }

    async fn current_roles(&self, guild: GuildId) -> Result<Vec<Role>, PlatformError> {
        let roles: Vec<RoleDto> = self
            .get_json(&format!("/guilds/{}/roles", guild), &[])
            .await?;
        roles
            .into_iter()
            .map(|dto| {
                Ok(Role {
                    id: snowflake(&dto.id, "role")?,
                    guild_id: guild,
                    name: dto.name,
                })
            })
            .collect()
    }

    async fn mutate_roles(
        &self,
        guild: GuildId,
        member: MemberId,
        remove: &[RoleId],
        grant: RoleId,
    ) -> Result<(), PlatformError> {
        for role in remove {
            self.no_content(
                Method::DELETE,
                &format!("/guilds/{}/members/{}/roles/{}", guild, member, role),
            )
            .await?;
        }
        self.no_content(
            Method::PUT,
            &format!("/guilds/{}/members/{}/roles/{}", guild, member, grant),
        )
        .await
    }

    async fn send_message(&self, channel: ChannelId, content: &str) -> Result<(), PlatformError> {
        let path = format!("/channels/{}/messages", channel);
        let body = serde_json::to_value(MessageBody { content })
            .map_err(|e| PlatformError::Decode(e.to_string()))?;
        let response = self.send(Method::POST, &path, &[], Some(&body)).await?;
        Self::check(response, &path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guild_icon_url() {
        let dto = GuildDto {
            id: "1".into(),
            name: "Walrus Land".into(),
            owner_id: "100".into(),
            description: None,
            icon: Some("abc".into()),
        };
        let guild = dto.into_guild().unwrap();
        assert_eq!(guild.owner_id, MemberId(100));
        assert_eq!(
            guild.icon_url.as_deref(),
            Some("https://cdn.discordapp.com/icons/1/abc.png")
        );
    }

    #[test]
    fn only_text_channels_of_the_guild() {
        let voice: ChannelDto = serde_json::from_value(serde_json::json!({
            "id": "7", "type": 2, "guild_id": "1", "name": "lounge"
        }))
        .unwrap();
        assert!(voice.into_text_channel(GuildId(1)).unwrap().is_none());

        let foreign: ChannelDto = serde_json::from_value(serde_json::json!({
            "id": "8", "type": 0, "guild_id": "2", "name": "general"
        }))
        .unwrap();
        assert!(foreign.into_text_channel(GuildId(1)).unwrap().is_none());

        let text: ChannelDto = serde_json::from_value(serde_json::json!({
            "id": "9", "type": 0, "guild_id": "1", "name": "general", "parent_id": "4", "position": 3
        }))
        .unwrap();
        let channel = text.into_text_channel(GuildId(1)).unwrap().unwrap();
        assert_eq!(channel.category_id, Some(ChannelId(4)));
        assert_eq!(channel.position, 3);
    }

    #[test]
    fn malformed_snowflake_is_decode_error() {
        let dto: MemberDto = serde_json::from_value(serde_json::json!({
            "user": {"id": "walrus", "username": "w"},
            "roles": []
        }))
        .unwrap();
        assert!(matches!(
            dto.into_member(GuildId(1)),
            Err(PlatformError::Decode(_))
        ));
    }
}
