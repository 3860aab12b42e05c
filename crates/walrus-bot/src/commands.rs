//! Chat command dispatch.
//!
//! Two commands, each with an alias:
//!
//! | Command      | Alias                | Who         |
//! |--------------|----------------------|-------------|
//! | `election`   | `startelection`      | guild owner |
//! | `nextresult` | `nextelectionresult` | anyone      |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use election::platform::send_long_message;
use election::{
    ChannelId, ElectionController, GuildId, GuildMembershipProvider, MemberId, PlatformError,
};
use tracing::{info, warn};

pub const NOT_OWNER_REPLY: &str = "Only the Supreme Leader can use this command";
pub const ALREADY_RUNNING_REPLY: &str = "Election is already in progress!";
pub const START_FAILED_REPLY: &str = "Issue trying to initiate election";
pub const NO_ELECTION_REPLY: &str = "There are no elections currently active";

/// A recognised chat command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    StartElection,
    NextResult,
}

impl Command {
    /// Parse `content` as a command behind `prefix`. Arguments after the
    /// command word are ignored.
    pub fn parse(prefix: &str, content: &str) -> Option<Self> {
        let word = content.trim().strip_prefix(prefix)?.split_whitespace().next()?;
        match word.to_ascii_lowercase().as_str() {
            "election" | "startelection" => Some(Self::StartElection),
            "nextresult" | "nextelectionresult" => Some(Self::NextResult),
            _ => None,
        }
    }
}

/// A guild message as relayed from the gateway.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub author_id: MemberId,
    pub content: String,
}

/// Reply text for `nextresult`.
pub fn next_result_reply(next: Option<DateTime<Utc>>) -> String {
    match next {
        Some(at) => format!("The next election will be at {}", at.format("%I:%M %p %Z")),
        None => NO_ELECTION_REPLY.to_string(),
    }
}

/// Routes chat commands to the election controller.
pub struct CommandDispatcher {
    controller: Arc<ElectionController>,
    platform: Arc<dyn GuildMembershipProvider>,
    prefix: String,
}

impl CommandDispatcher {
    pub fn new(
        controller: Arc<ElectionController>,
        platform: Arc<dyn GuildMembershipProvider>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            controller,
            platform,
            prefix: prefix.into(),
        }
    }

    pub fn is_command(&self, content: &str) -> bool {
        Command::parse(&self.prefix, content).is_some()
    }

    /// Handle `message`. Returns the reply sent to its channel, or `None`
    /// when the message is not a command or needs no reply.
    pub async fn dispatch(&self, message: &ChatMessage) -> Result<Option<String>, PlatformError> {
        let Some(command) = Command::parse(&self.prefix, &message.content) else {
            return Ok(None);
        };
        info!(
            ?command,
            guild_id = %message.guild_id,
            author_id = %message.author_id,
            "Chat command received"
        );

        let reply = match command {
            Command::StartElection => self.start_election(message).await?,
            Command::NextResult => Some(next_result_reply(
                self.controller
                    .status(message.guild_id)
                    .and_then(|status| status.next_selection_at),
            )),
        };

        if let Some(reply) = &reply {
            send_long_message(self.platform.as_ref(), message.channel_id, reply).await?;
        }
        Ok(reply)
    }

    async fn start_election(&self, message: &ChatMessage) -> Result<Option<String>, PlatformError> {
        let guild = self
            .platform
            .resolve_guild(message.guild_id)
            .await?
            .ok_or_else(|| PlatformError::NotFound(format!("guild {}", message.guild_id)))?;
        if guild.owner_id != message.author_id {
            return Ok(Some(NOT_OWNER_REPLY.to_string()));
        }

        let channel = message.channel_id.to_string();
        match self
            .controller
            .initiate_election(&guild.id.to_string(), Some(&channel))
            .await
        {
            // The controller announces the pools itself
            Ok(started) => {
                info!(guild_id = %guild.id, election_id = %started.election_id, "Election started from chat");
                Ok(None)
            }
            Err(err) if err.is_duplicate() => Ok(Some(ALREADY_RUNNING_REPLY.to_string())),
            Err(err) => {
                warn!(guild_id = %guild.id, error = %err, "Chat election trigger failed");
                Ok(Some(START_FAILED_REPLY.to_string()))
            }
        }
    }
}
