//! Gateway relay handler.
//!
//! A gateway process forwards guild message-create events here; commands in
//! them are dispatched and answered in the originating channel.

use axum::{extract::State, http::HeaderMap, Json};
use election::{ChannelId, GuildId, MemberId};
use serde::{Deserialize, Serialize};

use super::auth::require_bearer;
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::commands::ChatMessage;

/// Forwarded message. Snowflakes are strings, as on the gateway.
#[derive(Debug, Deserialize)]
pub struct GatewayMessage {
    pub guild_id: String,
    pub channel_id: String,
    pub author_id: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GatewayMessageResponse {
    pub handled: bool,
    pub reply: Option<String>,
}

fn parse<T: std::str::FromStr>(raw: &str, field: &str) -> Result<T, ApiError>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid {}: {}", field, e)))
}

/// `POST /gateway/message`
pub async fn gateway_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(message): Json<GatewayMessage>,
) -> ApiResult<Json<GatewayMessageResponse>> {
    require_bearer(&headers, &state.api_token)?;

    let message = ChatMessage {
        guild_id: parse::<GuildId>(&message.guild_id, "guild_id")?,
        channel_id: parse::<ChannelId>(&message.channel_id, "channel_id")?,
        author_id: parse::<MemberId>(&message.author_id, "author_id")?,
        content: message.content,
    };

    let handled = state.commands.is_command(&message.content);
    let reply = state.commands.dispatch(&message).await?;
    Ok(Json(GatewayMessageResponse { handled, reply }))
}
