//! Election trigger and status handlers.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, Utc};
use election::GuildId;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::auth::require_bearer;
use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;

/// Trigger parameters, accepted as JSON body or query string.
#[derive(Debug, Default, Deserialize)]
pub struct StartElectionRequest {
    #[serde(default)]
    pub server_id: Option<String>,
    #[serde(default)]
    pub channel_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartElectionResponse {
    pub status: String,
    pub server_name: String,
    pub server_id: String,
    pub channel_name: String,
    pub channel_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ElectionStatusResponse {
    pub server_id: String,
    pub election_id: String,
    pub channel_id: String,
    pub started_at: DateTime<Utc>,
    pub next_selection_at: Option<DateTime<Utc>>,
}

/// `POST /election/start`
pub async fn start_election(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<StartElectionRequest>,
    body: Option<Json<StartElectionRequest>>,
) -> ApiResult<Json<StartElectionResponse>> {
    require_bearer(&headers, &state.api_token)?;

    let body = body.map(|Json(body)| body).unwrap_or_default();
    let server_id = body
        .server_id
        .or(query.server_id)
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("Server ID is required".into()))?;
    let channel_id = body
        .channel_id
        .or(query.channel_id)
        .filter(|id| !id.trim().is_empty());

    info!(%server_id, channel_id = ?channel_id, "Election triggered over HTTP");

    let started = state
        .controller
        .initiate_election(&server_id, channel_id.as_deref())
        .await?;

    Ok(Json(StartElectionResponse {
        status: "ok".to_string(),
        server_name: started.guild.name,
        server_id: started.guild.id.to_string(),
        channel_name: started.channel.name,
        channel_id: started.channel.id.to_string(),
    }))
}

/// `GET /election/:server_id`
pub async fn election_status(
    State(state): State<AppState>,
    Path(server_id): Path<String>,
) -> ApiResult<Json<ElectionStatusResponse>> {
    let guild: GuildId = server_id
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("invalid server id: {}", e)))?;

    let status = state
        .controller
        .status(guild)
        .ok_or_else(|| ApiError::NotFound(crate::commands::NO_ELECTION_REPLY.to_string()))?;

    Ok(Json(ElectionStatusResponse {
        server_id: status.guild_id.to_string(),
        election_id: status.election_id.to_string(),
        channel_id: status.channel_id.to_string(),
        started_at: status.started_at,
        next_selection_at: status.next_selection_at,
    }))
}
