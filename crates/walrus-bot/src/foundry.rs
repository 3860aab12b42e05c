//! Foundry ontology adapter.
//!
//! Objects are read through the v2 objects API; every write goes through an
//! ontology action applied in `VALIDATE_AND_EXECUTE` mode, and only a `VALID`
//! validation result counts as success.
//!
//! Foundry actions offer no compare-and-set on the live-election marker, so
//! [`OntologyClient::begin_election`] reads the guild and then applies the
//! start action. Two processes racing between those calls can both succeed;
//! within one process the election registry already serialises triggers.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use election::ontology::{
    ChannelCategoryRecord, GuildRecord, MemberRecord, ObjectKind, OntologyClient, OntologyError,
    RoleRecord, TextChannelRecord,
};
use election::{ElectionId, ElectionResult, GuildId};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

const PAGE_SIZE: u32 = 1000;

/// Refresh a token this long before it expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectPage {
    #[serde(default)]
    data: Vec<Map<String, Value>>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApplyResponse {
    #[serde(default)]
    validation: Option<Validation>,
}

#[derive(Debug, Deserialize)]
struct Validation {
    result: String,
}

/// Foundry client-credentials settings.
#[derive(Debug, Clone)]
pub struct FoundryCredentials {
    pub client_id: String,
    pub client_secret: String,
}

/// Ontology client for a Foundry stack.
pub struct FoundryClient {
    http: reqwest::Client,
    base_url: String,
    ontology: String,
    credentials: FoundryCredentials,
    token: Mutex<Option<CachedToken>>,
}

impl FoundryClient {
    pub fn new(
        base_url: impl Into<String>,
        ontology: impl Into<String>,
        credentials: FoundryCredentials,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ontology: ontology.into(),
            credentials,
            token: Mutex::new(None),
        }
    }

    /// Cached bearer token, refreshed shortly before expiry.
    async fn token(&self) -> Result<String, OntologyError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Utc::now() {
                return Ok(token.value.clone());
            }
        }

        let url = format!("{}/multipass/api/oauth2/token", self.base_url);
        let response = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.credentials.client_id.as_str()),
                ("client_secret", self.credentials.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| OntologyError::Transport(format!("token request: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OntologyError::Auth(format!("{}: {}", status.as_u16(), body)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| OntologyError::Decode(format!("token response: {}", e)))?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        let expires_at = Utc::now()
            + chrono::Duration::from_std(lifetime).unwrap_or_else(|_| chrono::Duration::zero());

        info!(expires_in = token.expires_in, "Obtained Foundry token");
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at,
        });
        Ok(token.access_token)
    }

    fn ontology_url(&self, rest: &str) -> String {
        format!("{}/api/v2/ontologies/{}/{}", self.base_url, self.ontology, rest)
    }

    async fn error_from(response: reqwest::Response, context: &str) -> OntologyError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = format!("{} {}: {}", context, status.as_u16(), body);
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => OntologyError::Auth(message),
            StatusCode::CONFLICT => OntologyError::Conflict(message),
            StatusCode::BAD_REQUEST => OntologyError::Rejected(message),
            _ => OntologyError::Transport(message),
        }
    }

    /// Fetch one object by primary key. `None` on 404.
    async fn get_object<T: DeserializeOwned>(
        &self,
        kind: ObjectKind,
        key: &str,
    ) -> Result<Option<T>, OntologyError> {
        let token = self.token().await?;
        let context = format!("get {} {}", kind, key);
        let response = self
            .http
            .get(self.ontology_url(&format!("objects/{}/{}", kind.object_type(), key)))
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| OntologyError::Transport(format!("{}: {}", context, e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(Self::error_from(response, &context).await);
        }
        response
            .json()
            .await
            .map(Some)
            .map_err(|e| OntologyError::Decode(format!("{}: {}", context, e)))
    }

    /// Apply `action` with `parameters`.
    async fn apply(&self, action: &str, parameters: Value) -> Result<(), OntologyError> {
        let token = self.token().await?;
        let body = json!({
            "options": { "mode": "VALIDATE_AND_EXECUTE", "returnEdits": "ALL" },
            "parameters": parameters,
        });
        let response = self
            .http
            .post(self.ontology_url(&format!("actions/{}/apply", action)))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| OntologyError::Transport(format!("{}: {}", action, e)))?;

        if !response.status().is_success() {
            return Err(Self::error_from(response, action).await);
        }

        let applied: ApplyResponse = response
            .json()
            .await
            .map_err(|e| OntologyError::Decode(format!("{}: {}", action, e)))?;
        match applied.validation {
            Some(validation) if validation.result == "VALID" => {
                debug!(action, "Applied ontology action");
                Ok(())
            }
            Some(validation) => Err(OntologyError::Rejected(format!(
                "{} validation result {}",
                action, validation.result
            ))),
            None => Err(OntologyError::Rejected(format!(
                "{} returned no validation result",
                action
            ))),
        }
    }
}

fn delete_action(kind: ObjectKind) -> (&'static str, &'static str) {
    match kind {
        ObjectKind::Guild => ("delete_guilds", "guilds"),
        ObjectKind::Member => ("delete_members", "members"),
        ObjectKind::Role => ("delete_roles", "roles"),
        ObjectKind::TextChannel => ("delete_text_channels", "text_channels"),
        ObjectKind::ChannelCategory => ("delete_channel_categories", "categories"),
    }
}

fn primary_key_string(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn to_parameters<T: serde::Serialize>(record: &T) -> Result<Value, OntologyError> {
    serde_json::to_value(record).map_err(|e| OntologyError::Decode(e.to_string()))
}

#[async_trait]
impl OntologyClient for FoundryClient {
    async fn get_guild(&self, guild: GuildId) -> Result<Option<GuildRecord>, OntologyError> {
        self.get_object(ObjectKind::Guild, &guild.to_string()).await
    }

    async fn begin_election(
        &self,
        guild: GuildId,
        election: ElectionId,
    ) -> Result<(), OntologyError> {
        let record = self
            .get_guild(guild)
            .await?
            .ok_or_else(|| OntologyError::Rejected(format!("no Guild object for {}", guild)))?;
        if let Some(live) = record.live_election() {
            return Err(OntologyError::Conflict(format!(
                "guild {} already has live election {}",
                guild, live
            )));
        }
        self.apply(
            "start_election",
            json!({ "guild": guild.to_string(), "live_election_id": election.to_string() }),
        )
        .await
    }

    async fn end_election(&self, guild: GuildId, election: ElectionId) -> Result<(), OntologyError> {
        let record = self
            .get_guild(guild)
            .await?
            .ok_or_else(|| OntologyError::Rejected(format!("no Guild object for {}", guild)))?;
        match record.live_election() {
            None => {
                debug!(guild_id = %guild, "No live election marker to clear");
                Ok(())
            }
            Some(live) if live == election.to_string() => {
                self.apply("stop_election", json!({ "guild": guild.to_string() }))
                    .await
            }
            Some(live) => Err(OntologyError::Conflict(format!(
                "guild {} marker belongs to election {}, not {}",
                guild, live, election
            ))),
        }
    }

    async fn record_election_result(&self, result: &ElectionResult) -> Result<(), OntologyError> {
        self.apply(
            "create_election_result",
            json!({
                "guild": result.guild_id.to_string(),
                "member": result.member_id.as_str(),
                "role": result.role_id.to_string(),
                "timestamp": result.recorded_at.to_rfc3339(),
            }),
        )
        .await
    }

    async fn list_object_ids(&self, kind: ObjectKind) -> Result<Vec<String>, OntologyError> {
        let primary_key = kind.primary_key();
        let url = self.ontology_url(&format!("objects/{}", kind.object_type()));
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let token = self.token().await?;
            let mut query = vec![
                ("pageSize", PAGE_SIZE.to_string()),
                ("select", primary_key.to_string()),
            ];
            if let Some(next) = &page_token {
                query.push(("pageToken", next.clone()));
            }
            let context = format!("list {}", kind);
            let response = self
                .http
                .get(&url)
                .bearer_auth(token)
                .query(&query)
                .send()
                .await
                .map_err(|e| OntologyError::Transport(format!("{}: {}", context, e)))?;
            if !response.status().is_success() {
                return Err(Self::error_from(response, &context).await);
            }
            let page: ObjectPage = response
                .json()
                .await
                .map_err(|e| OntologyError::Decode(format!("{}: {}", context, e)))?;

            ids.extend(
                page.data
                    .iter()
                    .filter_map(|object| primary_key_string(object, primary_key)),
            );
            match page.next_page_token {
                Some(next) if !next.is_empty() => page_token = Some(next),
                _ => break,
            }
        }
        Ok(ids)
    }

    async fn upsert_guild(&self, record: &GuildRecord) -> Result<(), OntologyError> {
        self.apply("upsert_guild", to_parameters(record)?).await
    }

    async fn upsert_member(&self, record: &MemberRecord) -> Result<(), OntologyError> {
        self.apply("upsert_member", to_parameters(record)?).await
    }

    async fn upsert_role(&self, record: &RoleRecord) -> Result<(), OntologyError> {
        self.apply("upsert_role", to_parameters(record)?).await
    }

    async fn upsert_text_channel(&self, record: &TextChannelRecord) -> Result<(), OntologyError> {
        self.apply("upsert_text_channel", to_parameters(record)?)
            .await
    }

    async fn upsert_channel_category(
        &self,
        record: &ChannelCategoryRecord,
    ) -> Result<(), OntologyError> {
        self.apply("upsert_channel_category", to_parameters(record)?)
            .await
    }

    async fn delete_objects(&self, kind: ObjectKind, ids: &[String]) -> Result<(), OntologyError> {
        if ids.is_empty() {
            return Ok(());
        }
        let (action, parameter) = delete_action(kind);
        let mut parameters = Map::new();
        parameters.insert(parameter.to_string(), json!(ids));
        self.apply(action, Value::Object(parameters)).await
    }
}
