use std::path::Path;

use anyhow::{bail, Context, Result};
use election::ControllerConfig;
use serde::Deserialize;

pub const DEFAULT_DISCORD_API: &str = "https://discord.com/api/v10";
pub const DEFAULT_BIND: &str = "0.0.0.0:8000";

/// Discord bot credentials.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    pub token: String,
    /// REST base url, overridable for tests.
    pub api_base: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base: DEFAULT_DISCORD_API.into(),
        }
    }
}

/// Foundry ontology endpoint and client-credentials.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FoundryConfig {
    /// Stack url, e.g. `https://walrus.palantirfoundry.com`
    pub url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Ontology api name or rid.
    pub ontology: String,
}

/// HTTP trigger surface.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind: String,
    /// Bearer token expected on authenticated routes.
    pub token: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.into(),
            token: String::new(),
        }
    }
}

/// Chat command settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub prefix: String,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self { prefix: "!".into() }
    }
}

/// Election engine settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ElectionConfig {
    /// Channel used when a trigger names none.
    pub fallback_channel: String,
    /// Fixed RNG seed for reproducible selections.
    pub seed: Option<u64>,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        let defaults = ControllerConfig::default();
        Self {
            fallback_channel: defaults.fallback_channel,
            seed: defaults.rng_seed,
        }
    }
}

/// Top-level bot configuration.
///
/// Loaded from an optional TOML file, then overridden by environment
/// variables.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub discord: DiscordConfig,
    pub foundry: FoundryConfig,
    pub api: ApiConfig,
    pub commands: CommandConfig,
    pub election: ElectionConfig,
}

impl BotConfig {
    /// Read `path` (if any) and apply the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                Self::from_toml_str(&raw)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Override fields from environment variables looked up through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let set = |target: &mut String, key: &str| {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *target = value;
            }
        };

        set(&mut self.discord.token, "DISCORD_TOKEN");
        set(&mut self.api.token, "WALRUS_API_TOKEN");
        set(&mut self.api.bind, "WALRUS_BIND");
        set(&mut self.commands.prefix, "WALRUS_CMD_PREFIX");
        set(&mut self.foundry.url, "FOUNDRY_URL");
        set(&mut self.foundry.client_id, "FOUNDRY_CLIENT_ID");
        set(&mut self.foundry.client_secret, "FOUNDRY_CLIENT_SECRET");
        set(&mut self.foundry.ontology, "FOUNDRY_ONTOLOGY");

        if let Some(seed) = lookup("WALRUS_ELECTION_SEED").filter(|v| !v.is_empty()) {
            self.election.seed = Some(
                seed.parse()
                    .with_context(|| format!("WALRUS_ELECTION_SEED is not a number: {seed}"))?,
            );
        }
        Ok(())
    }

    /// Fail fast on missing secrets. Foundry settings are only required when
    /// the remote ontology is used.
    pub fn validate(&self, in_memory_ontology: bool) -> Result<()> {
        let mut missing = Vec::new();
        if self.discord.token.is_empty() {
            missing.push("discord.token (DISCORD_TOKEN)");
        }
        if self.api.token.is_empty() {
            missing.push("api.token (WALRUS_API_TOKEN)");
        }
        if !in_memory_ontology {
            if self.foundry.url.is_empty() {
                missing.push("foundry.url (FOUNDRY_URL)");
            }
            if self.foundry.client_id.is_empty() {
                missing.push("foundry.client_id (FOUNDRY_CLIENT_ID)");
            }
            if self.foundry.client_secret.is_empty() {
                missing.push("foundry.client_secret (FOUNDRY_CLIENT_SECRET)");
            }
            if self.foundry.ontology.is_empty() {
                missing.push("foundry.ontology (FOUNDRY_ONTOLOGY)");
            }
        }
        if !missing.is_empty() {
            bail!("Missing required configuration: {}", missing.join(", "));
        }
        if self.commands.prefix.trim().is_empty() {
            bail!("Command prefix must not be blank");
        }
        Ok(())
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            fallback_channel: self.election.fallback_channel.clone(),
            rng_seed: self.election.seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = BotConfig::default();
        assert_eq!(config.api.bind, "0.0.0.0:8000");
        assert_eq!(config.discord.api_base, DEFAULT_DISCORD_API);
        assert_eq!(config.commands.prefix, "!");
        assert_eq!(config.election.fallback_channel, "general");
        assert!(config.election.seed.is_none());
    }

    #[test]
    fn env_overrides_file() {
        let mut config = BotConfig::from_toml_str(
            r#"
            [api]
            bind = "127.0.0.1:9000"
            token = "from-file"
            "#,
        )
        .unwrap();
        config
            .apply_env(env(&[
                ("WALRUS_API_TOKEN", "from-env"),
                ("WALRUS_ELECTION_SEED", "42"),
                ("DISCORD_TOKEN", ""),
            ]))
            .unwrap();

        assert_eq!(config.api.bind, "127.0.0.1:9000");
        assert_eq!(config.api.token, "from-env");
        assert_eq!(config.election.seed, Some(42));
        assert!(config.discord.token.is_empty());
    }

    #[test]
    fn bad_seed_is_rejected() {
        let mut config = BotConfig::default();
        let err = config
            .apply_env(env(&[("WALRUS_ELECTION_SEED", "lucky")]))
            .unwrap_err();
        assert!(err.to_string().contains("WALRUS_ELECTION_SEED"));
    }

    #[test]
    fn validate_lists_missing_secrets() {
        let config = BotConfig::default();
        let err = config.validate(false).unwrap_err().to_string();
        assert!(err.contains("DISCORD_TOKEN"));
        assert!(err.contains("FOUNDRY_CLIENT_SECRET"));

        let err = config.validate(true).unwrap_err().to_string();
        assert!(!err.contains("FOUNDRY"));
    }

    #[test]
    fn validate_accepts_in_memory_without_foundry() {
        let mut config = BotConfig::default();
        config
            .apply_env(env(&[("DISCORD_TOKEN", "d"), ("WALRUS_API_TOKEN", "a")]))
            .unwrap();
        assert!(config.validate(true).is_ok());
        assert!(config.validate(false).is_err());
    }
}
