//! Read-only view of a guild's election settings.
//!
//! Every call goes to the ontology; nothing is cached, so settings always
//! reflect the latest state edited by the business tooling.

use std::collections::BTreeSet;
use std::sync::Arc;

use thiserror::Error;

use crate::ontology::{GuildRecord, OntologyClient, OntologyError};
use crate::types::{GuildElectionSettings, GuildId, OntologyMemberId, RoleId};

/// Error type for settings reads
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("guild {0} has no ontology record")]
    NotFound(GuildId),

    #[error("invalid {field} on guild {guild}: {message}")]
    InvalidField {
        guild: GuildId,
        field: &'static str,
        message: String,
    },

    #[error("ontology error: {0}")]
    Ontology(#[from] OntologyError),
}

/// Translates ontology `Guild` objects into [`GuildElectionSettings`].
#[derive(Clone)]
pub struct ElectionStore {
    ontology: Arc<dyn OntologyClient>,
}

impl ElectionStore {
    pub fn new(ontology: Arc<dyn OntologyClient>) -> Self {
        Self { ontology }
    }

    /// Latest election settings of `guild`.
    pub async fn settings(&self, guild: GuildId) -> Result<GuildElectionSettings, StoreError> {
        let record = self
            .ontology
            .get_guild(guild)
            .await?
            .ok_or(StoreError::NotFound(guild))?;
        settings_from_record(guild, &record)
    }
}

fn settings_from_record(
    guild: GuildId,
    record: &GuildRecord,
) -> Result<GuildElectionSettings, StoreError> {
    let eligible_member_ids: BTreeSet<OntologyMemberId> = record
        .setting_election_members
        .iter()
        .map(|id| OntologyMemberId::from(id.trim()))
        .collect();

    let eligible_role_ids = record
        .setting_election_roles
        .iter()
        .map(|id| id.parse::<RoleId>())
        .collect::<Result<BTreeSet<_>, _>>()
        .map_err(|e| StoreError::InvalidField {
            guild,
            field: "setting_election_roles",
            message: e.to_string(),
        })?;

    let cadence_minutes = match record.setting_election_cadence {
        None => None,
        Some(minutes) if minutes > 0 => {
            Some(u32::try_from(minutes).map_err(|e| StoreError::InvalidField {
                guild,
                field: "setting_election_cadence",
                message: e.to_string(),
            })?)
        }
        Some(minutes) => {
            return Err(StoreError::InvalidField {
                guild,
                field: "setting_election_cadence",
                message: format!("must be a positive number of minutes, got {}", minutes),
            })
        }
    };

    Ok(GuildElectionSettings {
        guild_id: guild,
        eligible_member_ids,
        eligible_role_ids,
        cadence_minutes,
        live_election: record.live_election().map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::InMemoryOntology;

    fn record() -> GuildRecord {
        GuildRecord {
            server_id: "1".into(),
            name: Some("Walrus Land".into()),
            setting_election_members: vec!["1_100".into(), "1_101".into(), "1_100".into()],
            setting_election_roles: vec!["10".into(), "11".into()],
            setting_election_cadence: Some(15),
            live_election_id: Some("none".into()),
            ..Default::default()
        }
    }

    #[test]
    fn translates_record() {
        let settings = settings_from_record(GuildId(1), &record()).unwrap();
        assert_eq!(settings.eligible_member_ids.len(), 2);
        assert!(settings
            .eligible_member_ids
            .contains(&OntologyMemberId::from("1_101")));
        assert_eq!(
            settings.eligible_role_ids,
            BTreeSet::from([RoleId(10), RoleId(11)])
        );
        assert_eq!(settings.cadence_minutes, Some(15));
        assert!(!settings.has_live_election());
    }

    #[test]
    fn missing_cadence_is_none() {
        let mut record = record();
        record.setting_election_cadence = None;
        let settings = settings_from_record(GuildId(1), &record).unwrap();
        assert_eq!(settings.cadence_minutes, None);
    }

    #[test]
    fn non_positive_cadence_is_invalid() {
        let mut record = record();
        record.setting_election_cadence = Some(0);
        let err = settings_from_record(GuildId(1), &record).unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidField {
                field: "setting_election_cadence",
                ..
            }
        ));
    }

    #[test]
    fn malformed_role_id_is_invalid() {
        let mut record = record();
        record.setting_election_roles.push("moderator".into());
        let err = settings_from_record(GuildId(1), &record).unwrap_err();
        assert!(err.to_string().contains("setting_election_roles"));
    }

    #[tokio::test]
    async fn reads_live_marker_through_ontology() {
        let ontology = Arc::new(InMemoryOntology::new());
        let mut live = record();
        live.live_election_id = Some("abc".into());
        ontology.insert_guild(live);

        let store = ElectionStore::new(ontology.clone());
        let settings = store.settings(GuildId(1)).await.unwrap();
        assert_eq!(settings.live_election.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn unknown_guild_is_not_found() {
        let store = ElectionStore::new(Arc::new(InMemoryOntology::new()));
        let err = store.settings(GuildId(404)).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(GuildId(404))));
    }
}
