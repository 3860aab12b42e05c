//! Foundry ontology adapter tests against a mock server.
//!
//! Tests verify:
//! - Client-credentials token is fetched once and reused
//! - Object reads, with 404 as "absent"
//! - Actions succeed only on a `VALID` validation result
//! - The live-election marker guards `begin_election` and `end_election`
//! - Channel category upserts and deletes
//! - Paginated primary-key listing

use election::ontology::{ChannelCategoryRecord, ObjectKind, OntologyClient, OntologyError};
use election::{ElectionId, ElectionResult, GuildId, OntologyMemberId, RoleId};
use serde_json::json;
use walrus_bot::foundry::{FoundryClient, FoundryCredentials};
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const GUILD: GuildId = GuildId(1);
const OBJECTS: &str = "/api/v2/ontologies/walrus-ontology/objects";
const ACTIONS: &str = "/api/v2/ontologies/walrus-ontology/actions";

async fn server_with_token() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/multipass/api/oauth2/token"))
        .and(body_string_contains("grant_type=client_credentials"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "foundry-token", "expires_in": 3600})),
        )
        .expect(1)
        .mount(&server)
        .await;
    server
}

fn client(server: &MockServer) -> FoundryClient {
    FoundryClient::new(
        server.uri(),
        "walrus-ontology",
        FoundryCredentials {
            client_id: "walrus".into(),
            client_secret: "secret".into(),
        },
    )
}

fn valid() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"validation": {"result": "VALID"}, "edits": {}}))
}

async fn mount_guild(server: &MockServer, live_election_id: &str) {
    Mock::given(method("GET"))
        .and(path(format!("{OBJECTS}/Guild/1")))
        .and(header("Authorization", "Bearer foundry-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "__primaryKey": "1",
            "server_id": "1",
            "name": "Walrus Land",
            "setting_election_members": ["1_2", "1_3"],
            "setting_election_roles": ["10"],
            "setting_election_cadence": 15,
            "live_election_id": live_election_id
        })))
        .mount(server)
        .await;
}

// ── Reads ────────────────────────────────────────────────────────────

#[tokio::test]
async fn token_is_cached_across_requests() {
    let server = server_with_token().await;
    mount_guild(&server, "none").await;

    let foundry = client(&server);
    for _ in 0..3 {
        let record = foundry.get_guild(GUILD).await.unwrap().unwrap();
        assert_eq!(record.setting_election_cadence, Some(15));
        assert_eq!(record.setting_election_members, vec!["1_2", "1_3"]);
        assert!(record.live_election().is_none());
    }
}

#[tokio::test]
async fn missing_guild_is_none() {
    let server = server_with_token().await;
    Mock::given(method("GET"))
        .and(path(format!("{OBJECTS}/Guild/9")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert!(client(&server).get_guild(GuildId(9)).await.unwrap().is_none());
}

#[tokio::test]
async fn rejected_credentials_are_auth_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/multipass/api/oauth2/token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client(&server).get_guild(GUILD).await.unwrap_err();
    assert!(matches!(err, OntologyError::Auth(_)));
}

#[tokio::test]
async fn object_ids_follow_page_tokens() {
    let server = server_with_token().await;
    Mock::given(method("GET"))
        .and(path(format!("{OBJECTS}/Role")))
        .and(query_param("pageToken", "page-2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": [{"role_id": "12"}]})),
        )
        .with_priority(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{OBJECTS}/Role")))
        .and(query_param("select", "role_id"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"role_id": "10"}, {"role_id": 11}],
            "nextPageToken": "page-2"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ids = client(&server).list_object_ids(ObjectKind::Role).await.unwrap();
    assert_eq!(ids, vec!["10", "11", "12"]);
}

// ── Actions ──────────────────────────────────────────────────────────

#[tokio::test]
async fn begin_election_applies_start_action() {
    let server = server_with_token().await;
    mount_guild(&server, "none").await;
    let election = ElectionId::new();
    Mock::given(method("POST"))
        .and(path(format!("{ACTIONS}/start_election/apply")))
        .and(body_partial_json(json!({
            "options": {"mode": "VALIDATE_AND_EXECUTE", "returnEdits": "ALL"},
            "parameters": {"guild": "1", "live_election_id": election.to_string()}
        })))
        .respond_with(valid())
        .expect(1)
        .mount(&server)
        .await;

    client(&server).begin_election(GUILD, election).await.unwrap();
}

#[tokio::test]
async fn begin_election_conflicts_with_live_marker() {
    let server = server_with_token().await;
    mount_guild(&server, "6b1f7f4e-live").await;
    Mock::given(method("POST"))
        .and(path(format!("{ACTIONS}/start_election/apply")))
        .respond_with(valid())
        .expect(0)
        .mount(&server)
        .await;

    let err = client(&server)
        .begin_election(GUILD, ElectionId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, OntologyError::Conflict(_)));
}

#[tokio::test]
async fn invalid_validation_result_is_rejected() {
    let server = server_with_token().await;
    let election = ElectionId::new();
    mount_guild(&server, &election.to_string()).await;
    Mock::given(method("POST"))
        .and(path(format!("{ACTIONS}/stop_election/apply")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"validation": {"result": "INVALID"}})),
        )
        .mount(&server)
        .await;

    let err = client(&server).end_election(GUILD, election).await.unwrap_err();
    assert!(matches!(err, OntologyError::Rejected(_)));
}

#[tokio::test]
async fn end_election_leaves_marker_of_another_election() {
    let server = server_with_token().await;
    mount_guild(&server, "6b1f7f4e-live").await;
    Mock::given(method("POST"))
        .and(path(format!("{ACTIONS}/stop_election/apply")))
        .respond_with(valid())
        .expect(0)
        .mount(&server)
        .await;

    let foundry = client(&server);
    let err = foundry
        .end_election(GUILD, ElectionId::new())
        .await
        .unwrap_err();
    assert!(matches!(err, OntologyError::Conflict(_)));
}

#[tokio::test]
async fn end_election_without_marker_is_noop() {
    let server = server_with_token().await;
    mount_guild(&server, "none").await;
    Mock::given(method("POST"))
        .and(path(format!("{ACTIONS}/stop_election/apply")))
        .respond_with(valid())
        .expect(0)
        .mount(&server)
        .await;

    client(&server)
        .end_election(GUILD, ElectionId::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn result_record_parameters() {
    let server = server_with_token().await;
    Mock::given(method("POST"))
        .and(path(format!("{ACTIONS}/create_election_result/apply")))
        .and(body_partial_json(json!({
            "parameters": {"guild": "1", "member": "1_2", "role": "10"}
        })))
        .respond_with(valid())
        .expect(1)
        .mount(&server)
        .await;

    let result = ElectionResult::new(GUILD, OntologyMemberId::from("1_2"), RoleId(10));
    client(&server).record_election_result(&result).await.unwrap();
}

#[tokio::test]
async fn delete_objects_uses_kind_action() {
    let server = server_with_token().await;
    Mock::given(method("POST"))
        .and(path(format!("{ACTIONS}/delete_text_channels/apply")))
        .and(body_partial_json(json!({"parameters": {"text_channels": ["5", "6"]}})))
        .respond_with(valid())
        .expect(1)
        .mount(&server)
        .await;

    let foundry = client(&server);
    foundry
        .delete_objects(ObjectKind::TextChannel, &["5".to_string(), "6".to_string()])
        .await
        .unwrap();
    // Nothing to delete: no request at all
    foundry.delete_objects(ObjectKind::Member, &[]).await.unwrap();
}

#[tokio::test]
async fn channel_categories_upsert_and_delete() {
    let server = server_with_token().await;
    Mock::given(method("POST"))
        .and(path(format!("{ACTIONS}/upsert_channel_category/apply")))
        .and(body_partial_json(json!({
            "parameters": {"category_id": "4", "linked_server_id": "1", "name": "Town Hall"}
        })))
        .respond_with(valid())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{ACTIONS}/delete_channel_categories/apply")))
        .and(body_partial_json(json!({"parameters": {"categories": ["7"]}})))
        .respond_with(valid())
        .expect(1)
        .mount(&server)
        .await;

    let foundry = client(&server);
    let record = ChannelCategoryRecord {
        category_id: "4".into(),
        linked_server_id: "1".into(),
        name: "Town Hall".into(),
        position: 1,
    };
    foundry.upsert_channel_category(&record).await.unwrap();
    foundry
        .delete_objects(ObjectKind::ChannelCategory, &["7".to_string()])
        .await
        .unwrap();
}
