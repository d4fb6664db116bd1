//! Integration tests for the remote memory client and orchestrator:
//! namespace isolation, degradation when the service is away, and the
//! store contract.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use selkie::character::Character;
use selkie::config::MemoryConfig;
use selkie::memory::{MemoryClient, MemoryOrchestrator};
use selkie::pipeline::messages::{ConversationTurn, Role};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> MemoryConfig {
    MemoryConfig {
        url: server.uri(),
        ..MemoryConfig::default()
    }
}

fn character(id: &str) -> Character {
    Character {
        id: id.to_owned(),
        name: id.to_owned(),
        system_prompt: "You are a test character.".to_owned(),
        description: String::new(),
        temperature: 0.7,
        traits: vec![],
    }
}

#[tokio::test]
async fn search_is_scoped_to_the_requested_namespace() {
    let server = MockServer::start().await;

    // The "tech" namespace has a stored record; "creative" has none.
    Mock::given(method("POST"))
        .and(path("/memories/search"))
        .and(body_partial_json(json!({"namespace": "tech"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "matches": [{
                "id": "m-1",
                "content": "User said: explain TCP",
                "tags": ["conversation", "user"],
                "salience": 0.91
            }]
        })))
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/memories/search"))
        .and(body_partial_json(json!({"namespace": "creative"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "matches": [] })))
        .mount(&server)
        .await;

    let orchestrator = MemoryOrchestrator::new(&config_for(&server)).expect("orchestrator");

    let tech_records = orchestrator
        .recall("networking", &character("tech"))
        .await
        .expect("tech recall");
    assert_eq!(tech_records.len(), 1);
    assert!(tech_records[0].content.contains("explain TCP"));

    let creative_records = orchestrator
        .recall("networking", &character("creative"))
        .await
        .expect("creative recall");
    assert!(creative_records.is_empty());
}

#[tokio::test]
async fn store_sends_the_character_namespace_and_role_tags() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/memories"))
        .and(body_partial_json(json!({
            "namespace": "tech",
            "tags": ["conversation", "user"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "m-42"})))
        .expect(1)
        .mount(&server)
        .await;

    let orchestrator = MemoryOrchestrator::new(&config_for(&server)).expect("orchestrator");
    let turn = ConversationTurn::new(Role::User, "explain TCP");

    let id = orchestrator
        .store_turn(&turn, &character("tech"))
        .await
        .expect("store");
    assert_eq!(id, "m-42");

    let requests = server.received_requests().await.expect("requests");
    let body: serde_json::Value =
        serde_json::from_slice(&requests[0].body).expect("request body");
    assert_eq!(body["content"], "User said: explain TCP");
}

#[tokio::test]
async fn exchange_stores_both_sides_independently() {
    let server = MockServer::start().await;

    // The user-turn store fails; the assistant-turn store succeeds.
    Mock::given(method("POST"))
        .and(path("/memories"))
        .and(body_partial_json(json!({"tags": ["conversation", "user"]})))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/memories"))
        .and(body_partial_json(json!({"tags": ["conversation", "assistant"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "m-2"})))
        .mount(&server)
        .await;

    let orchestrator = MemoryOrchestrator::new(&config_for(&server)).expect("orchestrator");
    let user = ConversationTurn::new(Role::User, "hello");
    let assistant = ConversationTurn::new(Role::Assistant, "hi there");

    let (user_stored, assistant_stored) = orchestrator
        .store_exchange(&user, &assistant, &character("tech"))
        .await;

    assert!(user_stored.is_err());
    assert_eq!(assistant_stored.expect("assistant store"), "m-2");
}

#[tokio::test]
async fn unreachable_service_is_an_error_not_a_hang() {
    // Nothing listens here; the connection is refused immediately.
    let config = MemoryConfig {
        url: "http://127.0.0.1:1".to_owned(),
        request_timeout_secs: 2,
        ..MemoryConfig::default()
    };
    let orchestrator = MemoryOrchestrator::new(&config).expect("orchestrator");

    let result = orchestrator.recall("anything", &character("tech")).await;
    assert!(result.is_err());

    assert!(!orchestrator.check_connection().await);
}

#[tokio::test]
async fn empty_namespace_is_rejected_before_any_request() {
    let server = MockServer::start().await;
    let client = MemoryClient::new(&config_for(&server)).expect("client");

    assert!(client.search("q", "", 5).await.is_err());
    assert!(client.store("content", "", &[]).await.is_err());

    let requests = server.received_requests().await.expect("requests");
    assert!(requests.is_empty());
}

#[tokio::test]
async fn health_endpoint_drives_check_connection() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = MemoryClient::new(&config_for(&server)).expect("client");
    assert!(client.check_connection().await);
}
