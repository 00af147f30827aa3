//! Integration test for the HTTP forwarder's dispatch-and-rewrite
//! pipeline, run against a mocked downstream application.

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::Request;
use rust_common::CircuitBreakerConfig;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tokenshield::config::{Config, EncryptionMode, TokenFormat};
use tokenshield::encryption::EncryptionFacade;
use tokenshield::http_forwarder::{router, ForwarderState};
use tokenshield::store::{InMemoryStore, Store};
use tokenshield::token_engine::TokenEngine;

fn config_for(app_endpoint: String) -> Config {
    Config {
        database_url: "postgres://tokenshield:pw@localhost:5432/tokenshield".to_string(),
        db_max_connections: 25,
        db_min_connections: 5,
        db_max_lifetime: Duration::from_secs(300),
        encryption_mode: EncryptionMode::Legacy,
        legacy_encryption_key: [9u8; 32],
        token_format: TokenFormat::Prefix,
        app_endpoint,
        http_port: 8080,
        icap_port: 1344,
        api_port: 8081,
        debug_mode: false,
        admin_secret: "test-secret".to_string(),
        circuit_breaker: CircuitBreakerConfig::default(),
        max_body_bytes: 10 * 1024 * 1024,
    }
}

/// A JSON request carrying a card number is tokenized before it reaches
/// the downstream application; the forwarder's response is passed back
/// untouched since `/checkout` is not on the detokenize allow-list.
#[tokio::test]
async fn test_forward_tokenizes_json_request_body() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/checkout"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&mock_server)
        .await;

    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let engine = Arc::new(TokenEngine::new(store, EncryptionFacade::legacy([9u8; 32]), TokenFormat::Prefix));
    let config = config_for(mock_server.uri());
    let state = Arc::new(ForwarderState::new(&config, engine).unwrap());
    let app = router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/checkout")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"card_number":"4532015112830366","amount":4999}"#))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), 200);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"ok");

    let received = mock_server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    let forwarded: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    let forwarded_card = forwarded["card_number"].as_str().unwrap();
    assert!(forwarded_card.starts_with("tok_"));
    assert_ne!(forwarded_card, "4532015112830366");
}

/// A response from an allow-listed endpoint has its tokens resolved
/// back to PANs before being returned to the caller.
#[tokio::test]
async fn test_forward_detokenizes_response_on_allowlisted_endpoint() {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let engine = Arc::new(TokenEngine::new(
        Arc::clone(&store),
        EncryptionFacade::legacy([9u8; 32]),
        TokenFormat::Prefix,
    ));
    let token = engine.tokenize("4532015112830366", None).await.unwrap();

    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/cards"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(format!(r#"{{"card_number":"{token}"}}"#))
                .insert_header("content-type", "application/json"),
        )
        .mount(&mock_server)
        .await;

    let config = config_for(mock_server.uri());
    let state = Arc::new(ForwarderState::new(&config, engine).unwrap());
    let app = router(state);

    let request = Request::builder()
        .method("GET")
        .uri("/api/cards")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), 200);

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let returned: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(returned["card_number"], "4532015112830366");
}
