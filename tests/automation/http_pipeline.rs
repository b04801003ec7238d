use crate::support::{POST_TEXT, Workspace, daily_location};
use chrono::Duration;
use locopilot::delivery::Protocol;
use locopilot::engine::{Engine, EngineParts, PostOutcome};
use locopilot::entitlement::SubscriptionStatus;
use locopilot::recovery::ActivityAction;
use locopilot::security::SecretStore;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn engine_against(ws: &mut Workspace, server: &MockServer) -> Engine {
    ws.config.content.api_url = format!("{}/llm", server.uri());
    ws.config.content.api_key = Some("sk-test".into());
    ws.config.credentials.token_url = format!("{}/token", server.uri());
    ws.config.credentials.client_id = Some("client-1".into());
    ws.config.delivery.primary_base_url = format!("{}/v1", server.uri());
    ws.config.delivery.legacy_base_url = format!("{}/v4", server.uri());
    ws.config.delivery.timeout_secs = 5;

    Engine::new(
        &ws.config,
        &ws.store,
        SecretStore::new(ws.tmp.path(), true),
        EngineParts::from_config(&ws.config),
    )
}

#[tokio::test]
async fn manual_post_refreshes_the_token_and_falls_back_to_legacy() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-p-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "fresh-token",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/llm/chat/completions"))
        .and(header("Authorization", "Bearer sk-test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "choices": [{"message": {"content": POST_TEXT}}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/locations/loc-9/localPosts"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v4/accounts/77/locations/loc-9/localPosts"))
        .and(header("Authorization", "Bearer fresh-token"))
        .and(body_partial_json(serde_json::json!({"topicType": "STANDARD"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "accounts/77/locations/loc-9/localPosts/42"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut ws = Workspace::new().await;
    let engine = engine_against(&mut ws, &server).await;
    ws.subscribe("p-1", SubscriptionStatus::Active, None).await;
    // Inside the refresh buffer, so the first use refreshes it.
    ws.connect(&engine, "p-1", Duration::minutes(10)).await;
    ws.add_location(&daily_location("loc-9", "p-1", None)).await;

    let outcome = engine.trigger_post_now("loc-9", None).await.unwrap();
    let PostOutcome::Published {
        protocol,
        post_name,
        content,
        ..
    } = outcome
    else {
        panic!("expected a published post, got {outcome:?}");
    };
    assert_eq!(protocol, Protocol::Legacy);
    assert_eq!(
        post_name.as_deref(),
        Some("accounts/77/locations/loc-9/localPosts/42")
    );
    assert!(content.ends_with("\n\n📍 12 Pier Road"));

    let stored = engine
        .services()
        .credentials
        .get("p-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.access_token, "fresh-token");
    assert!(ws.load("loc-9").await.posting.last_run_at.is_some());

    let status = engine.get_status("loc-9").await.unwrap();
    let latest = &status.recent_activity[0];
    assert_eq!(latest.action, ActivityAction::Post);
    assert!(latest.is_success());
    engine.shutdown();
}

#[tokio::test]
async fn rejected_refresh_invalidates_the_credential_and_skips_posting() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "Token has been revoked"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/llm/chat/completions"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut ws = Workspace::new().await;
    let engine = engine_against(&mut ws, &server).await;
    ws.subscribe("p-1", SubscriptionStatus::Active, None).await;
    ws.connect(&engine, "p-1", Duration::minutes(5)).await;
    ws.add_location(&daily_location("loc-9", "p-1", None)).await;

    let err = engine.trigger_post_now("loc-9", None).await.unwrap_err();
    assert_eq!(err.code(), "credential_unavailable");

    let stored = engine
        .services()
        .credentials
        .get("p-1")
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.is_valid);
    assert!(ws.load("loc-9").await.posting.last_run_at.is_none());

    // No second refresh: the credential stays invalid until reauthorized.
    assert!(engine.trigger_post_now("loc-9", None).await.is_err());
    engine.shutdown();
}
