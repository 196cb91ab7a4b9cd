//! HTTP facade tests against the in-process store and channel.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use common::AppError;
use domain::EmailMessage;
use email_service_lib::config::EmailServiceConfig;
use email_service_lib::http::{create_router, AppState};
use email_service_lib::repository::MemoryEmailStore;
use email_service_lib::service::{EmailNotifier, EmailService, LogMailer};
use messaging::{EventChannel, MemoryChannel, MockEventChannel};

// =============================================================================
// Test Helpers
// =============================================================================

fn state_with(channel: Arc<dyn EventChannel>) -> AppState {
    let store = Arc::new(MemoryEmailStore::new());
    let notifier = Arc::new(EmailNotifier::new(
        store.clone(),
        Arc::new(LogMailer),
        &EmailServiceConfig::in_memory(),
    ));
    AppState::new(notifier, store, channel)
}

async fn seed(state: &AppState, user_id: Uuid, email_to: &str, subject: &str) {
    let payload = EmailMessage::new(user_id, email_to, subject, "Body")
        .encode()
        .unwrap();
    state.email_service.on_message(&payload).await.unwrap();
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

// =============================================================================
// Emails
// =============================================================================

#[tokio::test]
async fn test_list_emails_empty() {
    let app = create_router(state_with(Arc::new(MemoryChannel::new())));

    let (status, body) = get(&app, "/emails").await;

    assert_eq!(status, StatusCode::OK);
    let records: Vec<Value> = serde_json::from_slice(&body).unwrap();
    assert!(records.is_empty());
}

#[tokio::test]
async fn test_list_and_get_email() {
    let state = state_with(Arc::new(MemoryChannel::new()));
    let user_id = Uuid::new_v4();
    seed(&state, user_id, "a@x.com", "Registration attempt").await;
    let app = create_router(state);

    let (status, body) = get(&app, "/emails").await;
    assert_eq!(status, StatusCode::OK);
    let records: Vec<Value> = serde_json::from_slice(&body).unwrap();
    assert_eq!(records.len(), 1);

    let record = &records[0];
    assert_eq!(record["emailTo"], "a@x.com");
    assert_eq!(record["emailFrom"], "noreply@example.com");
    assert_eq!(record["userId"], user_id.to_string());
    assert_eq!(record["statusEmail"], "SENT");

    let id = record["emailId"].as_str().unwrap();
    let (status, body) = get(&app, &format!("/emails/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    let fetched: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(&fetched, record);
}

#[tokio::test]
async fn test_get_unknown_email_is_404() {
    let app = create_router(state_with(Arc::new(MemoryChannel::new())));

    let (status, _) = get(&app, &format!("/emails/{}", Uuid::new_v4())).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_get_email_with_bad_id_is_400() {
    let app = create_router(state_with(Arc::new(MemoryChannel::new())));

    let (status, body) = get(&app, "/emails/not-a-uuid").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(String::from_utf8(body).unwrap().contains("Invalid ID format"));
}

#[tokio::test]
async fn test_list_user_emails_filters_by_user() {
    let state = state_with(Arc::new(MemoryChannel::new()));
    let alice = Uuid::new_v4();
    seed(&state, alice, "a@x.com", "One").await;
    seed(&state, alice, "a@x.com", "Two").await;
    seed(&state, Uuid::new_v4(), "b@x.com", "Three").await;
    let app = create_router(state);

    let (status, body) = get(&app, &format!("/users/{}/emails", alice)).await;

    assert_eq!(status, StatusCode::OK);
    let records: Vec<Value> = serde_json::from_slice(&body).unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r["userId"] == alice.to_string()));
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_reports_healthy() {
    let app = create_router(state_with(Arc::new(MemoryChannel::new())));

    let (status, body) = get(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["services"]["database"]["status"], "healthy");
}

#[tokio::test]
async fn test_health_degraded_when_channel_down() {
    let mut channel = MockEventChannel::new();
    channel
        .expect_ping()
        .returning(|| Err(AppError::infrastructure("Event channel")));
    let app = create_router(state_with(Arc::new(channel)));

    let (status, body) = get(&app, "/health").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let health: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["services"]["channel"]["status"], "unhealthy");
}

#[tokio::test]
async fn test_openapi_document_lists_email_paths() {
    let app = create_router(state_with(Arc::new(MemoryChannel::new())));

    let (status, body) = get(&app, "/api-docs/openapi.json").await;

    assert_eq!(status, StatusCode::OK);
    let doc: Value = serde_json::from_slice(&body).unwrap();
    assert!(doc["paths"]["/emails"].is_object());
    assert!(doc["paths"]["/users/{id}/emails"].is_object());
}
