//! End-to-end flow: duplicate registration on the user facade turns into an
//! email record on the email facade over one shared in-process channel.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower::ServiceExt;

use domain::DUPLICATE_REGISTRATION_SUBJECT;
use email_service_lib::config::EmailServiceConfig;
use messaging::{EventChannel, MemoryChannel};
use user_service_lib::config::UserServiceConfig;

struct Pipeline {
    users: Router,
    emails: Router,
    stop: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

async fn start() -> Pipeline {
    let channel: Arc<dyn EventChannel> = Arc::new(MemoryChannel::new());

    let user_state =
        user_service_lib::build_state(&UserServiceConfig::in_memory(), channel.clone())
            .await
            .unwrap();

    let email_config = EmailServiceConfig::in_memory();
    let email_state = email_service_lib::build_state(&email_config, channel)
        .await
        .unwrap();
    let consumer = Arc::new(email_service_lib::build_consumer(&email_state, &email_config));

    let (stop, stop_rx) = watch::channel(false);
    let workers = consumer.spawn_pool(email_config.consumers, stop_rx);

    Pipeline {
        users: user_service_lib::http::create_router(user_state),
        emails: email_service_lib::http::create_router(email_state),
        stop,
        workers,
    }
}

impl Pipeline {
    async fn shutdown(self) {
        self.stop.send(true).unwrap();
        for worker in self.workers {
            tokio::time::timeout(Duration::from_secs(2), worker)
                .await
                .expect("consumer did not stop")
                .unwrap();
        }
    }
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

async fn emails(app: &Router) -> Vec<Value> {
    let (status, body) = send(app, Method::GET, "/emails", None).await;
    assert_eq!(status, StatusCode::OK);
    serde_json::from_slice(&body).unwrap()
}

/// Poll the email facade until `count` records exist
async fn wait_for_emails(app: &Router, count: usize) -> Vec<Value> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let records = emails(app).await;
        if records.len() >= count {
            return records;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "expected {} email records, found {}",
            count,
            records.len()
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn test_duplicate_registration_produces_email_record() {
    let pipeline = start().await;

    let (status, _) = send(
        &pipeline.users,
        Method::POST,
        "/users",
        Some(json!({ "name": "Alice", "email": "a@x.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &pipeline.users,
        Method::POST,
        "/users",
        Some(json!({ "name": "Bob", "email": "a@x.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(String::from_utf8(body).unwrap().contains("a@x.com"));

    let records = wait_for_emails(&pipeline.emails, 1).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["emailTo"], "a@x.com");
    assert_eq!(records[0]["subject"], DUPLICATE_REGISTRATION_SUBJECT);
    assert_eq!(records[0]["statusEmail"], "SENT");

    // The record is reachable through the per-user listing as well
    let user_id = records[0]["userId"].as_str().unwrap();
    let (status, body) = send(
        &pipeline.emails,
        Method::GET,
        &format!("/users/{}/emails", user_id),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(serde_json::from_slice::<Vec<Value>>(&body).unwrap().len(), 1);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_successful_registration_sends_nothing_by_default() {
    let pipeline = start().await;

    let (status, _) = send(
        &pipeline.users,
        Method::POST,
        "/users",
        Some(json!({ "name": "Alice", "email": "a@x.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(emails(&pipeline.emails).await.is_empty());

    pipeline.shutdown().await;
}

#[tokio::test]
async fn test_each_duplicate_attempt_gets_its_own_record() {
    let pipeline = start().await;

    for name in ["Alice", "Bob", "Carol"] {
        send(
            &pipeline.users,
            Method::POST,
            "/users",
            Some(json!({ "name": name, "email": "a@x.com" })),
        )
        .await;
    }

    let records = wait_for_emails(&pipeline.emails, 2).await;
    assert_eq!(records.len(), 2);

    pipeline.shutdown().await;
}
