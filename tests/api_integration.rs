//! Integration tests for the relay API endpoints.
//!
//! These tests verify the full request/response cycle through the HTTP API,
//! against a fake dispatch server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum_test::TestServer;
use serde_json::{Value, json};
use tower::ServiceExt;

use common::{FakeDispatch, REJECT};
use resq_relay::api::{AppState, router};
use resq_relay::connectivity::Connectivity;
use resq_relay::intake::ReportIntake;
use resq_relay::location::{DeviceLocation, LocationRefresher};
use resq_relay::model::{Coordinates, OFFLINE_LOCATION_MARKER, UPDATED_LOCATION_MARKER};
use resq_relay::queue::ReportQueue;
use resq_relay::reconciler::Reconciler;
use resq_relay::storage::Storage;
use resq_relay::submitter::ApiClient;

const DELHI: Coordinates = Coordinates {
    latitude: 28.6139,
    longitude: 77.209,
};

fn test_state(base_url: &str, storage: Storage, location: DeviceLocation, connectivity: &Connectivity) -> AppState {
    let client = ApiClient::new(base_url, Duration::from_secs(5)).unwrap();
    let queue = ReportQueue::new(storage);

    AppState {
        intake: Arc::new(ReportIntake::new(
            queue.clone(),
            client.clone(),
            location.clone(),
            connectivity.clone(),
        )),
        reconciler: Arc::new(Reconciler::new(
            queue,
            client,
            LocationRefresher::new(location),
            connectivity.clone(),
        )),
        connectivity: connectivity.clone(),
    }
}

struct Harness {
    server: TestServer,
    dispatch: FakeDispatch,
    connectivity: Connectivity,
}

async fn create_test_server(location: DeviceLocation, online: bool) -> Harness {
    let (dispatch, base_url) = FakeDispatch::start().await;

    let storage = Storage::new("sqlite::memory:").await.unwrap();
    let connectivity = Connectivity::new(online);
    let state = test_state(&base_url, storage, location, &connectivity);

    Harness {
        server: TestServer::new(router(state)).unwrap(),
        dispatch,
        connectivity,
    }
}

fn report(description: &str) -> Value {
    json!({
        "description": description,
        "tag": "flood",
        "severity": "high",
        "mobile_number": "9876543210"
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let harness = create_test_server(DeviceLocation::Unavailable, false).await;

    let response = harness.server.get("/health").await;

    response.assert_status_ok();
}

#[tokio::test]
async fn test_router_oneshot_health() {
    let storage = Storage::new("sqlite::memory:").await.unwrap();
    let state = test_state("http://127.0.0.1:9/api", storage, DeviceLocation::Unavailable, &Connectivity::new(false));

    let response = router(state)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_invalid_report_rejected() {
    let harness = create_test_server(DeviceLocation::Fixed(DELHI), true).await;

    let response = harness
        .server
        .post("/report")
        .json(&json!({ "description": "Fire", "mobile_number": "12345" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "Please enter a valid 10-digit mobile number.");
    assert!(harness.dispatch.received().is_empty());
}

#[tokio::test]
async fn test_offline_report_is_queued() {
    let harness = create_test_server(DeviceLocation::Fixed(DELHI), false).await;

    let response = harness.server.post("/report").json(&report("Road flooded")).await;

    response.assert_status(StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert_eq!(body["status"], "queued");
    assert_eq!(body["location_accuracy_low"], false);

    let queue: Value = harness.server.get("/queue").await.json();
    assert_eq!(queue["count"], 1);
    assert_eq!(queue["reports"][0]["id"], body["id"]);
    assert_eq!(queue["reports"][0]["description"], "Road flooded");
    assert_eq!(queue["reports"][0]["lat"], 28.6139);
    assert_eq!(queue["reports"][0]["tag"], "flood");
}

#[tokio::test]
async fn test_offline_report_without_location_uses_placeholder() {
    let harness = create_test_server(DeviceLocation::Unavailable, false).await;

    let response = harness.server.post("/report").json(&report("Road flooded")).await;

    response.assert_status(StatusCode::ACCEPTED);
    let body: Value = response.json();
    assert_eq!(body["location_accuracy_low"], true);

    let queue: Value = harness.server.get("/queue").await.json();
    let queued = &queue["reports"][0];
    assert_eq!(queued["lat"], 20.5937);
    assert_eq!(queued["lng"], 78.9629);
    assert_eq!(
        queued["description"],
        format!("Road flooded {OFFLINE_LOCATION_MARKER}")
    );
}

#[tokio::test]
async fn test_online_report_is_sent() {
    let harness = create_test_server(DeviceLocation::Fixed(DELHI), true).await;

    let response = harness.server.post("/report").json(&report("Bridge collapsed")).await;

    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["status"], "sent");

    let received = harness.dispatch.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["description"], "Bridge collapsed");
    assert_eq!(received[0]["severity"], "high");
    assert!(received[0].get("id").is_none());
    assert!(received[0].get("mobile_number").is_none());

    let queue: Value = harness.server.get("/queue").await.json();
    assert_eq!(queue["count"], 0);
}

#[tokio::test]
async fn test_online_report_without_location_is_refused() {
    let harness = create_test_server(DeviceLocation::Unavailable, true).await;

    let response = harness.server.post("/report").json(&report("Bridge collapsed")).await;

    response.assert_status(StatusCode::UNPROCESSABLE_ENTITY);
    let queue: Value = harness.server.get("/queue").await.json();
    assert_eq!(queue["count"], 0);
}

#[tokio::test]
async fn test_online_send_failure_is_not_queued() {
    let harness = create_test_server(DeviceLocation::Fixed(DELHI), true).await;

    let response = harness
        .server
        .post("/report")
        .json(&report(&format!("Bridge collapsed {REJECT}")))
        .await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    let body: Value = response.json();
    assert_eq!(body["error"], "Failed to send report. Check connection or try again.");

    let queue: Value = harness.server.get("/queue").await.json();
    assert_eq!(queue["count"], 0);
}

#[tokio::test]
async fn test_flush_while_offline_is_skipped() {
    let harness = create_test_server(DeviceLocation::Fixed(DELHI), false).await;
    harness.server.post("/report").json(&report("Road flooded")).await;

    let response = harness.server.post("/queue/flush").await;

    response.assert_status_ok();
    let outcome: Value = response.json();
    assert_eq!(outcome["outcome"], "skipped");
    assert_eq!(outcome["reason"], "offline");
    assert!(harness.dispatch.received().is_empty());
}

#[tokio::test]
async fn test_flush_delivers_queued_reports() {
    let harness = create_test_server(DeviceLocation::Fixed(DELHI), false).await;
    harness.server.post("/report").json(&report("Road flooded")).await;
    harness.server.post("/report").json(&report("Water rising")).await;

    harness.connectivity.set_online(true);
    let outcome: Value = harness.server.post("/queue/flush").await.json();

    assert_eq!(outcome["outcome"], "completed");
    assert_eq!(outcome["attempted"], 2);
    assert_eq!(outcome["delivered"], 2);
    assert_eq!(outcome["pending"], 0);

    let received = harness.dispatch.received();
    assert_eq!(received.len(), 2);
    for body in &received {
        let description = body["description"].as_str().unwrap();
        assert!(description.ends_with(UPDATED_LOCATION_MARKER));
    }

    let queue: Value = harness.server.get("/queue").await.json();
    assert_eq!(queue["count"], 0);
}

#[tokio::test]
async fn test_flush_keeps_rejected_reports() {
    let harness = create_test_server(DeviceLocation::Fixed(DELHI), false).await;
    harness.server.post("/report").json(&report("Road flooded")).await;
    let rejected: Value = harness
        .server
        .post("/report")
        .json(&report(&format!("Water rising {REJECT}")))
        .await
        .json();

    harness.connectivity.set_online(true);
    let outcome: Value = harness.server.post("/queue/flush").await.json();

    assert_eq!(outcome["delivered"], 1);
    assert_eq!(outcome["pending"], 1);

    let queue: Value = harness.server.get("/queue").await.json();
    assert_eq!(queue["count"], 1);
    assert_eq!(queue["reports"][0]["id"], rejected["id"]);
}

#[tokio::test]
async fn test_status_reports_queue_and_passes() {
    let harness = create_test_server(DeviceLocation::Fixed(DELHI), false).await;
    harness.server.post("/report").json(&report("Road flooded")).await;
    harness.server.post("/queue/flush").await;

    let response = harness.server.get("/status").await;

    response.assert_status_ok();
    let status: Value = response.json();
    assert_eq!(status["online"], false);
    assert_eq!(status["queued"], 1);
    assert_eq!(status["reconciler"]["state"], "idle");
    assert_eq!(status["reconciler"]["passes"], 1);
    assert!(status["reconciler"]["last_pass"].is_null());
}
