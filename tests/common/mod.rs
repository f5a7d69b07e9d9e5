//! A stand-in for the remote dispatch API, served on an ephemeral port.

use std::sync::{Arc, Mutex};

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use serde_json::Value;
use tokio::net::TcpListener;

/// Descriptions containing this are answered with `500`.
pub const REJECT: &str = "[reject]";

#[derive(Clone, Default)]
pub struct FakeDispatch {
    received: Arc<Mutex<Vec<Value>>>,
}

impl FakeDispatch {
    /// Serve the fake API and return it with its base URL (ending in `/api`).
    pub async fn start() -> (Self, String) {
        let dispatch = Self::default();

        let app = Router::new()
            .route("/api", axum::routing::get(|| async { StatusCode::OK }))
            .route("/api/report_emergency", post(report_emergency))
            .with_state(dispatch.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (dispatch, format!("http://{addr}/api"))
    }

    /// Bodies of every acknowledged report, in arrival order.
    pub fn received(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }
}

async fn report_emergency(State(dispatch): State<FakeDispatch>, Json(body): Json<Value>) -> StatusCode {
    let description = body["description"].as_str().unwrap_or_default();
    if description.contains(REJECT) {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }

    dispatch.received.lock().unwrap().push(body);
    StatusCode::CREATED
}
