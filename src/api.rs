//! HTTP API handlers for the local relay.
//!
//! - **POST /report**: Accept a report from the form. Sent straight to the
//!   remote API when online, queued on the device when offline.
//! - **GET /queue**: Reports waiting for delivery.
//! - **POST /queue/flush**: Run a reconciliation pass now.
//! - **GET /status**: Connectivity and reconciler state.
//! - **GET /health**: Liveness.
//!
//! # Privacy
//!
//! The reporter's mobile number is validated and then dropped. Handlers log
//! report ids and outcomes, never descriptions or phone numbers.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::connectivity::Connectivity;
use crate::intake::{IntakeError, ReportIntake, SubmissionOutcome};
use crate::location::DeviceLocation;
use crate::model::{QueuedReport, ReportDraft};
use crate::reconciler::{PassOutcome, ReconcileStatus, Reconciler};
use crate::storage::Storage;
use crate::submitter::ApiClient;

pub type RelayReconciler = Reconciler<Storage, ApiClient, DeviceLocation>;
pub type RelayIntake = ReportIntake<Storage, ApiClient, DeviceLocation>;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub intake: Arc<RelayIntake>,
    pub reconciler: Arc<RelayReconciler>,
    pub connectivity: Connectivity,
}

/// Build the relay router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/report", post(post_report))
        .route("/queue", get(get_queue))
        .route("/queue/flush", post(flush_queue))
        .route("/status", get(get_status))
        .route("/health", get(health_check))
        .with_state(state)
}

/// POST /report - Accept a report from the form.
///
/// # Request Body
///
/// ```json
/// {
///     "description": "Smoke from the third floor",
///     "tag": "fire",
///     "severity": "high",
///     "mobile_number": "9876543210"
/// }
/// ```
///
/// `tag` defaults to `fire` and `severity` to `low`.
///
/// # Response
///
/// - `201 Created` `{"status": "sent"}` when the server acknowledged it
/// - `202 Accepted` `{"status": "queued", "id": ..., "location_accuracy_low": ...}` when stored offline
/// - `400` invalid draft, `422` no location while online, `502` online send
///   failed, `500` could not be stored locally; all with `{"error": message}`
#[instrument(skip_all)]
pub async fn post_report(
    State(state): State<AppState>,
    Json(draft): Json<ReportDraft>,
) -> impl IntoResponse {
    match state.intake.submit_report(draft).await {
        Ok(outcome) => {
            let status = match outcome {
                SubmissionOutcome::Sent => StatusCode::CREATED,
                SubmissionOutcome::Queued { .. } => StatusCode::ACCEPTED,
            };
            info!(%status, "Report accepted");
            (status, Json(json!(outcome)))
        }
        Err(e) => {
            let status = match &e {
                IntakeError::Validation(_) => StatusCode::BAD_REQUEST,
                IntakeError::Location(_) => StatusCode::UNPROCESSABLE_ENTITY,
                IntakeError::Send(_) => StatusCode::BAD_GATEWAY,
                IntakeError::QueueWrite(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            warn!(%status, error = %e, "Report not accepted");
            (status, Json(json!({ "error": e.to_string() })))
        }
    }
}

/// Response for GET /queue.
#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub count: usize,
    pub reports: Vec<QueuedReport>,
}

/// GET /queue - Reports waiting for delivery, oldest first.
pub async fn get_queue(State(state): State<AppState>) -> Json<QueueResponse> {
    let reports = state.reconciler.queue().load().await;
    Json(QueueResponse {
        count: reports.len(),
        reports,
    })
}

/// POST /queue/flush - Run a reconciliation pass and report its outcome.
///
/// Waits for any pass already in progress first.
#[instrument(skip(state))]
pub async fn flush_queue(State(state): State<AppState>) -> Json<PassOutcome> {
    let outcome = state.reconciler.reconcile().await;
    info!(?outcome, "Manual reconciliation finished");
    Json(outcome)
}

/// Response for GET /status.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub online: bool,
    pub queued: usize,
    pub reconciler: ReconcileStatus,
}

/// GET /status - Connectivity and reconciler state.
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let queued = state.reconciler.queue().load().await.len();
    Json(StatusResponse {
        online: state.connectivity.is_online(),
        queued,
        reconciler: state.reconciler.status(),
    })
}

/// GET /health - Simple health check endpoint.
pub async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}
