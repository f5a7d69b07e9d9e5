//! Report intake: the handoff from the report form.
//!
//! A validated draft is located, then either sent straight to the API
//! (online) or appended to the durable queue (offline). When the position
//! cannot be obtained while offline, the report is still queued with
//! placeholder coordinates and a description note, and gets real
//! coordinates from the refresh on reconnect. When it cannot be obtained
//! while online, nothing is sent or queued and the reporter is asked to
//! enable location access.

use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::connectivity::Connectivity;
use crate::location::{INTAKE_TIMEOUT, LocationError, LocationProvider, PositionOptions, request_position};
use crate::model::{
    OFFLINE_LOCATION_MARKER, PLACEHOLDER_COORDINATES, QueuedReport, ReportDraft, ValidationError,
};
use crate::queue::ReportQueue;
use crate::storage::KeyValueStore;
use crate::submitter::{SubmitError, Submitter};

/// What happened to an accepted draft.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    /// Acknowledged by the server.
    Sent,
    /// Stored locally; will be delivered by a later reconciliation pass.
    Queued { id: Uuid, location_accuracy_low: bool },
}

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Could not get location: {0}. Enable location access & try again.")]
    Location(#[source] LocationError),

    #[error("Failed to send report. Check connection or try again.")]
    Send(#[source] SubmitError),

    #[error("Offline. Could not save report locally.")]
    QueueWrite(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub struct ReportIntake<S, U, L> {
    queue: ReportQueue<S>,
    submitter: U,
    location: L,
    connectivity: Connectivity,
}

impl<S, U, L> ReportIntake<S, U, L>
where
    S: KeyValueStore,
    U: Submitter,
    L: LocationProvider,
{
    pub fn new(queue: ReportQueue<S>, submitter: U, location: L, connectivity: Connectivity) -> Self {
        Self {
            queue,
            submitter,
            location,
            connectivity,
        }
    }

    /// Accept a report from the form.
    #[instrument(skip_all, fields(tag = ?draft.tag, severity = ?draft.severity))]
    pub async fn submit_report(&self, draft: ReportDraft) -> Result<SubmissionOutcome, IntakeError> {
        draft.validate()?;

        let position = request_position(&self.location, PositionOptions::fresh(INTAKE_TIMEOUT)).await;
        // Connectivity is checked after the location request, which can take a while
        let online = self.connectivity.is_online();

        match (position, online) {
            (Ok(coordinates), true) => {
                let report = QueuedReport::new(coordinates, draft.description, draft.tag, draft.severity);
                self.submitter.submit(&report).await.map_err(|e| {
                    warn!(report_id = %report.id, error = %e, "Online report delivery failed");
                    IntakeError::Send(e)
                })?;
                info!(report_id = %report.id, "Report sent");
                Ok(SubmissionOutcome::Sent)
            }
            (Ok(coordinates), false) => {
                let report = QueuedReport::new(coordinates, draft.description, draft.tag, draft.severity);
                self.enqueue(report, false).await
            }
            (Err(e), false) => {
                warn!(error = %e, "Location unavailable while offline, queueing with placeholder coordinates");
                let description = format!("{} {OFFLINE_LOCATION_MARKER}", draft.description);
                let report = QueuedReport::new(PLACEHOLDER_COORDINATES, description, draft.tag, draft.severity);
                self.enqueue(report, true).await
            }
            (Err(e), true) => {
                warn!(error = %e, "Location unavailable while online, report not accepted");
                Err(IntakeError::Location(e))
            }
        }
    }

    async fn enqueue(
        &self,
        report: QueuedReport,
        location_accuracy_low: bool,
    ) -> Result<SubmissionOutcome, IntakeError> {
        let id = report.id;
        self.queue.append(report).await.map_err(|e| {
            warn!(report_id = %id, error = %e, "Failed to queue report locally");
            IntakeError::QueueWrite(e.into())
        })?;

        info!(report_id = %id, "Offline, report queued for delivery on reconnect");
        Ok(SubmissionOutcome::Queued {
            id,
            location_accuracy_low,
        })
    }
}
