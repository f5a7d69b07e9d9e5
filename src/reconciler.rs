//! Reconciliation passes: replaying the durable queue to the remote API.
//!
//! One pass runs, strictly in order:
//!
//! 1. Skip if offline (no storage access at all)
//! 2. Load the queue; skip if empty (no location or network requests)
//! 3. Refresh locations for the whole batch (best effort)
//! 4. Submit every report concurrently and wait for all of them to settle
//! 5. Partition the outcomes by report id
//! 6. Write back only what is still pending
//!
//! Passes are serialized: a pass triggered while another is running waits
//! for it, then re-checks connectivity and reloads the queue. Together with
//! the queue's write lock this means a report is never submitted by two
//! passes from the same snapshot, and an append made mid-pass survives the
//! write-back.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::connectivity::Connectivity;
use crate::location::{LocationProvider, LocationRefresher};
use crate::model::QueuedReport;
use crate::queue::ReportQueue;
use crate::storage::KeyValueStore;
use crate::submitter::{SubmitError, Submitter};

/// How a single submission attempt settled.
#[derive(Debug)]
pub enum Delivery {
    Delivered,
    Failed(SubmitError),
}

/// Per-report outcomes of one pass, keyed by report id.
#[derive(Debug, Default)]
pub struct ReconciliationResult {
    outcomes: HashMap<Uuid, Delivery>,
}

impl ReconciliationResult {
    pub fn record(&mut self, id: Uuid, outcome: Result<(), SubmitError>) {
        let delivery = match outcome {
            Ok(()) => Delivery::Delivered,
            Err(e) => Delivery::Failed(e),
        };
        self.outcomes.insert(id, delivery);
    }

    /// Ids acknowledged by the server.
    pub fn delivered(&self) -> HashSet<Uuid> {
        self.outcomes
            .iter()
            .filter(|(_, d)| matches!(d, Delivery::Delivered))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .values()
            .filter(|d| matches!(d, Delivery::Failed(_)))
            .count()
    }
}

/// Why a pass did no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Offline,
    EmptyQueue,
}

/// Summary of a pass that attempted delivery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Reports submitted in this pass.
    pub attempted: usize,
    pub delivered: usize,
    /// Reports left in the queue after write-back, including any appended mid-pass.
    pub pending: usize,
    /// Set when the write-back failed; the queue then still holds delivered reports.
    pub save_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PassOutcome {
    Skipped { reason: SkipReason },
    Completed(PassSummary),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PassState {
    #[default]
    Idle,
    Running,
}

/// Observable reconciler state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileStatus {
    pub state: PassState,
    /// Passes finished since start, skipped ones included.
    pub passes: u64,
    pub last_pass: Option<PassSummary>,
    pub last_error: Option<String>,
}

/// Drains the durable queue into the remote API.
pub struct Reconciler<S, U, L> {
    queue: ReportQueue<S>,
    submitter: U,
    refresher: LocationRefresher<L>,
    connectivity: Connectivity,
    pass_lock: Mutex<()>,
    status: watch::Sender<ReconcileStatus>,
}

impl<S, U, L> Reconciler<S, U, L>
where
    S: KeyValueStore,
    U: Submitter,
    L: LocationProvider,
{
    pub fn new(
        queue: ReportQueue<S>,
        submitter: U,
        refresher: LocationRefresher<L>,
        connectivity: Connectivity,
    ) -> Self {
        let (status, _) = watch::channel(ReconcileStatus::default());
        Self {
            queue,
            submitter,
            refresher,
            connectivity,
            pass_lock: Mutex::new(()),
            status,
        }
    }

    pub fn queue(&self) -> &ReportQueue<S> {
        &self.queue
    }

    pub fn status(&self) -> ReconcileStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ReconcileStatus> {
        self.status.subscribe()
    }

    /// Run one reconciliation pass to completion.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> PassOutcome {
        let _pass = self.pass_lock.lock().await;

        let outcome = self.run_pass().await;

        self.status.send_modify(|status| {
            status.state = PassState::Idle;
            status.passes += 1;
            if let PassOutcome::Completed(summary) = &outcome {
                status.last_error = summary.save_error.clone();
                status.last_pass = Some(summary.clone());
            }
        });

        outcome
    }

    async fn run_pass(&self) -> PassOutcome {
        if !self.connectivity.is_online() {
            debug!("Offline, skipping reconciliation");
            return PassOutcome::Skipped {
                reason: SkipReason::Offline,
            };
        }

        let reports = self.queue.load().await;
        if reports.is_empty() {
            debug!("No queued reports");
            return PassOutcome::Skipped {
                reason: SkipReason::EmptyQueue,
            };
        }

        self.status.send_modify(|status| status.state = PassState::Running);
        let started_at = Utc::now();
        info!(queued = reports.len(), "Reconciling queued reports");

        let refreshed = self.refresher.refresh(reports).await;
        let result = self.submit_all(&refreshed).await;

        let delivered = result.delivered();
        let attempted = refreshed.len();
        let still_pending: Vec<QueuedReport> = refreshed
            .into_iter()
            .filter(|report| !delivered.contains(&report.id))
            .collect();
        let fallback_pending = still_pending.len();

        let (pending, save_error) = match self.queue.settle(&delivered, still_pending).await {
            Ok(pending) => (pending, None),
            Err(e) => {
                warn!(error = %e, "Failed to write back report queue");
                (fallback_pending, Some(e.to_string()))
            }
        };

        if !delivered.is_empty() {
            info!(delivered = delivered.len(), "Queued reports delivered");
        }
        if result.failed_count() > 0 {
            warn!(failed = result.failed_count(), pending, "Reports remain queued after failed delivery");
        }

        PassOutcome::Completed(PassSummary {
            started_at,
            finished_at: Utc::now(),
            attempted,
            delivered: delivered.len(),
            pending,
            save_error,
        })
    }

    /// Submit every report independently; a failure never affects the others.
    async fn submit_all(&self, reports: &[QueuedReport]) -> ReconciliationResult {
        let attempts = reports.iter().map(|report| async move {
            let outcome = self.submitter.submit(report).await;
            if let Err(e) = &outcome {
                warn!(report_id = %report.id, error = %e, "Report delivery failed");
            }
            (report.id, outcome)
        });

        let mut result = ReconciliationResult::default();
        for (id, outcome) in join_all(attempts).await {
            result.record(id, outcome);
        }
        result
    }
}

impl<S, U, L> Reconciler<S, U, L>
where
    S: KeyValueStore + 'static,
    U: Submitter + 'static,
    L: LocationProvider + 'static,
{
    /// Start a pass in the background. The outcome is logged and also
    /// available from the returned handle.
    pub fn spawn(self: &Arc<Self>, trigger: &'static str) -> JoinHandle<PassOutcome> {
        let reconciler = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = reconciler.reconcile().await;
            debug!(trigger, ?outcome, "Reconciliation pass finished");
            outcome
        })
    }
}
