//! Durable local queue of reports awaiting delivery.
//!
//! The queue is stored as one JSON array under [`QUEUE_KEY`]. Reads fail
//! open: a missing or undecodable value is an empty queue, and an undecodable
//! value is removed so it cannot wedge later passes. Write failures are
//! logged; the only caller that needs to know about them is the intake, which
//! uses [`ReportQueue::append`] and tells the reporter the report was not saved.
//!
//! Read-modify-write operations ([`ReportQueue::append`] and
//! [`ReportQueue::settle`]) share one write lock, so an append that lands
//! while a reconciliation pass is in flight is never overwritten by that
//! pass's write-back. They read through [`ReportQueue::try_load`] and write
//! nothing when the store cannot be read.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::model::QueuedReport;
use crate::storage::KeyValueStore;

/// Storage key holding the JSON-encoded queue.
pub const QUEUE_KEY: &str = "queuedEmergencyReports";

/// Handle to the persisted queue. Clones share the store and the write lock.
pub struct ReportQueue<S> {
    store: Arc<S>,
    write_lock: Arc<Mutex<()>>,
}

impl<S> Clone for ReportQueue<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            write_lock: Arc::clone(&self.write_lock),
        }
    }
}

impl<S: KeyValueStore> ReportQueue<S> {
    pub fn new(store: S) -> Self {
        Self::from_shared(Arc::new(store))
    }

    pub fn from_shared(store: Arc<S>) -> Self {
        Self {
            store,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// The persisted reports in insertion order; empty if absent or unreadable.
    pub async fn load(&self) -> Vec<QueuedReport> {
        match self.try_load().await {
            Ok(reports) => reports,
            Err(e) => {
                warn!(error = %e, "Failed to read report queue, treating as empty");
                Vec::new()
            }
        }
    }

    /// Like [`ReportQueue::load`], but a failed store read is returned as an
    /// error. An undecodable value is still cleared and read as empty.
    pub async fn try_load(&self) -> anyhow::Result<Vec<QueuedReport>> {
        let Some(raw) = self.store.get_item(QUEUE_KEY).await? else {
            return Ok(Vec::new());
        };

        match serde_json::from_str::<Vec<QueuedReport>>(&raw) {
            Ok(reports) => Ok(reports),
            Err(e) => {
                warn!(error = %e, "Discarding undecodable report queue");
                if let Err(e) = self.store.remove_item(QUEUE_KEY).await {
                    warn!(error = %e, "Failed to clear undecodable report queue");
                }
                Ok(Vec::new())
            }
        }
    }

    /// Replace the persisted queue, logging and swallowing any write failure.
    pub async fn save(&self, reports: &[QueuedReport]) {
        if let Err(e) = self.try_save(reports).await {
            warn!(
                error = %e,
                pending = reports.len(),
                "Failed to persist report queue; pending reports are held in memory only"
            );
        }
    }

    /// Replace the persisted queue, returning the write result.
    pub async fn try_save(&self, reports: &[QueuedReport]) -> anyhow::Result<()> {
        let encoded = serde_json::to_string(reports)?;
        self.store.set_item(QUEUE_KEY, &encoded).await
    }

    /// Add a report to the end of the queue.
    ///
    /// Fails without writing if the current queue cannot be read.
    pub async fn append(&self, report: QueuedReport) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut reports = self.try_load().await?;
        debug!(report_id = %report.id, queued = reports.len() + 1, "Queueing report");
        reports.push(report);

        self.try_save(&reports).await
    }

    /// Write back the outcome of a reconciliation pass.
    ///
    /// Reloads the queue under the write lock, drops every report in
    /// `delivered`, replaces the remaining reports with their `refreshed`
    /// versions (matched by id), and leaves reports the pass never saw in
    /// place. Returns the number of reports left in the queue. If the queue
    /// cannot be read, nothing is written.
    pub async fn settle(
        &self,
        delivered: &HashSet<Uuid>,
        refreshed: Vec<QueuedReport>,
    ) -> anyhow::Result<usize> {
        let _guard = self.write_lock.lock().await;

        let mut refreshed: Vec<Option<QueuedReport>> = refreshed.into_iter().map(Some).collect();
        let remaining: Vec<QueuedReport> = self
            .try_load()
            .await?
            .into_iter()
            .filter(|report| !delivered.contains(&report.id))
            .map(|current| {
                refreshed
                    .iter_mut()
                    .find(|r| r.as_ref().is_some_and(|r| r.id == current.id))
                    .and_then(Option::take)
                    .unwrap_or(current)
            })
            .collect();

        self.try_save(&remaining).await?;
        Ok(remaining.len())
    }
}
