//! Device position acquisition and the reconnect-time location refresh.
//!
//! A [`LocationProvider`] answers one position request at a time. Requests go
//! through [`request_position`], which bounds them by the timeout in their
//! [`PositionOptions`] whatever the provider does.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{Coordinates, OFFLINE_LOCATION_MARKER, QueuedReport, UPDATED_LOCATION_MARKER};

/// Bound on the refresh request made during reconciliation.
pub const REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

/// Bound on the request made when a report is first submitted.
pub const INTAKE_TIMEOUT: Duration = Duration::from_secs(15);

/// Options for a single position request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    pub timeout: Duration,
    /// Oldest acceptable cached fix. Zero demands a fresh one.
    pub maximum_age: Duration,
}

impl PositionOptions {
    pub fn fresh(timeout: Duration) -> Self {
        Self {
            high_accuracy: true,
            timeout,
            maximum_age: Duration::ZERO,
        }
    }
}

#[derive(Debug, Error)]
pub enum LocationError {
    #[error("location capability is unavailable")]
    Unavailable,

    #[error("position request timed out after {0:?}")]
    Timeout(Duration),

    #[error("position fix is stale (captured {0})")]
    Stale(DateTime<Utc>),

    #[error("position request failed: {0}")]
    Failed(String),
}

/// Source of the device's current position.
pub trait LocationProvider: Send + Sync {
    fn current_position(
        &self,
        options: PositionOptions,
    ) -> impl Future<Output = Result<Coordinates, LocationError>> + Send;
}

/// Request a position, enforcing `options.timeout`.
pub async fn request_position<L: LocationProvider>(
    provider: &L,
    options: PositionOptions,
) -> Result<Coordinates, LocationError> {
    match tokio::time::timeout(options.timeout, provider.current_position(options)).await {
        Ok(result) => result,
        Err(_) => Err(LocationError::Timeout(options.timeout)),
    }
}

/// Where this device gets its position from.
#[derive(Debug, Clone)]
pub enum DeviceLocation {
    /// No positioning hardware or service.
    Unavailable,

    /// A surveyed, fixed installation (e.g. a relay mounted at a shelter).
    Fixed(Coordinates),

    /// The latest fix written as JSON by a GNSS daemon.
    File(PathBuf),
}

/// On-disk shape of a fix written by the GNSS daemon.
#[derive(Debug, Deserialize)]
struct FixRecord {
    lat: f64,
    lng: f64,
    #[serde(default)]
    captured_at: Option<DateTime<Utc>>,
}

impl LocationProvider for DeviceLocation {
    async fn current_position(&self, options: PositionOptions) -> Result<Coordinates, LocationError> {
        match self {
            DeviceLocation::Unavailable => Err(LocationError::Unavailable),
            DeviceLocation::Fixed(coordinates) => Ok(*coordinates),
            DeviceLocation::File(path) => {
                let raw = tokio::fs::read_to_string(path)
                    .await
                    .map_err(|e| LocationError::Failed(format!("{}: {e}", path.display())))?;
                let fix: FixRecord = serde_json::from_str(&raw)
                    .map_err(|e| LocationError::Failed(format!("{}: {e}", path.display())))?;

                if let Some(captured_at) = fix.captured_at
                    && !options.maximum_age.is_zero()
                    && Utc::now()
                        .signed_duration_since(captured_at)
                        .to_std()
                        .is_ok_and(|age| age > options.maximum_age)
                {
                    return Err(LocationError::Stale(captured_at));
                }

                Ok(Coordinates {
                    latitude: fix.lat,
                    longitude: fix.lng,
                })
            }
        }
    }
}

/// Mark a description as carrying coordinates refreshed on reconnect.
///
/// An offline low-accuracy marker is replaced; otherwise the updated marker
/// is appended unless already present. Applying this twice is a no-op.
pub fn annotate_refreshed(description: &str) -> String {
    if description.contains(OFFLINE_LOCATION_MARKER) {
        description.replace(OFFLINE_LOCATION_MARKER, UPDATED_LOCATION_MARKER)
    } else if description.contains(UPDATED_LOCATION_MARKER) {
        description.to_string()
    } else {
        format!("{description} {UPDATED_LOCATION_MARKER}")
    }
}

/// Re-stamps queued reports with the device's current position.
pub struct LocationRefresher<L> {
    provider: L,
    timeout: Duration,
}

impl<L: LocationProvider> LocationRefresher<L> {
    pub fn new(provider: L) -> Self {
        Self {
            provider,
            timeout: REFRESH_TIMEOUT,
        }
    }

    pub fn with_timeout(provider: L, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    /// Stamp every report with one freshly obtained position.
    ///
    /// The whole batch shares a single fix: the reports are assumed to come
    /// from this device at roughly its current place. If no fix can be had,
    /// the reports are returned untouched.
    pub async fn refresh(&self, reports: Vec<QueuedReport>) -> Vec<QueuedReport> {
        if reports.is_empty() {
            return reports;
        }

        let position = match request_position(&self.provider, PositionOptions::fresh(self.timeout)).await {
            Ok(position) => position,
            Err(e) => {
                warn!(
                    error = %e,
                    reports = reports.len(),
                    "Could not refresh location, keeping queued coordinates"
                );
                return reports;
            }
        };

        info!(reports = reports.len(), "Refreshed queued report locations");
        reports
            .into_iter()
            .map(|mut report| {
                debug!(report_id = %report.id, "Applying refreshed location");
                report.latitude = position.latitude;
                report.longitude = position.longitude;
                report.description = annotate_refreshed(&report.description);
                report
            })
            .collect()
    }
}
