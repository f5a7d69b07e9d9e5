//! Data models for the report relay.
//!
//! A report travels through three shapes:
//!
//! - [`ReportDraft`]: what the report form hands over (validated, never persisted)
//! - [`QueuedReport`]: a report accepted locally but not yet acknowledged by the server
//! - [`ReportPayload`]: the wire body of `POST /report_emergency`
//!
//! # Privacy
//!
//! The mobile number on a draft is only validated. It is never stored in the
//! local queue, sent to the server, or logged.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Annotation appended to a description when the report was queued without a position fix.
pub const OFFLINE_LOCATION_MARKER: &str = "(Location Accuracy Low - Reported Offline)";

/// Annotation carried by a description once its coordinates were refreshed on reconnect.
pub const UPDATED_LOCATION_MARKER: &str = "(Location Updated on Reconnect)";

/// Coordinates substituted when no position could be obtained while offline
/// (geographic centre of India, where the dispatch service operates).
pub const PLACEHOLDER_COORDINATES: Coordinates = Coordinates {
    latitude: 20.5937,
    longitude: 78.9629,
};

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    #[serde(rename = "lat")]
    pub latitude: f64,
    #[serde(rename = "lng")]
    pub longitude: f64,
}

/// Kind of emergency being reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    #[default]
    Fire,
    Flood,
    Accident,
    Medical,
    NaturalDisaster,
    Crime,
    Other,
}

/// Reporter-assessed severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
}

/// A report accepted locally but not yet acknowledged by the remote API.
///
/// `id` is the record's identity for reconciliation. It is generated when the
/// report is created and is independent of `timestamp`, so two reports
/// created within the same millisecond are still distinct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedReport {
    /// Local identity. Records written without one are given a fresh id on decode.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    #[serde(rename = "lat")]
    pub latitude: f64,

    #[serde(rename = "lng")]
    pub longitude: f64,

    /// Free text from the reporter, possibly carrying a location marker.
    pub description: String,

    pub tag: Tag,

    pub severity: Severity,

    /// ISO-8601 creation time with millisecond precision.
    pub timestamp: String,
}

impl QueuedReport {
    /// Create a report stamped with a fresh id and the current time.
    pub fn new(
        coordinates: Coordinates,
        description: impl Into<String>,
        tag: Tag,
        severity: Severity,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            latitude: coordinates.latitude,
            longitude: coordinates.longitude,
            description: description.into(),
            tag,
            severity,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }

    /// The body sent to `POST /report_emergency`.
    pub fn payload(&self) -> ReportPayload<'_> {
        ReportPayload {
            lat: self.latitude,
            lng: self.longitude,
            description: &self.description,
            tag: self.tag,
            severity: self.severity,
            timestamp: &self.timestamp,
        }
    }
}

/// Wire body for `POST /report_emergency`.
///
/// The local `id` is not part of it. The remote contract is
/// `{lat, lng, description, tag, severity, timestamp}`.
#[derive(Debug, Clone, Serialize)]
pub struct ReportPayload<'a> {
    pub lat: f64,
    pub lng: f64,
    pub description: &'a str,
    pub tag: Tag,
    pub severity: Severity,
    pub timestamp: &'a str,
}

/// Request body for the local `POST /report` endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportDraft {
    pub description: String,

    #[serde(default)]
    pub tag: Tag,

    #[serde(default)]
    pub severity: Severity,

    pub mobile_number: String,
}

/// A draft rejected before any network or storage interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please describe the emergency.")]
    MissingDescription,

    #[error("Please enter a mobile number.")]
    MissingMobileNumber,

    #[error("Please enter a valid 10-digit mobile number.")]
    InvalidMobileNumber,
}

impl ReportDraft {
    /// Check the draft in the order the form reports problems.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.description.trim().is_empty() {
            return Err(ValidationError::MissingDescription);
        }

        if self.mobile_number.trim().is_empty() {
            return Err(ValidationError::MissingMobileNumber);
        }

        // The untrimmed value must be exactly ten digits
        let digits = &self.mobile_number;
        if digits.len() != 10 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ValidationError::InvalidMobileNumber);
        }

        Ok(())
    }
}
