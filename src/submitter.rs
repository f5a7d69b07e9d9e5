//! Delivery of reports to the remote emergency API.
//!
//! # API Reference
//!
//! - `POST {base}/report_emergency` with body
//!   `{lat, lng, description, tag, severity, timestamp}`; any 2xx is an
//!   acknowledgement.
//!
//! The API authenticates with a session cookie, so the HTTP client keeps a
//! cookie store for its lifetime.
//!
//! Every failure is reported as a [`SubmitError`] and is equally retryable;
//! callers log the cause and try again on the next reconciliation pass.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::model::QueuedReport;

/// Default base URL of the remote API.
pub const DEFAULT_API_BASE: &str = "http://localhost:5000/api";

/// Default bound on a single outbound request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest response body kept in a [`SubmitError::Rejected`].
const MAX_ERROR_BODY: usize = 256;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("server rejected report with {status}: {body}")]
    Rejected { status: StatusCode, body: String },
}

impl From<reqwest::Error> for SubmitError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SubmitError::Timeout
        } else {
            SubmitError::Transport(e)
        }
    }
}

/// Something that can deliver one report to the remote system.
pub trait Submitter: Send + Sync {
    /// Attempt delivery once. `Ok` means the server acknowledged the report.
    fn submit(&self, report: &QueuedReport) -> impl Future<Output = Result<(), SubmitError>> + Send;
}

/// Client for the remote emergency API.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Create a client for the given base URL (e.g. "http://localhost:5000/api").
    pub fn new(base_url: &str, request_timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether the API answers at all. Any HTTP response counts, whatever its status.
    pub async fn is_reachable(&self) -> bool {
        match self.client.get(&self.base_url).send().await {
            Ok(_) => true,
            Err(e) => {
                debug!(error = %e, "API unreachable");
                false
            }
        }
    }
}

impl Submitter for ApiClient {
    #[instrument(skip(self, report), fields(report_id = %report.id))]
    async fn submit(&self, report: &QueuedReport) -> Result<(), SubmitError> {
        let url = format!("{}/report_emergency", self.base_url);

        let response = self.client.post(&url).json(&report.payload()).send().await?;

        let status = response.status();
        if status.is_success() {
            debug!(%status, "Report acknowledged");
            return Ok(());
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY)
                .rev()
                .find(|&i| body.is_char_boundary(i))
                .unwrap_or(0);
            body.truncate(cut);
        }

        warn!(%status, "Report rejected by server");
        Err(SubmitError::Rejected { status, body })
    }
}
