//! ResQ Relay - offline-tolerant emergency report delivery.
//!
//! Runs on the reporting device (or a field gateway), next to the report
//! form. Reports are sent straight to the dispatch API while it is reachable
//! and queued on disk while it is not; queued reports are replayed on
//! reconnect, periodically, and on demand.
//!
//! # API Endpoints
//!
//! - `POST /report` - Submit a report
//! - `GET /queue` - List queued reports
//! - `POST /queue/flush` - Replay the queue now
//! - `GET /status` - Connectivity and reconciler status
//! - `GET /health` - Health check
//!
//! Configuration is read from `RESQ_*` environment variables; see
//! [`resq_relay::config`].

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use resq_relay::api::{AppState, router};
use resq_relay::config::RelayConfig;
use resq_relay::connectivity::{Connectivity, ConnectivityMonitor, ConnectivityProbe};
use resq_relay::intake::ReportIntake;
use resq_relay::location::LocationRefresher;
use resq_relay::queue::ReportQueue;
use resq_relay::reconciler::Reconciler;
use resq_relay::storage::Storage;
use resq_relay::submitter::ApiClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default level stays at INFO: debug spans carry report ids
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("resq_relay=info".parse()?))
        .init();

    let config = RelayConfig::from_env();
    info!(
        port = config.port,
        db_url = %config.database_url,
        api = %config.api_base_url,
        location = ?config.location,
        "Starting ResQ relay"
    );

    let storage = Storage::new(&config.database_url).await?;
    info!("Database initialized");

    let client = ApiClient::new(&config.api_base_url, config.request_timeout)?;
    let queue = ReportQueue::new(storage);

    // Assume offline until the first probe answers
    let connectivity = Connectivity::new(false);
    let probe = ConnectivityProbe::new(client.clone(), config.probe_interval).spawn(connectivity.clone());

    let reconciler = Arc::new(Reconciler::new(
        queue.clone(),
        client.clone(),
        LocationRefresher::new(config.location.clone()),
        connectivity.clone(),
    ));
    let intake = Arc::new(ReportIntake::new(
        queue,
        client,
        config.location.clone(),
        connectivity.clone(),
    ));

    let monitor = ConnectivityMonitor::start(Arc::clone(&reconciler), &connectivity, config.reconcile_interval);

    let state = AppState {
        intake,
        reconciler,
        connectivity,
    };
    let app = router(state).layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "ResQ relay is listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .await?;

    info!("Shutting down");
    monitor.shutdown().await;
    probe.abort();

    Ok(())
}
