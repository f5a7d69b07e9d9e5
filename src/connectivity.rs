//! Connectivity tracking and the triggers that start reconciliation.
//!
//! - [`Connectivity`]: the shared online/offline flag. The platform side
//!   (here, [`ConnectivityProbe`]) writes it; everything else only reads or
//!   subscribes.
//! - [`ConnectivityMonitor`]: starts a reconciliation pass once at startup,
//!   on every offline-to-online edge, and optionally on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{info, warn};

use crate::location::LocationProvider;
use crate::reconciler::Reconciler;
use crate::storage::KeyValueStore;
use crate::submitter::{ApiClient, Submitter};

/// Shared online/offline state. Clones observe the same flag.
#[derive(Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Record the platform's current connectivity. Subscribers are only
    /// notified when the value actually changes.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            let changed = *current != online;
            *current = online;
            changed
        });

        if changed {
            if online {
                info!("Connectivity restored");
            } else {
                warn!("Connectivity lost");
            }
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Derives connectivity from periodic reachability checks of the remote API.
pub struct ConnectivityProbe {
    client: ApiClient,
    interval: Duration,
}

impl ConnectivityProbe {
    pub fn new(client: ApiClient, interval: Duration) -> Self {
        Self { client, interval }
    }

    /// Probe until the handle is aborted, publishing each result.
    pub fn spawn(self, connectivity: Connectivity) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                connectivity.set_online(self.client.is_reachable().await);
            }
        })
    }
}

/// Handle to the running monitor task.
pub struct ConnectivityMonitor {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ConnectivityMonitor {
    /// Start watching `connectivity` on behalf of `reconciler`.
    ///
    /// A pass is started immediately whatever the current state (an offline
    /// pass is a cheap no-op), then once per offline-to-online edge, and
    /// every `periodic` if given. Passes run in the background and are
    /// serialized by the reconciler.
    pub fn start<S, U, L>(
        reconciler: Arc<Reconciler<S, U, L>>,
        connectivity: &Connectivity,
        periodic: Option<Duration>,
    ) -> Self
    where
        S: KeyValueStore + 'static,
        U: Submitter + 'static,
        L: LocationProvider + 'static,
    {
        let (shutdown, mut shutdown_rx) = oneshot::channel();
        let mut online_rx = connectivity.subscribe();
        let mut was_online = *online_rx.borrow_and_update();

        let task = tokio::spawn(async move {
            reconciler.spawn("startup");

            let mut ticker = periodic.map(|period| {
                let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                ticker
            });

            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    changed = online_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let online = *online_rx.borrow_and_update();
                        if online && !was_online {
                            reconciler.spawn("online");
                        }
                        was_online = online;
                    }
                    _ = next_tick(&mut ticker) => {
                        reconciler.spawn("periodic");
                    }
                }
            }

            info!("Connectivity monitor stopped");
        });

        Self { shutdown, task }
    }

    /// Stop reacting to connectivity changes. Passes already started run to completion.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            warn!(error = %e, "Connectivity monitor task failed");
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
