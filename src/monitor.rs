//! Idle-wait status monitor.
//!
//! A monitor owns one long-lived connection per session. Its worker alternates
//! between fetching a full snapshot and blocking in `idle` until the daemon
//! reports a change. `stop` wakes the blocked worker through `noidle` on the
//! same connection.
//!
//! ```text
//!   Idle --start--> Connecting --ok--> Online --stop / error / empty idle--> Idle
//!                        |                                                   ^
//!                        +-------------------- connect failed ---------------+
//! ```
//!
//! The monitor never restarts itself. Whoever owns it decides when to call
//! [`StatusMonitor::start`] again.

use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::connector::Connector;
use crate::error::{MpdError, Result};
use crate::estimator::Estimator;
use crate::subscription::{Distributor, Subscription};
use crate::types::{ConnectionStatus, Endpoint, PlayerStatus};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Connecting,
    Online,
}

struct Lifecycle {
    phase: Phase,
    /// Bumped on every `start` so a finished session cannot touch a newer one
    generation: u64,
    cancel: CancellationToken,
}

struct Inner {
    connector: Arc<Connector>,
    config: ClientConfig,
    lifecycle: Mutex<Lifecycle>,
    connection_status: Distributor<ConnectionStatus>,
    player_status: Arc<Distributor<PlayerStatus>>,
    estimator: Arc<Estimator>,
}

impl Inner {
    /// Return to `Idle` and report `Offline`, unless a newer session exists
    fn finish(&self, generation: u64) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.generation != generation {
            return;
        }
        lifecycle.phase = Phase::Idle;
        self.estimator.reset();
        self.connection_status.publish(ConnectionStatus::Offline);
    }

    /// Publish a daemon snapshot if `generation` is still the live session
    ///
    /// Checked under the lifecycle lock, which `stop` also takes, so a
    /// snapshot fetched around a stop is dropped rather than published.
    fn publish_snapshot(
        &self,
        generation: u64,
        cancel: &CancellationToken,
        snapshot: PlayerStatus,
    ) -> bool {
        let lifecycle = self.lifecycle.lock();
        if lifecycle.generation != generation || cancel.is_cancelled() {
            return false;
        }
        self.estimator.publish_authoritative(snapshot);
        true
    }
}

/// Mirrors one daemon's player status to any number of subscribers
///
/// # Example
///
/// ```no_run
/// use mpd_status::{ClientConfig, MpdClient};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = MpdClient::new(ClientConfig::new("localhost", 6600));
///     let monitor = client.monitor();
///     let mut updates = monitor.player_status_stream();
///
///     monitor.start().await?;
///     while let Ok(status) = updates.recv().await {
///         println!("{:?} at {:.0}s", status.state, status.elapsed);
///     }
///     Ok(())
/// }
/// ```
pub struct StatusMonitor {
    inner: Arc<Inner>,
}

impl StatusMonitor {
    /// Create a stopped monitor for `config.endpoint`
    pub fn new(connector: Arc<Connector>, config: ClientConfig) -> Self {
        let player_status = Arc::new(Distributor::new());
        let estimator = Arc::new(Estimator::new(player_status.clone()));

        Self {
            inner: Arc::new(Inner {
                connector,
                config,
                lifecycle: Mutex::new(Lifecycle {
                    phase: Phase::Idle,
                    generation: 0,
                    cancel: CancellationToken::new(),
                }),
                connection_status: Distributor::with_initial(ConnectionStatus::Unknown),
                player_status,
                estimator,
            }),
        }
    }

    /// Get the monitored endpoint
    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.config.endpoint
    }

    /// Whether a session is connecting or online
    pub fn is_running(&self) -> bool {
        self.inner.lifecycle.lock().phase != Phase::Idle
    }

    /// Get the current connection status
    pub fn connection_status(&self) -> ConnectionStatus {
        self.inner
            .connection_status
            .latest()
            .unwrap_or(ConnectionStatus::Unknown)
    }

    /// Get the last published player status
    pub fn player_status(&self) -> Option<PlayerStatus> {
        self.inner.player_status.latest()
    }

    /// Subscribe to connection status changes, starting with the current one
    pub fn connection_status_stream(&self) -> Subscription<ConnectionStatus> {
        self.inner.connection_status.subscribe()
    }

    /// Subscribe to player status snapshots, starting with the latest one
    pub fn player_status_stream(&self) -> Subscription<PlayerStatus> {
        self.inner.player_status.subscribe()
    }

    /// Open a connection and start mirroring status
    ///
    /// Does nothing if a session is already connecting or online. A session
    /// that was stopped but is still winding down is superseded: its worker
    /// closes its own connection and no longer touches the monitor state.
    /// Makes a single connection attempt; on failure the status becomes
    /// `Offline` and the error is returned. A `stop` issued while connecting discards the
    /// new connection and also ends `Offline`.
    pub async fn start(&self) -> Result<()> {
        let (generation, cancel) = {
            let mut lifecycle = self.inner.lifecycle.lock();
            if lifecycle.phase != Phase::Idle {
                if !lifecycle.cancel.is_cancelled() {
                    tracing::debug!(
                        "Monitor for {} already {:?}",
                        self.endpoint(),
                        lifecycle.phase
                    );
                    return Ok(());
                }
                tracing::debug!(
                    "Superseding stopped session {} for {}",
                    lifecycle.generation,
                    self.endpoint()
                );
            }
            lifecycle.generation += 1;
            lifecycle.cancel = CancellationToken::new();
            lifecycle.phase = Phase::Connecting;
            (lifecycle.generation, lifecycle.cancel.clone())
        };

        let config = &self.inner.config;
        let session = Uuid::new_v4();
        tracing::info!("Starting monitor for {} (session {})", config.endpoint, session);

        let connection = match self
            .inner
            .connector
            .connect(&config.endpoint, config.password.as_deref(), config.timeout)
            .await
        {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!("Monitor for {} could not connect: {}", config.endpoint, e);
                self.inner.finish(generation);
                return Err(e);
            }
        };

        let online = {
            let mut lifecycle = self.inner.lifecycle.lock();
            let current = lifecycle.generation == generation && !cancel.is_cancelled();
            if current {
                lifecycle.phase = Phase::Online;
                self.inner.estimator.reset();
                self.inner
                    .connection_status
                    .publish(ConnectionStatus::Online);
            }
            current
        };

        if !online {
            tracing::info!("Monitor for {} stopped while connecting", config.endpoint);
            connection.close().await;
            self.inner.finish(generation);
            return Ok(());
        }

        let span = tracing::info_span!("monitor", endpoint = %config.endpoint, %session);
        tokio::spawn(
            run_session(self.inner.clone(), connection, generation, cancel).instrument(span),
        );
        Ok(())
    }

    /// Stop the current session
    ///
    /// Returns immediately; the worker wakes from `idle`, closes its
    /// connection and reports `Offline`. Safe to call repeatedly and from
    /// any thread.
    pub fn stop(&self) {
        let lifecycle = self.inner.lifecycle.lock();
        if lifecycle.phase != Phase::Idle {
            tracing::info!("Stopping monitor for {}", self.endpoint());
        }
        lifecycle.cancel.cancel();
    }
}

impl Drop for StatusMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Fetch/wait loop for one session
async fn run_session(
    inner: Arc<Inner>,
    mut connection: Connection,
    generation: u64,
    cancel: CancellationToken,
) {
    let ticker_cancel = cancel.child_token();
    {
        let estimator = inner.estimator.clone();
        let period = inner.config.estimator_interval;
        let ticker_cancel = ticker_cancel.clone();
        tokio::spawn(async move { estimator.run(period, ticker_cancel).await }.in_current_span());
    }

    let mask = inner.config.idle_mask();
    let mut queue_version: Option<u32> = None;

    let failure: Option<MpdError> = loop {
        let snapshot = match connection.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => break Some(e),
        };

        let version = snapshot.queue.version;
        if let Some(previous) = queue_version {
            if version < previous {
                tracing::info!(
                    "Queue version dropped from {} to {}, treating as a reset",
                    previous,
                    version
                );
            }
        }
        queue_version = Some(version);
        if !inner.publish_snapshot(generation, &cancel, snapshot) {
            break None;
        }

        match connection.idle(mask, &cancel).await {
            Ok(_) if cancel.is_cancelled() => break None,
            Ok(changed) if changed.is_empty() => {
                tracing::debug!("Idle returned without changes");
                break None;
            }
            Ok(changed) => {
                tracing::debug!("Changed: {:?}", changed.iter().collect::<Vec<_>>());
            }
            Err(e) => break Some(e),
        }
    };

    ticker_cancel.cancel();
    match failure {
        Some(e) => tracing::warn!("Monitor for {} went offline: {}", connection.endpoint(), e),
        None => tracing::info!("Monitor for {} stopped", connection.endpoint()),
    }

    connection.close().await;
    inner.finish(generation);
}
