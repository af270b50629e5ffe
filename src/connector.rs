use crate::connection::Connection;
use crate::error::Result;
use crate::pool::ConnectionPool;
use crate::types::{BackoffPolicy, Endpoint};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::sleep;

/// Opens authenticated connections through a shared [`ConnectionPool`]
///
/// Used both for short-lived command connections and for the long-lived
/// connection held by a status monitor.
pub struct Connector {
    pool: Arc<ConnectionPool>,
    auth_required_tx: broadcast::Sender<Endpoint>,
}

impl Connector {
    /// Create a connector drawing slots from `pool`
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        let (auth_required_tx, _) = broadcast::channel(16);
        Self {
            pool,
            auth_required_tx,
        }
    }

    /// Get the pool this connector draws from
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        &self.pool
    }

    /// Subscribe to "authentication required" signals
    ///
    /// Emits the endpoint whenever a connection opened without a password is
    /// refused a command for lack of permission.
    pub fn subscribe_auth_required(&self) -> broadcast::Receiver<Endpoint> {
        self.auth_required_tx.subscribe()
    }

    /// Open one connection
    ///
    /// Transport failures (timeout, resolver, socket, malformed greeting,
    /// closed by peer) are returned immediately, with the pool slot already
    /// released. A rejected password is returned as [`crate::MpdError::Server`].
    pub async fn connect(
        &self,
        endpoint: &Endpoint,
        password: Option<&str>,
        timeout: Duration,
    ) -> Result<Connection> {
        let slot = self.pool.acquire(endpoint).await;
        let mut connection = Connection::open(slot, timeout).await?;
        connection.set_auth_signal(self.auth_required_tx.clone());

        if let Some(password) = password {
            if let Err(e) = connection.password(password).await {
                tracing::warn!("Authentication with {} failed: {}", endpoint, e);
                return Err(e);
            }
        }

        Ok(connection)
    }

    /// Open one connection, retrying transport failures per `backoff`
    ///
    /// Returns `None` once every attempt has failed. This is an expected
    /// outcome for an unreachable daemon, not a fault. Server errors stop the
    /// retries early since repeating the same credentials cannot succeed.
    pub async fn connect_with_retry(
        &self,
        endpoint: &Endpoint,
        password: Option<&str>,
        timeout: Duration,
        backoff: &BackoffPolicy,
    ) -> Option<Connection> {
        for attempt in 0..backoff.max_attempts {
            tracing::debug!(
                "Connecting to {} (attempt {}/{})",
                endpoint,
                attempt + 1,
                backoff.max_attempts
            );

            match self.connect(endpoint, password, timeout).await {
                Ok(connection) => {
                    tracing::info!("Connected to {}", endpoint);
                    return Some(connection);
                }
                Err(e) if !e.is_transport() => {
                    tracing::warn!("Giving up on {}: {}", endpoint, e);
                    return None;
                }
                Err(e) => {
                    tracing::warn!("Connection attempt {} to {} failed: {}", attempt + 1, endpoint, e);
                }
            }

            if attempt + 1 < backoff.max_attempts {
                let delay = backoff.delay_for(attempt);
                tracing::debug!("Retrying {} in {:?}", endpoint, delay);
                sleep(delay).await;
            }
        }

        tracing::warn!(
            "{} unavailable after {} attempts",
            endpoint,
            backoff.max_attempts
        );
        None
    }
}
