use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::connector::Connector;
use crate::error::Result;
use crate::monitor::StatusMonitor;
use crate::pool::{ConnectionPool, PoolStats};
use crate::protocol::{Command, Pair};
use crate::types::{Endpoint, PlayerStatus};
use std::sync::Arc;

/// Client for one MPD daemon
///
/// The `MpdClient` owns the connection pool and connector shared by one-shot
/// commands and status monitors. Cloning is cheap and shares the pool.
#[derive(Clone)]
pub struct MpdClient {
    config: ClientConfig,
    connector: Arc<Connector>,
}

impl MpdClient {
    /// Create a client with its own connection pool
    ///
    /// No connection is opened until one is needed.
    pub fn new(config: ClientConfig) -> Self {
        let pool = Arc::new(ConnectionPool::new(config.pool_capacity));
        Self::with_connector(config, Arc::new(Connector::new(pool)))
    }

    /// Create a client sharing an existing connector (and its pool)
    pub fn with_connector(config: ClientConfig, connector: Arc<Connector>) -> Self {
        Self { config, connector }
    }

    /// Get the configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Get the daemon endpoint
    pub fn endpoint(&self) -> &Endpoint {
        &self.config.endpoint
    }

    /// Get the shared connector
    pub fn connector(&self) -> &Arc<Connector> {
        &self.connector
    }

    /// Get pool usage for this client's endpoint
    pub fn pool_stats(&self) -> PoolStats {
        self.connector.pool().stats(&self.config.endpoint)
    }

    /// Open a command connection (single attempt)
    pub async fn connect(&self) -> Result<Connection> {
        self.connector
            .connect(
                &self.config.endpoint,
                self.config.password.as_deref(),
                self.config.timeout,
            )
            .await
    }

    /// Open a command connection using the configured retry schedule
    ///
    /// Returns `None` when the daemon stays unreachable.
    pub async fn connect_with_retry(&self) -> Option<Connection> {
        self.connector
            .connect_with_retry(
                &self.config.endpoint,
                self.config.password.as_deref(),
                self.config.timeout,
                &self.config.backoff,
            )
            .await
    }

    /// Run one command on a fresh pooled connection
    ///
    /// # Example
    ///
    /// ```no_run
    /// use mpd_status::{ClientConfig, Command, MpdClient};
    ///
    /// #[tokio::main]
    /// async fn main() -> Result<(), Box<dyn std::error::Error>> {
    ///     let client = MpdClient::new(ClientConfig::new("localhost", 6600));
    ///     client.execute(&Command::new("setvol").arg(40)).await?;
    ///     Ok(())
    /// }
    /// ```
    pub async fn execute(&self, command: &Command) -> Result<Vec<Pair>> {
        let mut connection = self.connect().await?;
        let reply = connection.execute(command).await;
        connection.close().await;
        reply
    }

    /// Fetch one status snapshot without starting a monitor
    pub async fn status(&self) -> Result<PlayerStatus> {
        let mut connection = self.connect().await?;
        let snapshot = connection.snapshot().await;
        connection.close().await;
        snapshot
    }

    /// Create a status monitor sharing this client's pool
    ///
    /// The monitor starts stopped; call [`StatusMonitor::start`].
    pub fn monitor(&self) -> StatusMonitor {
        StatusMonitor::new(self.connector.clone(), self.config.clone())
    }
}
