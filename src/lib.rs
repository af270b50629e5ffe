//! Rust library for supervising Music Player Daemon (MPD) connections
//!
//! This library opens, pools and supervises connections to an MPD daemon and
//! mirrors its live state to any number of subscribers. It supports:
//!
//! - Bounded connection pooling per daemon endpoint
//! - Connection establishment with authentication and bounded retry
//! - Status monitoring via the `idle`/`noidle` long-poll protocol
//! - Elapsed-time extrapolation between daemon updates
//! - Replay-latest status subscriptions
//!
//! # Quick Start
//!
//! ```no_run
//! use mpd_status::{ClientConfig, ConnectionStatus, MpdClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = MpdClient::new(ClientConfig::new("localhost", 6600));
//!
//!     let monitor = client.monitor();
//!     let mut updates = monitor.player_status_stream();
//!     monitor.start().await?;
//!
//!     if let Ok(status) = updates.recv().await {
//!         println!("{:?}, queue version {}", status.state, status.queue.version);
//!     }
//!
//!     monitor.stop();
//!     let mut connection = monitor.connection_status_stream();
//!     while let Ok(state) = connection.recv().await {
//!         if state == ConnectionStatus::Offline {
//!             break;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Pool**: per-endpoint counting guard shared by every connection user
//! - **Connector**: opens and authenticates connections, with a retrying variant
//! - **Connection**: one TCP session speaking the line protocol
//! - **Monitor**: fetch/idle state machine publishing snapshots
//! - **Estimator**: extrapolates elapsed time while playing
//! - **Subscription**: multicast with replay of the latest value

mod client;
mod config;
mod connection;
mod connector;
mod error;
mod estimator;
mod monitor;
mod pool;
mod protocol;
mod status;
mod subscription;
mod types;

// Public exports
pub use client::MpdClient;
pub use config::{ClientConfig, DEFAULT_POOL_CAPACITY};
pub use connection::Connection;
pub use connector::Connector;
pub use error::{AckCode, MpdError, Result, ServerError};
pub use estimator::Estimator;
pub use monitor::StatusMonitor;
pub use pool::{ConnectionPool, ConnectionSlot, PoolStats};
pub use protocol::{Command, IdleMask, Pair, ProtocolVersion, Subsystem};
pub use subscription::{Distributor, Subscription};
pub use types::{
    AudioQuality, BackoffPolicy, ConnectionStatus, Endpoint, Output, PlayState, PlayerStatus,
    QueueInfo, QueuePosition, SampleDepth, Song, SongId, ToggleMode, Volume, DEFAULT_PORT,
};
