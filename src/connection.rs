use crate::error::{AckCode, MpdError, Result};
use crate::pool::ConnectionSlot;
use crate::protocol::{self, Command, IdleMask, Pair, ProtocolVersion};
use crate::status;
use crate::types::{Endpoint, Output, PlayerStatus, Song};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// One session with the daemon
///
/// Owns its socket and its pool slot; dropping the connection frees both.
/// Commands run strictly one at a time, so a connection has exactly one owner.
pub struct Connection {
    endpoint: Endpoint,
    version: ProtocolVersion,
    request_timeout: Duration,
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    authenticated: bool,
    /// Set after a transport error; the stream may hold part of a reply
    broken: bool,
    auth_required_tx: Option<broadcast::Sender<Endpoint>>,
    // Dropped last, after the socket halves
    _slot: ConnectionSlot,
}

impl Connection {
    /// Open a socket, read the greeting and keep `slot` for the connection's lifetime
    ///
    /// On failure the slot is dropped before returning.
    pub(crate) async fn open(
        slot: ConnectionSlot,
        request_timeout: Duration,
    ) -> Result<Self> {
        let endpoint = slot.endpoint().clone();

        let addrs: Vec<_> = timeout(
            request_timeout,
            tokio::net::lookup_host((endpoint.host.as_str(), endpoint.port)),
        )
        .await
        .map_err(|_| MpdError::Timeout)?
        .map_err(|source| MpdError::Resolve {
            host: endpoint.host.clone(),
            source,
        })?
        .collect();

        if addrs.is_empty() {
            return Err(MpdError::Resolve {
                host: endpoint.host.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses"),
            });
        }

        let stream = timeout(request_timeout, TcpStream::connect(addrs.as_slice()))
            .await
            .map_err(|_| MpdError::Timeout)??;
        stream.set_nodelay(true)?;

        let (read_half, writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let greeting = timeout(request_timeout, protocol::read_line(&mut reader))
            .await
            .map_err(|_| MpdError::Timeout)??;
        let version = protocol::parse_greeting(&greeting)?;
        tracing::debug!("Connected to {} (protocol {})", endpoint, version);

        Ok(Self {
            endpoint,
            version,
            request_timeout,
            reader,
            writer,
            authenticated: false,
            broken: false,
            auth_required_tx: None,
            _slot: slot,
        })
    }

    pub(crate) fn set_auth_signal(&mut self, tx: broadcast::Sender<Endpoint>) {
        self.auth_required_tx = Some(tx);
    }

    /// Get the endpoint this connection talks to
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Get the protocol version announced by the daemon
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.version
    }

    /// Get the per-request timeout
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Whether an earlier transport error made this connection unusable
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    fn check_usable(&self) -> Result<()> {
        if self.broken {
            return Err(MpdError::ConnectionClosed);
        }
        Ok(())
    }

    fn mark_broken_on<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_transport() && !self.broken {
                tracing::debug!("Connection to {} is unusable after: {}", self.endpoint, e);
                self.broken = true;
            }
        }
        result
    }

    /// Send a command and wait for its reply
    ///
    /// After a transport error (including a timeout part way through a
    /// reply) every later call fails with [`MpdError::ConnectionClosed`].
    pub async fn execute(&mut self, command: &Command) -> Result<Vec<Pair>> {
        self.check_usable()?;
        let line = command.to_line();
        if command.name() == "password" {
            tracing::debug!("Sending: password <redacted>");
        } else {
            tracing::debug!("Sending: {}", line.trim_end());
        }

        let result = timeout(self.request_timeout, async {
            self.writer.write_all(line.as_bytes()).await?;
            protocol::read_response(&mut self.reader).await
        })
        .await
        .unwrap_or(Err(MpdError::Timeout));
        let result = self.mark_broken_on(result);

        if let Err(MpdError::Server(e)) = &result {
            if e.code == AckCode::Permission && !self.authenticated {
                tracing::warn!("{} requires a password for {:?}", self.endpoint, e.command);
                if let Some(tx) = &self.auth_required_tx {
                    let _ = tx.send(self.endpoint.clone());
                }
            }
        }
        result
    }

    /// Authenticate with `password`
    pub async fn password(&mut self, password: &str) -> Result<()> {
        self.execute(&Command::new("password").arg(password)).await?;
        self.authenticated = true;
        Ok(())
    }

    /// Check the connection is alive
    pub async fn ping(&mut self) -> Result<()> {
        self.execute(&Command::new("ping")).await.map(|_| ())
    }

    /// Fetch the `status` reply into a fresh snapshot
    pub async fn status(&mut self) -> Result<PlayerStatus> {
        let pairs = self.execute(&Command::new("status")).await?;
        let mut snapshot = PlayerStatus::default();
        status::apply_status(&mut snapshot, &pairs);
        Ok(snapshot)
    }

    /// Fetch the current song, if any
    pub async fn current_song(&mut self) -> Result<Option<Song>> {
        let pairs = self.execute(&Command::new("currentsong")).await?;
        Ok(status::parse_song(&pairs))
    }

    /// List the configured outputs
    pub async fn outputs(&mut self) -> Result<Vec<Output>> {
        let pairs = self.execute(&Command::new("outputs")).await?;
        Ok(status::parse_outputs(&pairs))
    }

    /// Fetch player state, current song and outputs as one snapshot
    pub async fn snapshot(&mut self) -> Result<PlayerStatus> {
        let mut snapshot = self.status().await?;
        snapshot.song = self.current_song().await?;
        snapshot.outputs = self.outputs().await?;
        Ok(snapshot)
    }

    /// Block until one of the subsystems in `mask` changes
    ///
    /// No request timeout applies while waiting. When `cancel` fires, a
    /// `noidle` is written on this same connection and the daemon's reply is
    /// drained so the connection stays in sync; changes reported in that
    /// reply are returned as usual.
    pub async fn idle(&mut self, mask: IdleMask, cancel: &CancellationToken) -> Result<IdleMask> {
        self.check_usable()?;
        let result = self.wait_for_changes(mask, cancel).await;
        self.mark_broken_on(result)
    }

    async fn wait_for_changes(
        &mut self,
        mask: IdleMask,
        cancel: &CancellationToken,
    ) -> Result<IdleMask> {
        let line = mask.idle_command().to_line();
        tracing::trace!("Sending: {}", line.trim_end());
        self.writer.write_all(line.as_bytes()).await?;

        let reply = protocol::read_response(&mut self.reader);
        tokio::pin!(reply);

        let pairs = tokio::select! {
            pairs = &mut reply => pairs?,
            _ = cancel.cancelled() => {
                tracing::trace!("Interrupting idle on {}", self.endpoint);
                self.writer.write_all(b"noidle\n").await?;
                timeout(self.request_timeout, &mut reply)
                    .await
                    .map_err(|_| MpdError::Timeout)??
            }
        };

        Ok(IdleMask::from_changes(&pairs))
    }

    /// Say goodbye to the daemon and free the slot
    pub async fn close(mut self) {
        let _ = timeout(self.request_timeout, async {
            self.writer.write_all(b"close\n").await?;
            self.writer.shutdown().await
        })
        .await;
        tracing::debug!("Closed connection to {}", self.endpoint);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("version", &self.version)
            .field("authenticated", &self.authenticated)
            .field("broken", &self.broken)
            .finish()
    }
}
