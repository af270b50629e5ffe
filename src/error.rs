use thiserror::Error;

/// Result type for MPD operations
pub type Result<T> = std::result::Result<T, MpdError>;

/// Errors that can occur when talking to an MPD daemon
#[derive(Error, Debug)]
pub enum MpdError {
    /// Connect, handshake or request did not finish in time
    #[error("Request timeout")]
    Timeout,

    /// Host name could not be resolved
    #[error("Failed to resolve {host}: {source}")]
    Resolve {
        /// Host that failed to resolve
        host: String,
        /// Underlying resolver error
        #[source]
        source: std::io::Error,
    },

    /// Socket-level I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Daemon sent something that is not valid protocol
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Connection was closed by the peer
    #[error("Connection closed")]
    ConnectionClosed,

    /// Daemon answered with an `ACK` line
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MpdError {
    /// Whether this error leaves the connection unusable.
    ///
    /// Everything except a server `ACK` is a transport failure.
    pub fn is_transport(&self) -> bool {
        !matches!(self, MpdError::Server(_) | MpdError::Json(_))
    }

    /// Whether the daemon refused the request for lack of (valid) credentials
    pub fn is_auth_required(&self) -> bool {
        match self {
            MpdError::Server(e) => matches!(e.code, AckCode::Permission | AckCode::Password),
            _ => false,
        }
    }
}

/// An `ACK [code@index] {command} message` reply
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("[{code:?}@{list_index}] {{{command}}} {message}")]
pub struct ServerError {
    /// Error code
    pub code: AckCode,
    /// Position of the failing command in a command list
    pub list_index: u32,
    /// Name of the command that failed
    pub command: String,
    /// Human readable message from the daemon
    pub message: String,
}

/// Error codes carried by `ACK` replies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckCode {
    NotList,
    Arg,
    Password,
    Permission,
    Unknown,
    NoExist,
    PlaylistMax,
    System,
    PlaylistLoad,
    UpdateAlready,
    PlayerSync,
    Exist,
    Other(u16),
}

impl From<u16> for AckCode {
    fn from(code: u16) -> Self {
        match code {
            1 => AckCode::NotList,
            2 => AckCode::Arg,
            3 => AckCode::Password,
            4 => AckCode::Permission,
            5 => AckCode::Unknown,
            50 => AckCode::NoExist,
            51 => AckCode::PlaylistMax,
            52 => AckCode::System,
            53 => AckCode::PlaylistLoad,
            54 => AckCode::UpdateAlready,
            55 => AckCode::PlayerSync,
            56 => AckCode::Exist,
            other => AckCode::Other(other),
        }
    }
}
