use crate::error::{AckCode, MpdError, Result, ServerError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

/// Longest line accepted from the daemon
const MAX_LINE_LEN: usize = 64 * 1024;

/// One `key: value` line of a reply
pub type Pair = (String, String);

/// A command line sent to the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    args: Vec<String>,
}

impl Command {
    /// Create a command with no arguments
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Append an argument
    pub fn arg(mut self, arg: impl ToString) -> Self {
        self.args.push(arg.to_string());
        self
    }

    /// Get the command name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render the command as a newline-terminated protocol line
    pub fn to_line(&self) -> String {
        let mut line = self.name.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&quote(arg));
        }
        line.push('\n');
        line
    }
}

/// Quote an argument, escaping `"` and `\`
pub fn quote(arg: &str) -> String {
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

/// Protocol version announced in the greeting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Parse the `OK MPD x.y.z` greeting line
pub fn parse_greeting(line: &str) -> Result<ProtocolVersion> {
    let version = line
        .trim_end()
        .strip_prefix("OK MPD ")
        .ok_or_else(|| MpdError::Malformed(format!("Unexpected greeting: {line:?}")))?;

    let mut parts = version.split('.').map(u32::from_str);
    let mut next = || -> Result<u32> {
        match parts.next() {
            Some(Ok(n)) => Ok(n),
            Some(Err(_)) => Err(MpdError::Malformed(format!("Bad protocol version: {version}"))),
            None => Ok(0),
        }
    };

    Ok(ProtocolVersion {
        major: next()?,
        minor: next()?,
        patch: next()?,
    })
}

/// Parse an `ACK [code@index] {command} message` line
pub fn parse_ack(line: &str) -> Result<ServerError> {
    let malformed = || MpdError::Malformed(format!("Bad ACK line: {line:?}"));

    let rest = line.strip_prefix("ACK [").ok_or_else(malformed)?;
    let (location, rest) = rest.split_once("] {").ok_or_else(malformed)?;
    let (code, list_index) = location.split_once('@').ok_or_else(malformed)?;
    let (command, message) = rest.split_once('}').ok_or_else(malformed)?;

    Ok(ServerError {
        code: AckCode::from(code.parse::<u16>().map_err(|_| malformed())?),
        list_index: list_index.parse().map_err(|_| malformed())?,
        command: command.to_string(),
        message: message.trim_start().to_string(),
    })
}

/// Split a `key: value` line
pub fn parse_pair(line: &str) -> Result<Pair> {
    line.split_once(": ")
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| MpdError::Malformed(format!("Expected key/value line, got {line:?}")))
}

/// Read a single line, without its terminator
///
/// Stops buffering at 64 KiB; a longer line is [`MpdError::Malformed`].
pub async fn read_line<R>(reader: &mut R) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let mut limited = (&mut *reader).take(MAX_LINE_LEN as u64 + 1);
    let n = limited.read_line(&mut line).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::InvalidData => MpdError::Malformed("Reply is not valid UTF-8".to_string()),
        _ => MpdError::Io(e),
    })?;
    if n == 0 {
        return Err(MpdError::ConnectionClosed);
    }
    if line.len() > MAX_LINE_LEN {
        return Err(MpdError::Malformed(format!("Line exceeds {MAX_LINE_LEN} bytes")));
    }
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Ok(line)
}

/// Read a full reply up to the terminating `OK`
///
/// An `ACK` terminator becomes [`MpdError::Server`].
pub async fn read_response<R>(reader: &mut R) -> Result<Vec<Pair>>
where
    R: AsyncBufRead + Unpin,
{
    let mut pairs = Vec::new();
    loop {
        let line = read_line(reader).await?;
        if line == "OK" {
            return Ok(pairs);
        }
        if line.starts_with("ACK ") {
            return Err(MpdError::Server(parse_ack(&line)?));
        }
        pairs.push(parse_pair(&line)?);
    }
}

/// Categories of daemon state that `idle` can wait on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subsystem {
    Database,
    Update,
    StoredPlaylist,
    /// The queue
    Playlist,
    Player,
    Mixer,
    Output,
    Options,
    Partition,
    Sticker,
    Subscription,
    Message,
    Neighbor,
    Mount,
}

impl Subsystem {
    pub const ALL: [Subsystem; 14] = [
        Subsystem::Database,
        Subsystem::Update,
        Subsystem::StoredPlaylist,
        Subsystem::Playlist,
        Subsystem::Player,
        Subsystem::Mixer,
        Subsystem::Output,
        Subsystem::Options,
        Subsystem::Partition,
        Subsystem::Sticker,
        Subsystem::Subscription,
        Subsystem::Message,
        Subsystem::Neighbor,
        Subsystem::Mount,
    ];

    /// Protocol name
    pub fn as_str(&self) -> &'static str {
        match self {
            Subsystem::Database => "database",
            Subsystem::Update => "update",
            Subsystem::StoredPlaylist => "stored_playlist",
            Subsystem::Playlist => "playlist",
            Subsystem::Player => "player",
            Subsystem::Mixer => "mixer",
            Subsystem::Output => "output",
            Subsystem::Options => "options",
            Subsystem::Partition => "partition",
            Subsystem::Sticker => "sticker",
            Subsystem::Subscription => "subscription",
            Subsystem::Message => "message",
            Subsystem::Neighbor => "neighbor",
            Subsystem::Mount => "mount",
        }
    }

    fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl FromStr for Subsystem {
    type Err = MpdError;

    fn from_str(s: &str) -> Result<Self> {
        Subsystem::ALL
            .into_iter()
            .find(|sub| sub.as_str() == s)
            .ok_or_else(|| MpdError::Malformed(format!("Unknown subsystem: {s}")))
    }
}

/// Set of [`Subsystem`]s
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct IdleMask(u32);

impl IdleMask {
    pub const EMPTY: IdleMask = IdleMask(0);

    /// Queue, player, mixer and options
    pub const MONITORED: IdleMask = IdleMask(
        (1 << Subsystem::Playlist as u32)
            | (1 << Subsystem::Player as u32)
            | (1 << Subsystem::Mixer as u32)
            | (1 << Subsystem::Options as u32),
    );

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, sub: Subsystem) -> bool {
        self.0 & sub.bit() != 0
    }

    pub fn insert(&mut self, sub: Subsystem) {
        self.0 |= sub.bit();
    }

    pub fn iter(self) -> impl Iterator<Item = Subsystem> {
        Subsystem::ALL.into_iter().filter(move |sub| self.contains(*sub))
    }

    /// Build the `idle` command for this mask
    ///
    /// An empty mask waits on every subsystem.
    pub fn idle_command(&self) -> Command {
        self.iter()
            .fold(Command::new("idle"), |cmd, sub| cmd.arg(sub.as_str()))
    }

    /// Collect the `changed:` lines of an idle reply
    ///
    /// Unknown names are logged and skipped, newer daemons add subsystems.
    pub fn from_changes(pairs: &[Pair]) -> Self {
        let mut mask = IdleMask::EMPTY;
        for (key, value) in pairs {
            if key != "changed" {
                continue;
            }
            match value.parse::<Subsystem>() {
                Ok(sub) => mask.insert(sub),
                Err(_) => tracing::debug!("Ignoring unknown subsystem change: {}", value),
            }
        }
        mask
    }
}

impl FromIterator<Subsystem> for IdleMask {
    fn from_iter<I: IntoIterator<Item = Subsystem>>(iter: I) -> Self {
        let mut mask = IdleMask::EMPTY;
        for sub in iter {
            mask.insert(sub);
        }
        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_arguments() {
        let cmd = Command::new("password").arg(r#"pa"ss\word"#);
        assert_eq!(cmd.to_line(), "password \"pa\\\"ss\\\\word\"\n");
        assert_eq!(Command::new("status").to_line(), "status\n");
    }

    #[test]
    fn parses_greeting() {
        let v = parse_greeting("OK MPD 0.23.5\n").unwrap();
        assert_eq!(v, ProtocolVersion { major: 0, minor: 23, patch: 5 });
        assert!(matches!(parse_greeting("HTTP/1.1 400"), Err(MpdError::Malformed(_))));
    }

    #[test]
    fn parses_ack() {
        let err = parse_ack(r#"ACK [4@0] {status} you don't have permission for "status""#).unwrap();
        assert_eq!(err.code, AckCode::Permission);
        assert_eq!(err.list_index, 0);
        assert_eq!(err.command, "status");
        assert_eq!(err.message, r#"you don't have permission for "status""#);

        assert!(parse_ack("ACK nonsense").is_err());
    }

    #[test]
    fn idle_command_lists_monitored_subsystems() {
        assert_eq!(
            IdleMask::MONITORED.idle_command().to_line(),
            "idle \"playlist\" \"player\" \"mixer\" \"options\"\n"
        );
    }

    #[test]
    fn mask_from_changes() {
        let pairs = vec![
            ("changed".to_string(), "player".to_string()),
            ("changed".to_string(), "mixer".to_string()),
            ("changed".to_string(), "brand_new_thing".to_string()),
        ];
        let mask = IdleMask::from_changes(&pairs);
        assert!(mask.contains(Subsystem::Player));
        assert!(mask.contains(Subsystem::Mixer));
        assert!(!mask.contains(Subsystem::Playlist));
        assert!(IdleMask::from_changes(&[]).is_empty());
    }

    #[tokio::test]
    async fn reads_response_until_ok() {
        let mut input: &[u8] = b"volume: 40\nstate: play\nOK\n";
        let pairs = read_response(&mut input).await.unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[1], ("state".to_string(), "play".to_string()));
    }

    #[tokio::test]
    async fn ack_and_eof_are_errors() {
        let mut input: &[u8] = b"ACK [5@0] {frobnicate} unknown command \"frobnicate\"\n";
        let err = read_response(&mut input).await.unwrap_err();
        assert!(matches!(err, MpdError::Server(ref e) if e.code == AckCode::Unknown));

        let mut truncated: &[u8] = b"volume: 40\n";
        assert!(matches!(
            read_response(&mut truncated).await,
            Err(MpdError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn overlong_line_is_rejected_without_reading_it_all() {
        let mut input = vec![b'a'; 4 * MAX_LINE_LEN];
        input.extend_from_slice(b"\nOK\n");
        let mut reader: &[u8] = &input;

        let err = read_line(&mut reader).await.unwrap_err();
        assert!(matches!(err, MpdError::Malformed(_)), "unexpected error: {err}");
        assert_eq!(input.len() - reader.len(), MAX_LINE_LEN + 1);

        let mut fits = vec![b'a'; MAX_LINE_LEN - 1];
        fits.push(b'\n');
        let mut reader: &[u8] = &fits;
        assert_eq!(read_line(&mut reader).await.unwrap().len(), MAX_LINE_LEN - 1);
    }
}
