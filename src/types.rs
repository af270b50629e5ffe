use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default MPD port
pub const DEFAULT_PORT: u16 = 6600;

/// Song position in the queue
pub type QueuePosition = u32;

/// Daemon-assigned song id, stable while the song stays queued
pub type SongId = u32;

/// Identity of one daemon instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_PORT)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Observable state of a status monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionStatus {
    #[default]
    Unknown,
    Online,
    Offline,
}

/// Playback state reported by the daemon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlayState {
    Playing,
    Paused,
    #[default]
    Stopped,
}

/// Tri-state used by `single` and `consume`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ToggleMode {
    #[default]
    Off,
    On,
    /// Applies once, then the daemon turns it off again
    Oneshot,
}

/// Mixer volume
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum Volume {
    /// Normalised level in `0.0..=1.0`
    Level(f32),
    /// The daemon has no mixer for the current output
    #[default]
    Unsupported,
}

impl Volume {
    /// Convert the daemon's `0..=100` scale, where `-1` means no mixer
    pub fn from_percent(percent: i32) -> Self {
        if percent < 0 {
            Volume::Unsupported
        } else {
            Volume::Level(percent.min(100) as f32 / 100.0)
        }
    }

    pub fn level(&self) -> Option<f32> {
        match self {
            Volume::Level(v) => Some(*v),
            Volume::Unsupported => None,
        }
    }
}

/// Sample format of the decoded stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleDepth {
    /// Integer PCM with the given number of bits
    Bits(u8),
    /// 32-bit float PCM
    Float,
    /// Native DSD
    Dsd,
}

/// Audio quality of the current stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioQuality {
    /// Sample rate in Hz
    pub sample_rate: u32,
    pub depth: SampleDepth,
    pub channels: u8,
    /// Instantaneous bitrate in kbit/s, when known
    pub bitrate: Option<u32>,
}

/// Queue summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueInfo {
    pub length: u32,
    /// Bumped by the daemon on every queue change
    pub version: u32,
    /// Position of the current song, if any
    pub current: Option<QueuePosition>,
    pub next: Option<QueuePosition>,
}

/// The song the daemon is currently playing or paused on
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Song {
    /// Daemon-relative URI
    pub file: String,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub track: Option<String>,
    pub date: Option<String>,
    pub genre: Option<String>,
    /// Duration in seconds
    pub duration: Option<f64>,
    pub id: Option<SongId>,
    pub position: Option<QueuePosition>,
}

/// An audio output configured in the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Output {
    pub id: u32,
    pub name: String,
    pub plugin: Option<String>,
    pub enabled: bool,
}

/// One complete read of daemon state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlayerStatus {
    pub volume: Volume,
    pub state: PlayState,
    /// Elapsed time of the current song in seconds
    pub elapsed: f64,
    /// Total time of the current song in seconds
    pub duration: Option<f64>,
    pub random: bool,
    pub repeat: bool,
    pub single: ToggleMode,
    pub consume: ToggleMode,
    pub queue: QueueInfo,
    pub song: Option<Song>,
    pub audio: Option<AudioQuality>,
    pub outputs: Vec<Output>,
    /// Last player error, e.g. a failed decode
    pub error: Option<String>,
}

impl PlayerStatus {
    pub fn is_playing(&self) -> bool {
        self.state == PlayState::Playing
    }
}

/// Retry schedule for establishing connections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub max_attempts: u32,
    #[serde(rename = "initial_delay_ms", with = "millis")]
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    #[serde(rename = "max_delay_ms", with = "millis")]
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl BackoffPolicy {
    /// Delay to wait after the given zero-based failed attempt
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        if factor.is_nan() || factor < 0.0 {
            return self.initial_delay.min(self.max_delay);
        }
        Duration::try_from_secs_f64(self.initial_delay.as_secs_f64() * factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 1.0,
        }
    }
}

/// Serde adaptor storing a [`Duration`] as whole milliseconds
pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis().try_into().unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
