//! In-process fake daemon for integration tests.
//!
//! Speaks enough of the line protocol for the monitor: greeting, password,
//! status, currentsong, outputs, idle/noidle, ping and close. Tests script it
//! through `FakeDaemon` and observe what clients did through its counters.

#![allow(dead_code)]

use mpd_status::Endpoint;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(3);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mpd_status=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Mutable daemon state served to clients
#[derive(Debug, Clone)]
pub struct DaemonState {
    pub song: u32,
    pub state: &'static str,
    pub elapsed: f64,
    pub queue_version: u32,
    pub volume: i32,
    pub password: Option<String>,
    /// Pause before sending the greeting
    pub greeting_delay: Duration,
}

impl Default for DaemonState {
    fn default() -> Self {
        Self {
            song: 0,
            state: "pause",
            elapsed: 5.0,
            queue_version: 1,
            volume: 40,
            password: None,
            greeting_delay: Duration::ZERO,
        }
    }
}

struct Shared {
    state: Mutex<DaemonState>,
    changes: broadcast::Sender<&'static str>,
    accepted: AtomicUsize,
    open: AtomicUsize,
    idle_entered: AtomicUsize,
    refuse_next: AtomicUsize,
    kick: Mutex<CancellationToken>,
}

pub struct FakeDaemon {
    endpoint: Endpoint,
    shared: Arc<Shared>,
    shutdown: CancellationToken,
}

impl FakeDaemon {
    pub async fn spawn() -> Self {
        Self::spawn_with(DaemonState::default()).await
    }

    pub async fn spawn_with(state: DaemonState) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake daemon");
        let port = listener.local_addr().expect("local addr").port();
        let (changes, _) = broadcast::channel(64);

        let shared = Arc::new(Shared {
            state: Mutex::new(state),
            changes,
            accepted: AtomicUsize::new(0),
            open: AtomicUsize::new(0),
            idle_entered: AtomicUsize::new(0),
            refuse_next: AtomicUsize::new(0),
            kick: Mutex::new(CancellationToken::new()),
        });
        let shutdown = CancellationToken::new();

        {
            let shared = shared.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    let stream = tokio::select! {
                        _ = shutdown.cancelled() => break,
                        accepted = listener.accept() => match accepted {
                            Ok((stream, _)) => stream,
                            Err(_) => break,
                        },
                    };
                    shared.accepted.fetch_add(1, Ordering::SeqCst);

                    let refuse = shared
                        .refuse_next
                        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                        .is_ok();
                    if refuse {
                        drop(stream);
                        continue;
                    }

                    tokio::spawn(serve(stream, shared.clone()));
                }
            });
        }

        Self {
            endpoint: Endpoint::new("127.0.0.1", port),
            shared,
            shutdown,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint.clone()
    }

    /// Connections accepted so far, refused ones included
    pub fn accepted(&self) -> usize {
        self.shared.accepted.load(Ordering::SeqCst)
    }

    /// Sessions currently being served
    pub fn open(&self) -> usize {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// Number of `idle` commands received
    pub fn idle_entered(&self) -> usize {
        self.shared.idle_entered.load(Ordering::SeqCst)
    }

    /// Close the next `n` connections right after accepting them
    pub fn refuse_next(&self, n: usize) {
        self.shared.refuse_next.store(n, Ordering::SeqCst);
    }

    pub fn update(&self, subsystem: &'static str, f: impl FnOnce(&mut DaemonState)) {
        f(&mut self.shared.state.lock().unwrap());
        let _ = self.shared.changes.send(subsystem);
    }

    pub fn set_song(&self, song: u32) {
        self.update("player", |s| s.song = song);
    }

    /// Drop every open session, as if the daemon restarted
    pub fn kick_all(&self) {
        let mut kick = self.shared.kick.lock().unwrap();
        kick.cancel();
        *kick = CancellationToken::new();
    }
}

impl Drop for FakeDaemon {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.kick_all();
    }
}

/// Poll `condition` until it holds or [`WAIT_TIMEOUT`] passes
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn split_command(line: &str) -> (String, Vec<String>) {
    let mut parts = line.split_whitespace();
    let name = parts.next().unwrap_or_default().to_string();
    let args = parts
        .map(|arg| arg.trim_matches('"').replace("\\\"", "\"").replace("\\\\", "\\"))
        .collect();
    (name, args)
}

fn status_reply(state: &DaemonState) -> String {
    format!(
        "volume: {}\nrepeat: 0\nrandom: 1\nsingle: 0\nconsume: 0\nplaylist: {}\n\
         playlistlength: 20\nstate: {}\nsong: {}\nsongid: {}\nelapsed: {:.3}\n\
         duration: 300.000\nbitrate: 1411\naudio: 44100:16:2\nOK\n",
        state.volume,
        state.queue_version,
        state.state,
        state.song,
        state.song + 100,
        state.elapsed,
    )
}

fn song_reply(state: &DaemonState) -> String {
    format!(
        "file: music/track{0:02}.flac\nTitle: Track {0}\nArtist: Fake Band\n\
         Album: Loopback\nduration: 300.000\nPos: {0}\nId: {1}\nOK\n",
        state.song,
        state.song + 100,
    )
}

const OUTPUTS_REPLY: &str =
    "outputid: 0\noutputname: Speakers\nplugin: alsa\noutputenabled: 1\nOK\n";

async fn serve(stream: TcpStream, shared: Arc<Shared>) {
    shared.open.fetch_add(1, Ordering::SeqCst);
    let kick = shared.kick.lock().unwrap().clone();
    let mut changes = shared.changes.subscribe();

    let (read_half, mut writer) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let (mut authenticated, greeting_delay) = {
        let state = shared.state.lock().unwrap();
        (state.password.is_none(), state.greeting_delay)
    };
    tokio::select! {
        _ = kick.cancelled() => {}
        _ = tokio::time::sleep(greeting_delay) => {}
    }

    if writer.write_all(b"OK MPD 0.23.5\n").await.is_ok() {
        'session: loop {
            let line = tokio::select! {
                _ = kick.cancelled() => break,
                line = lines.next_line() => match line {
                    Ok(Some(line)) => line,
                    _ => break,
                },
            };
            let (command, args) = split_command(&line);
            let state = shared.state.lock().unwrap().clone();

            let reply = match command.as_str() {
                "ping" => "OK\n".to_string(),
                "close" => break,
                "noidle" => continue,
                "password" => {
                    if state.password.as_deref() == args.first().map(String::as_str) {
                        authenticated = true;
                        "OK\n".to_string()
                    } else {
                        "ACK [3@0] {password} incorrect password\n".to_string()
                    }
                }
                "status" | "currentsong" | "outputs" | "idle" if !authenticated => {
                    format!("ACK [4@0] {{{command}}} you don't have permission for \"{command}\"\n")
                }
                "status" => status_reply(&state),
                "currentsong" => song_reply(&state),
                "outputs" => OUTPUTS_REPLY.to_string(),
                "idle" => {
                    shared.idle_entered.fetch_add(1, Ordering::SeqCst);
                    let mut changed = Vec::new();
                    while let Ok(subsystem) = changes.try_recv() {
                        changed.push(subsystem);
                    }
                    if changed.is_empty() {
                        tokio::select! {
                            _ = kick.cancelled() => break 'session,
                            subsystem = changes.recv() => {
                                changed.push(subsystem.unwrap_or("player"));
                            }
                            line = lines.next_line() => match line {
                                Ok(Some(line)) if line.trim() == "noidle" => {}
                                _ => break 'session,
                            },
                        }
                    }
                    let mut reply: String = changed
                        .iter()
                        .map(|subsystem| format!("changed: {subsystem}\n"))
                        .collect();
                    reply.push_str("OK\n");
                    reply
                }
                other => format!("ACK [5@0] {{{other}}} unknown command \"{other}\"\n"),
            };

            if writer.write_all(reply.as_bytes()).await.is_err() {
                break;
            }
        }
    }

    shared.open.fetch_sub(1, Ordering::SeqCst);
}
