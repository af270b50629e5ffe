//! Print player status changes until Ctrl-C.
//!
//! ```text
//! cargo run --example watch -- [host] [port] [password]
//! ```

use mpd_status::{ClientConfig, ConnectionStatus, MpdClient, PlayerStatus, Volume, DEFAULT_PORT};

fn describe(status: &PlayerStatus) -> String {
    let song = status
        .song
        .as_ref()
        .map(|song| {
            let title = song.title.as_deref().unwrap_or(&song.file);
            match song.artist.as_deref() {
                Some(artist) => format!("{artist} - {title}"),
                None => title.to_string(),
            }
        })
        .unwrap_or_else(|| "(nothing queued)".to_string());

    let volume = match status.volume {
        Volume::Level(level) => format!("{:.0}%", level * 100.0),
        Volume::Unsupported => "n/a".to_string(),
    };

    let time = match status.duration {
        Some(total) => format!("{:.0}/{:.0}s", status.elapsed, total),
        None => format!("{:.0}s", status.elapsed),
    };

    format!("{:?} {} [{}] vol {}", status.state, song, time, volume)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mpd_status=info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "localhost".to_string());
    let port = match args.next() {
        Some(port) => port.parse()?,
        None => DEFAULT_PORT,
    };
    let mut config = ClientConfig::new(host, port);
    if let Some(password) = args.next() {
        config = config.password(password);
    }

    let client = MpdClient::new(config);
    let Some(mut connection) = client.connect_with_retry().await else {
        eprintln!("{} is unavailable", client.endpoint());
        return Ok(());
    };
    println!(
        "{} speaks protocol {}",
        client.endpoint(),
        connection.protocol_version()
    );
    connection.ping().await?;
    connection.close().await;

    let monitor = client.monitor();
    let mut connection = monitor.connection_status_stream();
    let mut updates = monitor.player_status_stream();
    monitor.start().await?;

    let mut last = String::new();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            state = connection.recv() => {
                if state? == ConnectionStatus::Offline {
                    println!("offline");
                    break;
                }
            }
            status = updates.recv() => {
                let line = describe(&status?);
                if line != last {
                    println!("{line}");
                    last = line;
                }
            }
        }
    }

    monitor.stop();
    Ok(())
}
