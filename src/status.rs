//! Decoding of `status`, `currentsong` and `outputs` replies.
//!
//! Field values that fail to parse are logged and left at their default, so a
//! single odd value never costs the rest of the snapshot.

use crate::protocol::Pair;
use crate::types::{
    AudioQuality, Output, PlayState, PlayerStatus, SampleDepth, Song, ToggleMode, Volume,
};
use std::str::FromStr;

/// Base rate of DSD64, multiplied by the `dsd<N>` factor
const DSD_BASE_RATE: u32 = 44_100;

fn field<T: FromStr>(key: &str, value: &str) -> Option<T> {
    match value.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring unparsable {} value: {:?}", key, value);
            None
        }
    }
}

fn flag(key: &str, value: &str) -> bool {
    match value {
        "1" => true,
        "0" => false,
        other => {
            tracing::warn!("Ignoring unparsable {} flag: {:?}", key, other);
            false
        }
    }
}

fn toggle(key: &str, value: &str) -> ToggleMode {
    match value {
        "1" => ToggleMode::On,
        "0" => ToggleMode::Off,
        "oneshot" => ToggleMode::Oneshot,
        other => {
            tracing::warn!("Ignoring unparsable {} mode: {:?}", key, other);
            ToggleMode::Off
        }
    }
}

/// Parse an `audio` value: `rate:bits:channels` or `dsd<N>:channels`
pub fn parse_audio_format(value: &str) -> Option<AudioQuality> {
    let parts: Vec<&str> = value.split(':').collect();
    match parts.as_slice() {
        [rate, bits, channels] => {
            let depth = match *bits {
                "f" => SampleDepth::Float,
                "dsd" => SampleDepth::Dsd,
                bits => SampleDepth::Bits(bits.parse().ok()?),
            };
            Some(AudioQuality {
                sample_rate: rate.parse().ok()?,
                depth,
                channels: channels.parse().ok()?,
                bitrate: None,
            })
        }
        [dsd, channels] => {
            let factor: u32 = dsd.strip_prefix("dsd")?.parse().ok()?;
            Some(AudioQuality {
                sample_rate: factor.checked_mul(DSD_BASE_RATE)?,
                depth: SampleDepth::Dsd,
                channels: channels.parse().ok()?,
                bitrate: None,
            })
        }
        _ => None,
    }
}

/// Apply a `status` reply; song and outputs are left untouched
pub fn apply_status(status: &mut PlayerStatus, pairs: &[Pair]) {
    let mut bitrate = None;
    let mut audio = None;
    let mut legacy_time = None;

    for (key, value) in pairs {
        match key.as_str() {
            "volume" => {
                status.volume = field::<i32>(key, value)
                    .map(Volume::from_percent)
                    .unwrap_or(Volume::Unsupported)
            }
            "state" => {
                status.state = match value.as_str() {
                    "play" => PlayState::Playing,
                    "pause" => PlayState::Paused,
                    "stop" => PlayState::Stopped,
                    other => {
                        tracing::warn!("Unknown play state {:?}, assuming stopped", other);
                        PlayState::Stopped
                    }
                }
            }
            "elapsed" => status.elapsed = field(key, value).unwrap_or(0.0),
            "duration" => status.duration = field(key, value),
            "time" => legacy_time = Some(value.as_str()),
            "random" => status.random = flag(key, value),
            "repeat" => status.repeat = flag(key, value),
            "single" => status.single = toggle(key, value),
            "consume" => status.consume = toggle(key, value),
            "playlist" => status.queue.version = field(key, value).unwrap_or(0),
            "playlistlength" => status.queue.length = field(key, value).unwrap_or(0),
            "song" => status.queue.current = field(key, value),
            "nextsong" => status.queue.next = field(key, value),
            "bitrate" => bitrate = field::<u32>(key, value),
            "audio" => {
                audio = parse_audio_format(value);
                if audio.is_none() {
                    tracing::warn!("Ignoring unparsable audio format: {:?}", value);
                }
            }
            "error" => status.error = Some(value.clone()),
            _ => {}
        }
    }

    // Daemons older than 0.20 only send `time: elapsed:total`
    if let Some(time) = legacy_time {
        if let Some((elapsed, total)) = time.split_once(':') {
            if !pairs.iter().any(|(k, _)| k == "elapsed") {
                status.elapsed = field("time", elapsed).unwrap_or(0.0);
            }
            if status.duration.is_none() {
                status.duration = field("time", total);
            }
        }
    }

    status.audio = audio.map(|mut quality| {
        quality.bitrate = bitrate.filter(|b| *b > 0);
        quality
    });
}

/// Decode a `currentsong` reply; an empty reply means no current song
pub fn parse_song(pairs: &[Pair]) -> Option<Song> {
    if pairs.is_empty() {
        return None;
    }

    let mut song = Song::default();
    let mut legacy_time = None;
    for (key, value) in pairs {
        match key.as_str() {
            "file" => song.file = value.clone(),
            "Title" => song.title = Some(value.clone()),
            "Artist" => song.artist = Some(value.clone()),
            "Album" => song.album = Some(value.clone()),
            "AlbumArtist" => song.album_artist = Some(value.clone()),
            "Track" => song.track = Some(value.clone()),
            "Date" => song.date = Some(value.clone()),
            "Genre" => song.genre = Some(value.clone()),
            "duration" => song.duration = field(key, value),
            "Time" => legacy_time = field::<f64>(key, value),
            "Pos" => song.position = field(key, value),
            "Id" => song.id = field(key, value),
            _ => {}
        }
    }
    if song.duration.is_none() {
        song.duration = legacy_time;
    }

    if song.file.is_empty() {
        tracing::warn!("Current song reply has no file entry");
    }
    Some(song)
}

/// Decode an `outputs` reply
pub fn parse_outputs(pairs: &[Pair]) -> Vec<Output> {
    let mut outputs = Vec::new();
    let mut current: Option<Output> = None;

    for (key, value) in pairs {
        if key == "outputid" {
            outputs.extend(current.take());
            current = Some(Output {
                id: field(key, value).unwrap_or(0),
                name: String::new(),
                plugin: None,
                enabled: false,
            });
            continue;
        }

        let Some(output) = current.as_mut() else {
            tracing::warn!("Output attribute {} before any outputid", key);
            continue;
        };
        match key.as_str() {
            "outputname" => output.name = value.clone(),
            "plugin" => output.plugin = Some(value.clone()),
            "outputenabled" => output.enabled = flag(key, value),
            _ => {}
        }
    }
    outputs.extend(current);
    outputs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<Pair> {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn decodes_full_status() {
        let mut status = PlayerStatus::default();
        apply_status(
            &mut status,
            &pairs(&[
                ("volume", "65"),
                ("repeat", "1"),
                ("random", "0"),
                ("single", "oneshot"),
                ("consume", "0"),
                ("playlist", "42"),
                ("playlistlength", "12"),
                ("state", "play"),
                ("song", "3"),
                ("songid", "17"),
                ("nextsong", "4"),
                ("elapsed", "61.250"),
                ("duration", "245.000"),
                ("bitrate", "920"),
                ("audio", "44100:16:2"),
            ]),
        );

        assert_eq!(status.volume, Volume::Level(0.65));
        assert!(status.repeat);
        assert_eq!(status.single, ToggleMode::Oneshot);
        assert_eq!(status.state, PlayState::Playing);
        assert_eq!(status.queue.version, 42);
        assert_eq!(status.queue.length, 12);
        assert_eq!(status.queue.current, Some(3));
        assert_eq!(status.queue.next, Some(4));
        assert_eq!(status.elapsed, 61.25);
        assert_eq!(status.duration, Some(245.0));

        let audio = status.audio.unwrap();
        assert_eq!(audio.sample_rate, 44100);
        assert_eq!(audio.depth, SampleDepth::Bits(16));
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.bitrate, Some(920));
    }

    #[test]
    fn bad_fields_fall_back_to_defaults() {
        let mut status = PlayerStatus::default();
        apply_status(
            &mut status,
            &pairs(&[
                ("volume", "loud"),
                ("state", "pause"),
                ("elapsed", ""),
                ("playlist", "-3"),
                ("audio", "?"),
                ("playlistlength", "7"),
            ]),
        );

        assert_eq!(status.volume, Volume::Unsupported);
        assert_eq!(status.state, PlayState::Paused);
        assert_eq!(status.elapsed, 0.0);
        assert_eq!(status.queue.version, 0);
        assert_eq!(status.audio, None);
        assert_eq!(status.queue.length, 7);
    }

    #[test]
    fn legacy_time_field() {
        let mut status = PlayerStatus::default();
        apply_status(&mut status, &pairs(&[("state", "play"), ("time", "12:300")]));
        assert_eq!(status.elapsed, 12.0);
        assert_eq!(status.duration, Some(300.0));
    }

    #[test]
    fn audio_format_variants() {
        let float = parse_audio_format("96000:f:2").unwrap();
        assert_eq!(float.depth, SampleDepth::Float);
        assert_eq!(float.sample_rate, 96000);

        let dsd = parse_audio_format("dsd64:2").unwrap();
        assert_eq!(dsd.depth, SampleDepth::Dsd);
        assert_eq!(dsd.sample_rate, 2_822_400);

        assert!(parse_audio_format("44100:x:2").is_none());
        assert!(parse_audio_format("").is_none());
    }

    #[test]
    fn decodes_song() {
        let song = parse_song(&pairs(&[
            ("file", "albums/blue/01.flac"),
            ("Title", "So What"),
            ("Artist", "Miles Davis"),
            ("Album", "Kind of Blue"),
            ("Time", "562"),
            ("duration", "562.304"),
            ("Pos", "5"),
            ("Id", "23"),
        ]))
        .unwrap();

        assert_eq!(song.title.as_deref(), Some("So What"));
        assert_eq!(song.duration, Some(562.304));
        assert_eq!(song.position, Some(5));
        assert_eq!(song.id, Some(23));
        assert!(parse_song(&[]).is_none());
    }

    #[test]
    fn decodes_outputs() {
        let outputs = parse_outputs(&pairs(&[
            ("outputid", "0"),
            ("outputname", "DAC"),
            ("plugin", "alsa"),
            ("outputenabled", "1"),
            ("outputid", "1"),
            ("outputname", "Stream"),
            ("plugin", "httpd"),
            ("outputenabled", "0"),
        ]));

        assert_eq!(outputs.len(), 2);
        assert_eq!(outputs[0].name, "DAC");
        assert!(outputs[0].enabled);
        assert_eq!(outputs[1].plugin.as_deref(), Some("httpd"));
        assert!(!outputs[1].enabled);
    }
}
