//! FFprobe-based media probing.

use super::types::*;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::process::Command;
use std::time::Duration;

/// Lowest bitrate step accepted by the audio encoders we target.
pub const MIN_BITRATE: u32 = 32_000;
/// Highest bitrate step accepted by the audio encoders we target.
pub const MAX_BITRATE: u32 = 320_000;
/// Encoder-accepted bitrates are multiples of this step.
pub const BITRATE_STEP: u32 = 32_000;

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: u32,
    codec_type: String,
    codec_name: Option<String>,
    profile: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    channels: Option<u32>,
    channel_layout: Option<String>,
    sample_rate: Option<String>,
    bit_rate: Option<String>,
    duration: Option<String>,
    color_space: Option<String>,
    color_transfer: Option<String>,
    color_primaries: Option<String>,
    #[serde(default)]
    tags: FfprobeTags,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeTags {
    language: Option<String>,
    #[serde(rename = "BPS")]
    bps: Option<String>,
    #[serde(rename = "BPS-eng")]
    bps_eng: Option<String>,
    #[serde(rename = "DURATION")]
    duration: Option<String>,
    #[serde(rename = "DURATION-eng")]
    duration_eng: Option<String>,
}

/// Probe a media file using ffprobe.
///
/// Fails if the file does not exist, ffprobe exits non-zero, or a required
/// field (sample rate, bit rate, frame rate for video) is absent from both
/// the direct field and the container-tag fallbacks.
pub fn probe(tool: &Path, path: &Path) -> Result<MediaInventory> {
    if !path.exists() {
        return Err(Error::file_not_found(path));
    }

    let output = Command::new(tool)
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::tool_not_found("ffprobe")
            } else {
                Error::Io(e)
            }
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::tool_failed("ffprobe", stderr.to_string()));
    }

    let json_str = String::from_utf8(output.stdout)
        .map_err(|e| Error::parse_error("ffprobe", format!("Invalid UTF-8: {}", e)))?;

    let ff_output: FfprobeOutput = serde_json::from_str(&json_str)?;

    parse_ffprobe_output(path, ff_output)
}

fn parse_ffprobe_output(path: &Path, output: FfprobeOutput) -> Result<MediaInventory> {
    let mut inventory = MediaInventory {
        file_path: path.to_path_buf(),
        video: Vec::new(),
        audio: Vec::new(),
        subtitles: Vec::new(),
    };

    for stream in output.streams {
        match stream.codec_type.as_str() {
            "video" => {
                let frame_rate = stream
                    .avg_frame_rate
                    .as_deref()
                    .and_then(parse_frame_rate)
                    .ok_or_else(|| {
                        Error::probe(
                            path,
                            format!("video stream {} has no usable frame rate", stream.index),
                        )
                    })?;

                let duration = stream_duration(&stream.duration, &stream.tags);
                inventory.video.push(VideoStream {
                    index: stream.index,
                    codec: stream.codec_name.unwrap_or_default(),
                    profile: stream.profile,
                    language: normalize_language(stream.tags.language),
                    width: stream.width.unwrap_or(0),
                    height: stream.height.unwrap_or(0),
                    frame_rate,
                    duration,
                    color_space: stream.color_space,
                    color_transfer: stream.color_transfer,
                    color_primaries: stream.color_primaries,
                });
            }
            "audio" => {
                let sample_rate = stream
                    .sample_rate
                    .as_deref()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| {
                        Error::probe(
                            path,
                            format!("audio stream {} has no sample rate", stream.index),
                        )
                    })?;

                let raw_bitrate = stream
                    .bit_rate
                    .as_deref()
                    .or(stream.tags.bps.as_deref())
                    .or(stream.tags.bps_eng.as_deref())
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(|| {
                        Error::probe(
                            path,
                            format!(
                                "audio stream {} has no bit rate (tried bit_rate, BPS, BPS-eng)",
                                stream.index
                            ),
                        )
                    })?;

                let duration = stream_duration(&stream.duration, &stream.tags);
                inventory.audio.push(AudioStream {
                    index: stream.index,
                    codec: stream.codec_name.unwrap_or_default(),
                    profile: stream.profile,
                    language: normalize_language(stream.tags.language),
                    sample_rate,
                    bit_rate: nearest_valid_bitrate(raw_bitrate),
                    channels: stream.channels.unwrap_or(2),
                    channel_layout: stream.channel_layout,
                    duration,
                });
            }
            "subtitle" => {
                inventory.subtitles.push(SubtitleStream {
                    index: stream.index,
                    codec: stream.codec_name.unwrap_or_default(),
                    language: normalize_language(stream.tags.language),
                });
            }
            _ => {}
        }
    }

    Ok(inventory)
}

/// Snap a bitrate to the nearest encoder-accepted step.
///
/// Steps are multiples of 32000 bit/s within [32000, 320000]; a value
/// exactly halfway between two steps rounds up.
pub fn nearest_valid_bitrate(bitrate: u32) -> u32 {
    let snapped = (bitrate.saturating_add(BITRATE_STEP / 2) / BITRATE_STEP) * BITRATE_STEP;
    snapped.clamp(MIN_BITRATE, MAX_BITRATE)
}

/// Parse an "num/den" frame rate ratio.
fn parse_frame_rate(rate_str: &str) -> Option<f64> {
    let parts: Vec<&str> = rate_str.split('/').collect();
    if parts.len() == 2 {
        let num: f64 = parts[0].parse().ok()?;
        let den: f64 = parts[1].parse().ok()?;
        if den != 0.0 && num != 0.0 {
            return Some(num / den);
        }
        return None;
    }
    rate_str.parse().ok().filter(|r| *r > 0.0)
}

fn stream_duration(direct: &Option<String>, tags: &FfprobeTags) -> Option<Duration> {
    if let Some(secs) = direct.as_deref().and_then(|s| s.parse::<f64>().ok()) {
        return Some(Duration::from_secs_f64(secs));
    }
    tags.duration
        .as_deref()
        .or(tags.duration_eng.as_deref())
        .and_then(parse_tag_duration)
}

/// Parse a container-tag duration of the form `HH:MM:SS.nnnnnnnnn`.
pub fn parse_tag_duration(value: &str) -> Option<Duration> {
    let mut parts = value.trim().splitn(3, ':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: f64 = parts.next()?.parse().ok()?;
    if minutes >= 60 || !(0.0..60.0).contains(&seconds) {
        return None;
    }
    Some(Duration::from_secs_f64(
        (hours * 3600 + minutes * 60) as f64 + seconds,
    ))
}

fn normalize_language(tag: Option<String>) -> Option<String> {
    match tag {
        Some(lang) if lang == "und" || lang.is_empty() => None,
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("24000/1001"), Some(23.976023976023978));
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("0/0"), None);
        assert_eq!(parse_frame_rate("invalid"), None);
    }

    #[test]
    fn test_nearest_valid_bitrate_snaps_to_step() {
        assert_eq!(nearest_valid_bitrate(190_000), 192_000);
        assert_eq!(nearest_valid_bitrate(192_000), 192_000);
        assert_eq!(nearest_valid_bitrate(207_999), 192_000);
        assert_eq!(nearest_valid_bitrate(208_001), 224_000);
    }

    #[test]
    fn test_nearest_valid_bitrate_half_step_rounds_up() {
        assert_eq!(nearest_valid_bitrate(208_000), 224_000);
        assert_eq!(nearest_valid_bitrate(48_000), 64_000);
    }

    #[test]
    fn test_nearest_valid_bitrate_clamps() {
        assert_eq!(nearest_valid_bitrate(0), 32_000);
        assert_eq!(nearest_valid_bitrate(8_000), 32_000);
        assert_eq!(nearest_valid_bitrate(900_000), 320_000);
    }

    #[test]
    fn test_parse_tag_duration() {
        assert_eq!(
            parse_tag_duration("00:42:12.345000000"),
            Some(Duration::from_secs_f64(42.0 * 60.0 + 12.345))
        );
        assert_eq!(
            parse_tag_duration("01:00:00.000"),
            Some(Duration::from_secs(3600))
        );
        assert_eq!(parse_tag_duration("garbage"), None);
        assert_eq!(parse_tag_duration("00:99:00.0"), None);
    }

    #[test]
    fn test_parse_ffprobe_output_partitions_and_fallbacks() {
        let json = r#"{
            "format": {"filename": "ep.mkv", "format_name": "matroska"},
            "streams": [
                {
                    "index": 0, "codec_type": "video", "codec_name": "h264",
                    "profile": "High", "width": 1920, "height": 1080,
                    "avg_frame_rate": "24000/1001",
                    "color_space": "bt709",
                    "tags": {"DURATION": "00:42:00.000000000"}
                },
                {
                    "index": 1, "codec_type": "audio", "codec_name": "ac3",
                    "sample_rate": "48000", "channels": 6,
                    "channel_layout": "5.1",
                    "tags": {"language": "eng", "BPS-eng": "448000"}
                },
                {
                    "index": 2, "codec_type": "subtitle",
                    "codec_name": "subrip", "tags": {"language": "und"}
                }
            ]
        }"#;

        let parsed: FfprobeOutput = serde_json::from_str(json).unwrap();
        let inv = parse_ffprobe_output(Path::new("ep.mkv"), parsed).unwrap();

        assert_eq!(inv.video.len(), 1);
        assert_eq!(inv.audio_count(), 1);
        assert_eq!(inv.subtitle_count(), 1);

        let video = &inv.video[0];
        assert!((video.frame_rate - 23.976).abs() < 1e-3);
        assert_eq!(video.duration, Some(Duration::from_secs(42 * 60)));
        assert_eq!(video.color_space.as_deref(), Some("bt709"));

        let audio = &inv.audio[0];
        // 448000 snaps down into the accepted range.
        assert_eq!(audio.bit_rate, 320_000);
        assert_eq!(audio.channel_layout.as_deref(), Some("5.1"));

        // "und" is stripped so the planner can apply its default.
        assert_eq!(inv.subtitles[0].language, None);
    }

    #[test]
    fn test_language_and_tag_duration_on_the_same_stream() {
        let json = r#"{
            "streams": [
                {
                    "index": 0, "codec_type": "audio", "codec_name": "aac",
                    "sample_rate": "48000", "channels": 2,
                    "tags": {
                        "language": "deu",
                        "BPS": "192000",
                        "DURATION": "00:42:00.000000000"
                    }
                }
            ]
        }"#;

        let parsed: FfprobeOutput = serde_json::from_str(json).unwrap();
        let inv = parse_ffprobe_output(Path::new("dub.m4a"), parsed).unwrap();

        let audio = &inv.audio[0];
        assert_eq!(audio.language.as_deref(), Some("deu"));
        assert_eq!(audio.duration, Some(Duration::from_secs(42 * 60)));
    }

    #[test]
    fn test_missing_bitrate_is_probe_error() {
        let json = r#"{
            "streams": [
                {
                    "index": 0, "codec_type": "audio", "codec_name": "aac",
                    "sample_rate": "44100", "channels": 2
                }
            ]
        }"#;

        let parsed: FfprobeOutput = serde_json::from_str(json).unwrap();
        let err = parse_ffprobe_output(Path::new("dub.m4a"), parsed).unwrap_err();
        assert!(matches!(err, Error::Probe { .. }));
    }

    #[test]
    fn test_missing_frame_rate_is_probe_error() {
        let json = r#"{
            "streams": [
                {
                    "index": 0, "codec_type": "video", "codec_name": "h264",
                    "width": 1280, "height": 720, "avg_frame_rate": "0/0"
                }
            ]
        }"#;

        let parsed: FfprobeOutput = serde_json::from_str(json).unwrap();
        let err = parse_ffprobe_output(Path::new("ep.mkv"), parsed).unwrap_err();
        assert!(matches!(err, Error::Probe { .. }));
    }
}
