//! Stream inventory types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Typed inventory of the streams in one media file.
///
/// Stream indices are the probe tool's global indices: unique within the
/// file and stable for the lifetime of the inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInventory {
    /// Path to the media file.
    pub file_path: PathBuf,
    /// Video streams in the file.
    pub video: Vec<VideoStream>,
    /// Audio streams in the file.
    pub audio: Vec<AudioStream>,
    /// Subtitle streams in the file.
    pub subtitles: Vec<SubtitleStream>,
}

/// A video stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoStream {
    /// Global stream index.
    pub index: u32,
    /// Video codec (e.g., "h264", "hevc").
    pub codec: String,
    /// Codec profile if reported (e.g., "High", "Main 10").
    pub profile: Option<String>,
    /// Language tag; `None` or "und" defaults are applied downstream.
    pub language: Option<String>,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Average frame rate in FPS, parsed from the "num/den" ratio.
    pub frame_rate: f64,
    /// Stream duration if known.
    pub duration: Option<Duration>,
    /// Color space (e.g., "bt709").
    pub color_space: Option<String>,
    /// Color transfer characteristics.
    pub color_transfer: Option<String>,
    /// Color primaries.
    pub color_primaries: Option<String>,
}

/// An audio stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioStream {
    /// Global stream index.
    pub index: u32,
    /// Audio codec (e.g., "aac", "ac3").
    pub codec: String,
    /// Codec profile if reported (e.g., "LC").
    pub profile: Option<String>,
    /// Language tag; `None` or "und" defaults are applied downstream.
    pub language: Option<String>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Bit rate in bits per second, snapped to an encoder-accepted step.
    pub bit_rate: u32,
    /// Number of channels.
    pub channels: u32,
    /// Channel layout (e.g., "stereo", "5.1").
    pub channel_layout: Option<String>,
    /// Stream duration if known.
    pub duration: Option<Duration>,
}

/// A subtitle stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtitleStream {
    /// Global stream index.
    pub index: u32,
    /// Subtitle format (e.g., "subrip", "hdmv_pgs_subtitle").
    pub codec: String,
    /// Language tag.
    pub language: Option<String>,
}

impl MediaInventory {
    /// Get the primary (first) video stream.
    pub fn primary_video(&self) -> Option<&VideoStream> {
        self.video.first()
    }

    /// Number of audio streams.
    pub fn audio_count(&self) -> usize {
        self.audio.len()
    }

    /// Number of subtitle streams.
    pub fn subtitle_count(&self) -> usize {
        self.subtitles.len()
    }

    /// Longest duration reported by any stream, if any.
    pub fn max_duration(&self) -> Option<Duration> {
        self.video
            .iter()
            .filter_map(|v| v.duration)
            .chain(self.audio.iter().filter_map(|a| a.duration))
            .max()
    }
}
