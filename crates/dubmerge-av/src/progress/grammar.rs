//! Progress-marker grammars for external tool output.
//!
//! Each external tool family reports progress in its own textual dialect;
//! a grammar turns one line of output into at most one marker. Keeping the
//! dialects behind a trait means the executor and scheduler never see
//! tool-specific text.

use crate::loudnorm::LoudnormStats;
use regex::Regex;

/// A recognized marker in one output line.
#[derive(Debug, Clone, PartialEq)]
pub enum Marker {
    /// Fraction of the current pass completed, in [0, 1].
    Fraction(f64),
    /// A completed loudness-analysis block.
    Analysis {
        /// Stream order taken from the `[Parsed_loudnorm_<n>` label, so
        /// measurements pair with their streams by index rather than by
        /// arrival order.
        stream: usize,
        stats: LoudnormStats,
    },
}

/// A stateful line scanner for one tool's output dialect.
pub trait MarkerGrammar: Send {
    /// Scan one line; unrecognized lines yield `None` and must not corrupt
    /// scanner state.
    fn scan(&mut self, line: &str) -> Option<Marker>;
}

/// Grammar for the merge/transcode tool's mixed stdout/stderr stream.
///
/// Five marker families, tried in priority order per line: current frame
/// (needs a previously captured total-frame count), current timestamp
/// (needs a previously seen duration, maximum across all tags), stream
/// headers toggling the video-block state, per-stream total-frame counts
/// (captured only inside the video block), and loudness-analysis JSON
/// blocks accumulated verbatim until their closing brace.
pub struct FfmpegGrammar {
    frame_re: Regex,
    time_re: Regex,
    frames_total_re: Regex,
    duration_tag_re: Regex,
    loudnorm_re: Regex,
    in_video_block: bool,
    total_frames: Option<u64>,
    total_secs: Option<f64>,
    block: Option<(usize, String)>,
    blocks_opened: usize,
}

impl FfmpegGrammar {
    pub fn new() -> Self {
        Self {
            frame_re: Regex::new(r"frame=\s*(\d+)").unwrap(),
            time_re: Regex::new(r"time=\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)").unwrap(),
            frames_total_re: Regex::new(r"NUMBER_OF_FRAMES(?:-eng)?\s*:\s*(\d+)").unwrap(),
            duration_tag_re: Regex::new(r"^DURATION(?:-eng)?\s*:\s*(\d+):(\d{2}):(\d{2}(?:\.\d+)?)")
                .unwrap(),
            loudnorm_re: Regex::new(r"^\[Parsed_loudnorm_(\d+)").unwrap(),
            in_video_block: false,
            total_frames: None,
            total_secs: None,
            block: None,
            blocks_opened: 0,
        }
    }

    fn scan_block(&mut self, line: &str) -> Option<Marker> {
        let (_, block) = self.block.as_mut()?;
        block.push_str(line);
        block.push('\n');
        if !line.trim_end().ends_with('}') {
            return None;
        }

        let (stream, json) = self.block.take()?;
        match LoudnormStats::from_json(&json) {
            Ok(stats) => Some(Marker::Analysis { stream, stats }),
            Err(err) => {
                tracing::warn!("discarding malformed loudness block: {err}");
                None
            }
        }
    }
}

impl Default for FfmpegGrammar {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkerGrammar for FfmpegGrammar {
    fn scan(&mut self, line: &str) -> Option<Marker> {
        if self.block.is_some() {
            return self.scan_block(line);
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }

        // Frame and time markers share a line; frame wins when usable.
        if let Some(caps) = self.frame_re.captures(trimmed) {
            if let (Some(total), Ok(frame)) = (self.total_frames, caps[1].parse::<u64>()) {
                if total > 0 {
                    return Some(Marker::Fraction(frame as f64 / total as f64));
                }
            }
        }

        if let Some(caps) = self.time_re.captures(trimmed) {
            if let Some(total) = self.total_secs.filter(|t| *t > 0.0) {
                let secs = hms_to_secs(&caps[1], &caps[2], &caps[3]);
                return Some(Marker::Fraction(secs / total));
            }
        }

        if trimmed.starts_with("Stream #") {
            self.in_video_block = trimmed.contains("Video:");
            return None;
        }

        if self.in_video_block {
            if let Some(caps) = self.frames_total_re.captures(trimmed) {
                self.total_frames = caps[1].parse().ok();
                return None;
            }
        }

        if let Some(caps) = self.duration_tag_re.captures(trimmed) {
            let secs = hms_to_secs(&caps[1], &caps[2], &caps[3]);
            self.total_secs = Some(self.total_secs.map_or(secs, |t| t.max(secs)));
            return None;
        }

        if trimmed.starts_with("[Parsed_loudnorm") {
            // Unlabeled blocks fall back to open order.
            let stream = self
                .loudnorm_re
                .captures(trimmed)
                .and_then(|caps| caps[1].parse().ok())
                .unwrap_or(self.blocks_opened);
            self.blocks_opened += 1;
            self.block = Some((stream, String::new()));
            return None;
        }

        None
    }
}

fn hms_to_secs(hours: &str, minutes: &str, seconds: &str) -> f64 {
    let h: f64 = hours.parse().unwrap_or(0.0);
    let m: f64 = minutes.parse().unwrap_or(0.0);
    let s: f64 = seconds.parse().unwrap_or(0.0);
    h * 3600.0 + m * 60.0 + s
}

/// Grammar for the metadata tool's `Progress: <n>%` lines.
pub struct MkvpropeditGrammar {
    progress_re: Regex,
}

impl MkvpropeditGrammar {
    pub fn new() -> Self {
        Self {
            progress_re: Regex::new(r"Progress:\s*(\d+)%").unwrap(),
        }
    }
}

impl Default for MkvpropeditGrammar {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkerGrammar for MkvpropeditGrammar {
    fn scan(&mut self, line: &str) -> Option<Marker> {
        let caps = self.progress_re.captures(line)?;
        let percent: f64 = caps[1].parse().ok()?;
        Some(Marker::Fraction(percent / 100.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_marker_needs_total_frames() {
        let mut grammar = FfmpegGrammar::new();
        assert_eq!(grammar.scan("frame=   50 fps= 25 q=-1.0"), None);

        grammar.scan("  Stream #0:0: Video: h264 (High), yuv420p, 1920x1080");
        grammar.scan("      NUMBER_OF_FRAMES : 100");
        assert_eq!(
            grammar.scan("frame=   50 fps= 25 q=-1.0"),
            Some(Marker::Fraction(0.5))
        );
    }

    #[test]
    fn test_frame_total_only_captured_inside_video_block() {
        let mut grammar = FfmpegGrammar::new();
        grammar.scan("  Stream #0:1: Audio: ac3, 48000 Hz, 5.1");
        grammar.scan("      NUMBER_OF_FRAMES : 9999");
        assert_eq!(grammar.scan("frame= 100"), None);

        grammar.scan("  Stream #0:0: Video: h264");
        grammar.scan("      NUMBER_OF_FRAMES : 200");
        assert_eq!(grammar.scan("frame= 100"), Some(Marker::Fraction(0.5)));
    }

    #[test]
    fn test_time_marker_uses_max_tag_duration() {
        let mut grammar = FfmpegGrammar::new();
        assert_eq!(grammar.scan("time=00:00:30.00 bitrate= 128kb/s"), None);

        grammar.scan("      DURATION        : 00:00:30.000000000");
        grammar.scan("      DURATION-eng    : 00:01:00.000000000");
        let marker = grammar.scan("size= 1024kB time=00:00:30.00 bitrate=...");
        assert_eq!(marker, Some(Marker::Fraction(0.5)));
    }

    #[test]
    fn test_frame_wins_over_time_on_shared_line() {
        let mut grammar = FfmpegGrammar::new();
        grammar.scan("  Stream #0:0: Video: h264");
        grammar.scan("      NUMBER_OF_FRAMES : 100");
        grammar.scan("      DURATION : 00:01:00.000000000");

        let marker = grammar.scan("frame=   25 fps=0.0 q=-1.0 time=00:00:30.00");
        assert_eq!(marker, Some(Marker::Fraction(0.25)));
    }

    #[test]
    fn test_loudnorm_block_accumulates_until_brace() {
        let mut grammar = FfmpegGrammar::new();
        assert_eq!(grammar.scan("[Parsed_loudnorm_0 @ 0x5587] "), None);
        for line in [
            "{",
            "\t\"input_i\" : \"-27.61\",",
            "\t\"input_tp\" : \"-4.47\",",
            "\t\"input_lra\" : \"18.06\",",
            "\t\"input_thresh\" : \"-39.20\",",
            "\t\"output_i\" : \"-22.03\",",
            "\t\"output_tp\" : \"-2.00\",",
            "\t\"output_lra\" : \"14.00\",",
            "\t\"output_thresh\" : \"-32.54\",",
            "\t\"normalization_type\" : \"Dynamic\",",
        ] {
            assert_eq!(grammar.scan(line), None);
        }
        let marker = grammar.scan("\t\"target_offset\" : \"0.91\"\n}");
        match marker {
            Some(Marker::Analysis { stream, stats }) => {
                assert_eq!(stream, 0);
                assert_eq!(stats.input_i, -27.61);
                assert!(!stats.is_linear());
            }
            other => panic!("expected analysis marker, got {other:?}"),
        }
        // Scanner is back in line mode afterwards.
        assert_eq!(grammar.scan("frame= 10"), None);
    }

    #[test]
    fn test_loudnorm_block_carries_its_stream_index() {
        let mut grammar = FfmpegGrammar::new();
        grammar.scan("[Parsed_loudnorm_2 @ 0x5587]");
        grammar.scan("{");
        for field in [
            "input_i", "input_tp", "input_lra", "input_thresh", "output_i", "output_tp",
            "output_lra", "output_thresh",
        ] {
            grammar.scan(&format!("\"{field}\" : \"-20.00\","));
        }
        grammar.scan("\"normalization_type\" : \"linear\",");
        let marker = grammar.scan("\"target_offset\" : \"0.10\" }");
        match marker {
            Some(Marker::Analysis { stream, .. }) => assert_eq!(stream, 2),
            other => panic!("expected analysis marker, got {other:?}"),
        }
    }

    #[test]
    fn test_diagnostic_noise_is_ignored() {
        let mut grammar = FfmpegGrammar::new();
        assert_eq!(grammar.scan(""), None);
        assert_eq!(grammar.scan("Press [q] to stop, [?] for help"), None);
        assert_eq!(
            grammar.scan("[matroska @ 0x55] Starting new cluster at 12"),
            None
        );
    }

    #[test]
    fn test_mkvpropedit_percent() {
        let mut grammar = MkvpropeditGrammar::new();
        assert_eq!(grammar.scan("The file is being analyzed."), None);
        assert_eq!(grammar.scan("Progress: 42%"), Some(Marker::Fraction(0.42)));
        assert_eq!(grammar.scan("Progress: 100%"), Some(Marker::Fraction(1.0)));
    }
}
