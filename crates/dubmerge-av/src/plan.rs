//! Merge planning: stream mapping and filter-graph assembly.

use crate::filter::{render_graph, FilterChain, FilterStage};
use crate::loudnorm::{LoudnessTarget, LoudnormStats};
use crate::probe::MediaInventory;
use crate::{Error, Result};
use std::path::Path;
use std::time::Duration;

/// Which input file a mapped stream comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFile {
    Primary,
    Secondary,
}

impl SourceFile {
    fn input_index(self) -> usize {
        match self {
            SourceFile::Primary => 0,
            SourceFile::Secondary => 1,
        }
    }
}

/// Per-job merge parameters.
#[derive(Debug, Clone)]
pub struct MergeParams {
    /// Whether to loudness-normalize every audio stream.
    pub normalize: bool,
    /// Loudness targets for normalization.
    pub loudness: LoudnessTarget,
    /// Resample target; `None` keeps each stream's own sample rate.
    pub sample_rate: Option<u32>,
    /// Delay applied to the secondary audio.
    pub delay: Duration,
    /// Leader trimmed off the front of the secondary file before merging.
    pub secondary_start: Option<Duration>,
    /// Nominal frame rate the secondary track was recorded against;
    /// `None` disables tempo correction.
    pub secondary_nominal_fps: Option<f64>,
    /// Language applied to the primary file's first audio stream when its
    /// tag is unknown.
    pub primary_language: String,
    /// Same for the secondary file.
    pub secondary_language: String,
}

impl Default for MergeParams {
    fn default() -> Self {
        Self {
            normalize: false,
            loudness: LoudnessTarget::default(),
            sample_rate: None,
            delay: Duration::ZERO,
            secondary_start: None,
            secondary_nominal_fps: None,
            primary_language: "deu".to_string(),
            secondary_language: "eng".to_string(),
        }
    }
}

/// One audio stream's place in the output container.
#[derive(Debug, Clone)]
pub struct AudioMapping {
    pub source: SourceFile,
    /// Position within the source file's audio streams (`a:N` selector).
    pub stream_position: usize,
    /// Output audio stream index; contiguous from 0, primary streams first.
    pub out_index: usize,
    /// Resolved language tag written to the output stream.
    pub language: String,
    /// Encoder name when the stream is filtered; `None` means codec copy.
    pub encoder: Option<&'static str>,
    /// Encoder bitrate in bits per second.
    pub bit_rate: u32,
    pub chain: FilterChain,
}

/// One subtitle stream's place in the output container.
#[derive(Debug, Clone)]
pub struct SubtitleMapping {
    pub source: SourceFile,
    pub stream_position: usize,
    pub out_index: usize,
    pub language: Option<String>,
}

/// The full plan for one merge invocation.
#[derive(Debug, Clone)]
pub struct MergePlan {
    /// Secondary tempo factor (primary fps / secondary nominal fps).
    pub speed: f64,
    /// Leader trimmed off the secondary input with `-ss`.
    pub secondary_start: Option<Duration>,
    pub audio: Vec<AudioMapping>,
    pub subtitles: Vec<SubtitleMapping>,
    /// Output audio indices whose analysis pass fell back to dynamic
    /// normalization (soft warning, not a failure).
    pub dynamic_streams: Vec<usize>,
}

/// Map a source codec to the ffmpeg encoder used when re-encoding it.
pub fn audio_encoder(codec: &str) -> Result<&'static str> {
    match codec {
        "aac" => Ok("aac"),
        "ac3" => Ok("ac3"),
        "opus" => Ok("libopus"),
        other => Err(Error::plan(format!("unknown codec: {other}"))),
    }
}

// atempo accepts one stage of correction in this range; dub frame-rate
// ratios land well inside it.
const TEMPO_MIN: f64 = 0.5;
const TEMPO_MAX: f64 = 2.0;

/// Plan the merge of `secondary`'s audio into `primary`'s container.
///
/// `analysis` carries the measured loudness statistics from a prior
/// analysis pass, in file-major stream order; it is required whenever
/// `params.normalize` is set.
pub fn plan(
    primary: &MediaInventory,
    secondary: &MediaInventory,
    params: &MergeParams,
    analysis: Option<&[LoudnormStats]>,
) -> Result<MergePlan> {
    let speed = match params.secondary_nominal_fps {
        Some(nominal) => {
            let video = primary
                .primary_video()
                .ok_or_else(|| Error::plan("primary file has no video stream"))?;
            video.frame_rate / nominal
        }
        None => 1.0,
    };

    if speed != 1.0 && !(TEMPO_MIN..=TEMPO_MAX).contains(&speed) {
        return Err(Error::plan(format!(
            "tempo factor {speed} outside the usable range [{TEMPO_MIN}, {TEMPO_MAX}]"
        )));
    }

    let total_audio = primary.audio_count() + secondary.audio_count();
    let stats = match (params.normalize, analysis) {
        (false, _) => None,
        (true, None) => {
            return Err(Error::plan(
                "normalization requested but no analysis pass was run",
            ));
        }
        (true, Some(stats)) if stats.len() != total_audio => {
            return Err(Error::plan(format!(
                "analysis pass measured {} streams, expected {}",
                stats.len(),
                total_audio
            )));
        }
        (true, Some(stats)) => Some(stats),
    };

    let delay_ms = params.delay.as_millis() as u64;
    let mut audio = Vec::with_capacity(total_audio);
    let mut dynamic_streams = Vec::new();

    for (source, inventory) in [
        (SourceFile::Primary, primary),
        (SourceFile::Secondary, secondary),
    ] {
        for (position, stream) in inventory.audio.iter().enumerate() {
            // Output index is primary count + position, never a product of
            // per-file stream counts.
            let out_index = match source {
                SourceFile::Primary => position,
                SourceFile::Secondary => primary.audio_count() + position,
            };

            let mut chain = FilterChain::new(
                format!("{}:a:{}", source.input_index(), position),
                format!("a{out_index}"),
            );

            if let Some(stats) = stats {
                let measured = &stats[out_index];
                if !measured.is_linear() {
                    tracing::warn!(
                        out_index,
                        file = %inventory.file_path.display(),
                        "loudness analysis fell back to dynamic normalization"
                    );
                    dynamic_streams.push(out_index);
                }
                chain.push(FilterStage::Loudnorm {
                    target: params.loudness,
                    measured: measured.clone(),
                });
                // loudnorm upsamples internally; bring the stream back to
                // its target rate.
                chain.push(FilterStage::Resample(
                    params.sample_rate.unwrap_or(stream.sample_rate),
                ));
            }

            if source == SourceFile::Secondary {
                if speed != 1.0 {
                    chain.push(FilterStage::Tempo(speed));
                }
                if delay_ms > 0 {
                    chain.push(FilterStage::Delay(delay_ms));
                }
            }

            let encoder = if chain.is_empty() {
                None
            } else {
                Some(audio_encoder(&stream.codec)?)
            };

            let language = stream.language.clone().unwrap_or_else(|| {
                if position == 0 {
                    match source {
                        SourceFile::Primary => params.primary_language.clone(),
                        SourceFile::Secondary => params.secondary_language.clone(),
                    }
                } else {
                    "und".to_string()
                }
            });

            audio.push(AudioMapping {
                source,
                stream_position: position,
                out_index,
                language,
                encoder,
                bit_rate: stream.bit_rate,
                chain,
            });
        }
    }

    let mut subtitles = Vec::new();
    for (source, inventory) in [
        (SourceFile::Primary, primary),
        (SourceFile::Secondary, secondary),
    ] {
        for (position, stream) in inventory.subtitles.iter().enumerate() {
            let out_index = match source {
                SourceFile::Primary => position,
                SourceFile::Secondary => primary.subtitle_count() + position,
            };
            subtitles.push(SubtitleMapping {
                source,
                stream_position: position,
                out_index,
                language: stream.language.clone(),
            });
        }
    }

    Ok(MergePlan {
        speed,
        secondary_start: params.secondary_start,
        audio,
        subtitles,
        dynamic_streams,
    })
}

/// Build the argument vector for the loudness analysis pass.
///
/// All audio streams are measured in file-major order with output
/// discarded; the measured JSON blocks land on the side channel.
pub fn analysis_args(
    primary: &MediaInventory,
    secondary: &MediaInventory,
    params: &MergeParams,
) -> Vec<String> {
    let mut chains = Vec::new();
    for (input, inventory) in [(0usize, primary), (1usize, secondary)] {
        for position in 0..inventory.audio_count() {
            let offset = if input == 0 { 0 } else { primary.audio_count() };
            let mut chain = FilterChain::new(
                format!("{input}:a:{position}"),
                format!("n{}", offset + position),
            );
            chain.push(FilterStage::LoudnormAnalysis {
                target: params.loudness,
            });
            chains.push(chain);
        }
    }

    let mut args = vec!["-hide_banner".to_string(), "-nostdin".to_string()];
    args.extend(input_args(primary, secondary, params.secondary_start));
    if let Some(graph) = render_graph(&chains) {
        args.push("-filter_complex".to_string());
        args.push(graph);
        for chain in &chains {
            args.push("-map".to_string());
            args.push(format!("[{}]", chain.output));
        }
    }
    args.extend(["-f".to_string(), "null".to_string(), "-".to_string()]);
    args
}

/// Build the argument vector for the final merge pass.
pub fn merge_args(
    plan: &MergePlan,
    primary: &MediaInventory,
    secondary: &MediaInventory,
    output: &Path,
) -> Vec<String> {
    let mut args = vec![
        "-hide_banner".to_string(),
        "-nostdin".to_string(),
        "-y".to_string(),
    ];
    args.extend(input_args(primary, secondary, plan.secondary_start));

    let chains: Vec<FilterChain> = plan.audio.iter().map(|m| m.chain.clone()).collect();
    if let Some(graph) = render_graph(&chains) {
        args.push("-filter_complex".to_string());
        args.push(graph);
    }

    // Video is copied, never re-encoded.
    args.extend(["-map".to_string(), "0:v".to_string()]);

    for mapping in &plan.audio {
        args.push("-map".to_string());
        if mapping.chain.is_empty() {
            args.push(format!(
                "{}:a:{}",
                mapping.source.input_index(),
                mapping.stream_position
            ));
        } else {
            args.push(format!("[{}]", mapping.chain.output));
        }
    }

    for mapping in &plan.subtitles {
        args.push("-map".to_string());
        args.push(format!(
            "{}:s:{}",
            mapping.source.input_index(),
            mapping.stream_position
        ));
    }

    args.extend(["-c:v".to_string(), "copy".to_string()]);
    for mapping in &plan.audio {
        match mapping.encoder {
            Some(encoder) => {
                args.push(format!("-c:a:{}", mapping.out_index));
                args.push(encoder.to_string());
                args.push(format!("-b:a:{}", mapping.out_index));
                args.push(mapping.bit_rate.to_string());
            }
            None => {
                args.push(format!("-c:a:{}", mapping.out_index));
                args.push("copy".to_string());
            }
        }
        args.push(format!("-metadata:s:a:{}", mapping.out_index));
        args.push(format!("language={}", mapping.language));
    }
    if !plan.subtitles.is_empty() {
        args.extend(["-c:s".to_string(), "copy".to_string()]);
    }

    args.push(output.to_string_lossy().to_string());
    args
}

fn input_args(
    primary: &MediaInventory,
    secondary: &MediaInventory,
    secondary_start: Option<Duration>,
) -> Vec<String> {
    let mut args = vec![
        "-i".to_string(),
        primary.file_path.to_string_lossy().to_string(),
    ];
    // An input-side seek trims the dub's leader in both passes, so the
    // analysis measures exactly what the merge encodes.
    if let Some(start) = secondary_start.filter(|s| !s.is_zero()) {
        args.push("-ss".to_string());
        args.push(format!("{:.3}", start.as_secs_f64()));
    }
    args.push("-i".to_string());
    args.push(secondary.file_path.to_string_lossy().to_string());
    args
}
