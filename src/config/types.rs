use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub show: ShowConfig,

    #[serde(default)]
    pub merge: MergeConfig,

    #[serde(default)]
    pub normalize: NormalizeConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub log: LogConfig,

    #[serde(default, rename = "season")]
    pub seasons: Vec<SeasonConfig>,
}

/// Show-level catalog settings shared by every season.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShowConfig {
    /// Prefix prepended to every output file name (e.g. "The Expanse - ").
    #[serde(default)]
    pub title_prefix: String,

    /// Root directory containing the season folders of the primary files.
    #[serde(default)]
    pub input_root: PathBuf,

    /// Root directory the merged containers are written under.
    #[serde(default)]
    pub output_root: PathBuf,

    /// Directory under the input root holding the secondary audio files;
    /// empty means they sit next to the primary files.
    #[serde(default)]
    pub audio_dir: String,

    /// Which episode title lands in the container metadata.
    #[serde(default)]
    pub title_language: TitleLanguage,
}

impl Default for ShowConfig {
    fn default() -> Self {
        Self {
            title_prefix: String::new(),
            input_root: PathBuf::new(),
            output_root: PathBuf::new(),
            audio_dir: String::new(),
            title_language: TitleLanguage::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TitleLanguage {
    #[default]
    De,
    En,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MergeConfig {
    /// Language applied to the primary file's first audio stream when its
    /// tag is unknown.
    #[serde(default = "default_primary_language")]
    pub primary_language: String,

    /// Same for the secondary (dub) file.
    #[serde(default = "default_secondary_language")]
    pub secondary_language: String,

    /// Worker pool size for concurrent episodes.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_primary_language() -> String {
    "deu".to_string()
}
fn default_secondary_language() -> String {
    "eng".to_string()
}
fn default_workers() -> usize {
    2
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            primary_language: default_primary_language(),
            secondary_language: default_secondary_language(),
            workers: default_workers(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NormalizeConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Integrated loudness target in LUFS.
    #[serde(default = "default_integrated")]
    pub integrated: f64,

    /// Maximum true peak in dBTP.
    #[serde(default = "default_true_peak")]
    pub true_peak: f64,

    /// Loudness range target in LU.
    #[serde(default = "default_loudness_range")]
    pub loudness_range: f64,

    /// Resample target after normalization; unset keeps each stream's own
    /// sample rate.
    #[serde(default)]
    pub sample_rate: Option<u32>,
}

fn default_integrated() -> f64 {
    -23.0
}
fn default_true_peak() -> f64 {
    -2.0
}
fn default_loudness_range() -> f64 {
    7.0
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            integrated: default_integrated(),
            true_peak: default_true_peak(),
            loudness_range: default_loudness_range(),
            sample_rate: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub ffmpeg: Option<PathBuf>,

    #[serde(default)]
    pub ffprobe: Option<PathBuf>,

    #[serde(default)]
    pub mkvpropedit: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Write a shared per-run log file in addition to console output.
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: default_log_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SeasonConfig {
    /// Prefix used both for output naming and season selection
    /// (e.g. "S01E").
    pub prefix: String,

    /// Season directory relative to the input and output roots.
    pub path: String,

    /// Nominal frame rate the dub was recorded against; unset disables
    /// tempo correction for the whole season.
    #[serde(default)]
    pub nominal_fps: Option<f64>,

    /// Leader trimmed off the front of every dub file in the season,
    /// as `HH:MM:SS.nnn`.
    #[serde(default)]
    pub audio_start: Option<String>,

    #[serde(default, rename = "episode")]
    pub episodes: Vec<EpisodeConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EpisodeConfig {
    /// Prefix used both for output naming and episode selection
    /// (e.g. "01 - ").
    pub prefix: String,

    /// Primary (video) file name within the season directory.
    pub video: String,

    /// Secondary (audio) file name within the season's audio directory.
    pub audio: String,

    pub title_de: String,

    pub title_en: String,

    /// Delay applied to the dub, in milliseconds.
    #[serde(default)]
    pub delay_ms: u64,
}
