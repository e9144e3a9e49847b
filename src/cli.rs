use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dubmerge")]
#[command(author, version, about = "Merge dubbed audio tracks into video containers")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Merge the configured episodes
    Run {
        /// Only process seasons whose prefix matches
        #[arg(short, long)]
        season: Option<String>,

        /// Only process episodes whose prefix matches
        #[arg(short, long)]
        episode: Option<String>,

        /// Number of episodes to process concurrently
        #[arg(short, long)]
        workers: Option<usize>,

        /// Force loudness normalization on or off
        #[arg(long)]
        normalize: Option<bool>,

        /// Write a per-run log file alongside the outputs
        #[arg(long)]
        log: bool,

        /// Which episode title lands in the container metadata
        #[arg(long, value_enum)]
        title_language: Option<TitleLanguageArg>,
    },

    /// Probe a media file and display stream information
    Probe {
        /// File to probe
        #[arg(required = true)]
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that required external tools are available
    CheckTools,

    /// Validate configuration file
    Validate {
        /// Config file to validate (uses default if not specified)
        config: Option<PathBuf>,
    },

    /// Display version information
    Version,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TitleLanguageArg {
    De,
    En,
}

impl From<TitleLanguageArg> for dubmerge::config::TitleLanguage {
    fn from(arg: TitleLanguageArg) -> Self {
        match arg {
            TitleLanguageArg::De => Self::De,
            TitleLanguageArg::En => Self::En,
        }
    }
}
