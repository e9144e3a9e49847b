//! dubmerge-av: media probing, filter-graph planning and transcode driving.
//!
//! The merge pipeline for one episode is: probe both inputs to typed
//! stream inventories, optionally run a loudness analysis pass, plan the
//! stream mapping and per-stream filter chains, drive the external merge
//! process while scanning its output for progress markers, then patch the
//! container metadata.

pub mod error;
pub mod exec;
pub mod filter;
pub mod loudnorm;
pub mod metadata;
pub mod plan;
pub mod probe;
pub mod progress;
pub mod tools;

pub use error::{Error, Result};
pub use exec::ExecutionResult;
pub use loudnorm::{LoudnessTarget, LoudnormStats};
pub use plan::{audio_encoder, MergeParams, MergePlan, SourceFile};
pub use probe::{nearest_valid_bitrate, probe, MediaInventory};
pub use progress::{FfmpegGrammar, Marker, MarkerGrammar, MkvpropeditGrammar, ProgressTracker};
pub use tools::{check_tool, check_tools, get_tool_path, require_tool, ToolInfo};
