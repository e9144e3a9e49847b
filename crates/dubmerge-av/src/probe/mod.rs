//! Media probing: ffprobe invocation and typed stream inventories.

mod ffprobe;
mod types;

pub use ffprobe::{nearest_valid_bitrate, parse_tag_duration, probe};
pub use types::{AudioStream, MediaInventory, SubtitleStream, VideoStream};
