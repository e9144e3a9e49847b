//! Two-pass loudness normalization support.
//!
//! Single-pass loudnorm defaults to dynamic (time-varying) gain, which is
//! undesirable for dialogue tracks. The pipeline therefore runs an analysis
//! pass first (`print_format=json` emits measured values per stream) and
//! feeds the measurements back into a linear second pass.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Loudness targets for the normalization stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LoudnessTarget {
    /// Integrated loudness target in LUFS.
    pub integrated: f64,
    /// Maximum true peak in dBTP.
    pub true_peak: f64,
    /// Loudness range target in LU.
    pub range: f64,
}

impl Default for LoudnessTarget {
    fn default() -> Self {
        // EBU R128 broadcast targets.
        Self {
            integrated: -23.0,
            true_peak: -2.0,
            range: 7.0,
        }
    }
}

/// Measured loudness statistics for one audio stream, as emitted by the
/// analysis pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoudnormStats {
    pub input_i: f64,
    pub input_tp: f64,
    pub input_lra: f64,
    pub input_thresh: f64,
    pub output_i: f64,
    pub output_tp: f64,
    pub output_lra: f64,
    pub output_thresh: f64,
    pub normalization_type: String,
    pub target_offset: f64,
}

/// Raw JSON block; every numeric field arrives as a string.
#[derive(Debug, Deserialize)]
struct RawStats {
    input_i: String,
    input_tp: String,
    input_lra: String,
    input_thresh: String,
    output_i: String,
    output_tp: String,
    output_lra: String,
    output_thresh: String,
    normalization_type: String,
    target_offset: String,
}

impl LoudnormStats {
    /// Parse an analysis block accumulated from the tool's output.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawStats = serde_json::from_str(json)?;

        let field = |name: &str, value: &str| -> Result<f64> {
            value
                .parse()
                .map_err(|_| Error::parse_error("loudnorm", format!("bad {name}: {value:?}")))
        };

        Ok(Self {
            input_i: field("input_i", &raw.input_i)?,
            input_tp: field("input_tp", &raw.input_tp)?,
            input_lra: field("input_lra", &raw.input_lra)?,
            input_thresh: field("input_thresh", &raw.input_thresh)?,
            output_i: field("output_i", &raw.output_i)?,
            output_tp: field("output_tp", &raw.output_tp)?,
            output_lra: field("output_lra", &raw.output_lra)?,
            output_thresh: field("output_thresh", &raw.output_thresh)?,
            normalization_type: raw.normalization_type.to_lowercase(),
            target_offset: field("target_offset", &raw.target_offset)?,
        })
    }

    /// Whether the pass applied a linear (constant-gain) correction.
    ///
    /// A `dynamic` result means the filter fell back to time-varying
    /// compression; the planner surfaces this as a per-stream warning.
    pub fn is_linear(&self) -> bool {
        self.normalization_type == "linear"
    }
}

/// Render the analysis-pass filter expression.
pub fn first_pass(target: &LoudnessTarget) -> String {
    format!(
        "loudnorm=I={}:LRA={}:TP={}:print_format=json",
        target.integrated, target.range, target.true_peak
    )
}

/// Render the linear second-pass filter expression from measured values.
pub fn second_pass(target: &LoudnessTarget, measured: &LoudnormStats) -> String {
    format!(
        "loudnorm=I={}:LRA={}:TP={}:measured_I={:.2}:measured_LRA={:.2}:measured_TP={:.2}:\
         measured_thresh={:.2}:offset={:.2}:linear=true:print_format=json",
        target.integrated,
        target.range,
        target.true_peak,
        measured.input_i,
        measured.input_lra,
        measured.input_tp,
        measured.input_thresh,
        measured.target_offset
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK: &str = r#"{
        "input_i": "-27.61",
        "input_tp": "-4.47",
        "input_lra": "18.06",
        "input_thresh": "-39.20",
        "output_i": "-22.03",
        "output_tp": "-2.00",
        "output_lra": "14.00",
        "output_thresh": "-32.54",
        "normalization_type": "Dynamic",
        "target_offset": "0.91"
    }"#;

    #[test]
    fn test_stats_from_json() {
        let stats = LoudnormStats::from_json(BLOCK).unwrap();
        assert_eq!(stats.input_i, -27.61);
        assert_eq!(stats.target_offset, 0.91);
        assert!(!stats.is_linear());
    }

    #[test]
    fn test_stats_bad_number_is_parse_error() {
        let bad = BLOCK.replace("-27.61", "n/a");
        let err = LoudnormStats::from_json(&bad).unwrap_err();
        assert!(matches!(err, Error::ParseError { .. }));
    }

    #[test]
    fn test_first_pass_render() {
        let rendered = first_pass(&LoudnessTarget::default());
        assert_eq!(rendered, "loudnorm=I=-23:LRA=7:TP=-2:print_format=json");
    }

    #[test]
    fn test_second_pass_is_linear_with_measured_values() {
        let stats = LoudnormStats::from_json(BLOCK).unwrap();
        let rendered = second_pass(&LoudnessTarget::default(), &stats);
        assert!(rendered.contains("measured_I=-27.61"));
        assert!(rendered.contains("measured_thresh=-39.20"));
        assert!(rendered.contains("offset=0.91"));
        assert!(rendered.contains("linear=true"));
    }
}
