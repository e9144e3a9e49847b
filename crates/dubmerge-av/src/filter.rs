//! Structured audio filter-chain construction.
//!
//! Chains are built as ordered lists of typed stages and rendered by a
//! single joiner, instead of being concatenated ad hoc at every call site.

use crate::loudnorm::{self, LoudnessTarget, LoudnormStats};

/// One audio-processing stage in a per-stream filter chain.
#[derive(Debug, Clone)]
pub enum FilterStage {
    /// Linear loudness normalization parameterized by a prior analysis pass.
    Loudnorm {
        target: LoudnessTarget,
        measured: LoudnormStats,
    },
    /// Analysis-only loudness measurement (first pass).
    LoudnormAnalysis { target: LoudnessTarget },
    /// Resample to the given rate in Hz.
    Resample(u32),
    /// Tempo adjustment; 1.0 is unchanged speed.
    Tempo(f64),
    /// Delay all channels by the given number of milliseconds.
    Delay(u64),
}

impl FilterStage {
    fn render(&self) -> String {
        match self {
            FilterStage::Loudnorm { target, measured } => {
                loudnorm::second_pass(target, measured)
            }
            FilterStage::LoudnormAnalysis { target } => loudnorm::first_pass(target),
            FilterStage::Resample(rate) => format!("aresample={rate}"),
            FilterStage::Tempo(speed) => format!("atempo={speed}"),
            FilterStage::Delay(ms) => format!("adelay={ms}:all=1"),
        }
    }
}

/// An ordered filter chain for one labeled input stream.
#[derive(Debug, Clone)]
pub struct FilterChain {
    /// Input pad label, e.g. `0:a:1`.
    pub input: String,
    /// Output pad label, e.g. `a1`.
    pub output: String,
    stages: Vec<FilterStage>,
}

impl FilterChain {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            stages: Vec::new(),
        }
    }

    pub fn push(&mut self, stage: FilterStage) {
        self.stages.push(stage);
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Render as a `-filter_complex` fragment.
    ///
    /// An empty chain renders to `None`; the caller degrades the stream to
    /// a plain codec copy rather than emitting an empty filter.
    pub fn render(&self) -> Option<String> {
        if self.stages.is_empty() {
            return None;
        }
        let body = self
            .stages
            .iter()
            .map(FilterStage::render)
            .collect::<Vec<_>>()
            .join(",");
        Some(format!("[{}]{}[{}]", self.input, body, self.output))
    }
}

/// Join chain fragments into one `-filter_complex` expression.
pub fn render_graph(chains: &[FilterChain]) -> Option<String> {
    let fragments: Vec<String> = chains.iter().filter_map(FilterChain::render).collect();
    if fragments.is_empty() {
        None
    } else {
        Some(fragments.join(";"))
    }
}
