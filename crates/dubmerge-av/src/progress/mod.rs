//! Normalized progress tracking for external process passes.

mod grammar;

pub use grammar::{FfmpegGrammar, Marker, MarkerGrammar, MkvpropeditGrammar};

/// Observer invoked with `(current, total_units)` on every increase.
pub type ProgressCallback = Box<dyn Fn(u64, u64) + Send>;

/// Monotonically non-decreasing progress counter for one pass.
///
/// The counter only ever increases, and `finish` forces it to
/// `total_units` so the final observed value is always the total even when
/// the output stream carried no recognizable markers.
pub struct ProgressTracker {
    current: u64,
    total_units: u64,
    on_update: Option<ProgressCallback>,
}

impl ProgressTracker {
    pub fn new(total_units: u64) -> Self {
        Self {
            current: 0,
            total_units,
            on_update: None,
        }
    }

    pub fn with_callback(mut self, callback: ProgressCallback) -> Self {
        self.on_update = Some(callback);
        self
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn total_units(&self) -> u64 {
        self.total_units
    }

    /// Current progress as a percentage in [0, 100].
    pub fn percent(&self) -> u8 {
        if self.total_units == 0 {
            return 100;
        }
        ((self.current * 100) / self.total_units).min(100) as u8
    }

    /// Apply a pass fraction in [0, 1]; values that would move the counter
    /// backwards are ignored.
    pub fn apply_fraction(&mut self, fraction: f64) {
        let units = (fraction.clamp(0.0, 1.0) * self.total_units as f64).round() as u64;
        self.advance_to(units);
    }

    /// Flush the remaining delta when the underlying process exits.
    pub fn finish(&mut self) {
        self.advance_to(self.total_units);
    }

    fn advance_to(&mut self, units: u64) {
        let units = units.min(self.total_units);
        if units <= self.current {
            return;
        }
        self.current = units;
        if let Some(ref callback) = self.on_update {
            callback(self.current, self.total_units);
        }
    }
}
