use super::stats::RollingStats;
use super::{
    round_to_ten, GOLDEN_RATIO, MAX_RANGE, MIN_RANGE, MIN_SAMPLES, PADDING_RATIO, RELAYOUT_THRESHOLD,
    REST_MAX, SMOOTHING_FACTOR, SNAP_DISTANCE,
};

/// Upper bound of a 0-based value axis that follows the data.
///
/// `target` is where the axis wants to be. `current` is what's drawn, and eases
/// towards the target on the scrolling chart so rescaling doesn't flicker.
#[derive(Debug, Clone, PartialEq)]
pub struct AutoRangingAxis {
    current: f64,
    target: f64,
    enabled: bool,
}

impl Default for AutoRangingAxis {
    fn default() -> Self {
        Self {
            current: REST_MAX,
            target: REST_MAX,
            enabled: true,
        }
    }
}

/// Clamp, round to the grid, clamp again.
fn bounded(raw: f64) -> f64 {
    round_to_ten(raw.clamp(MIN_RANGE, MAX_RANGE)).clamp(MIN_RANGE, MAX_RANGE)
}

impl AutoRangingAxis {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Target for the scrolling chart, from the ranging window.
    pub fn scrolling_target(&self, window: &RollingStats) -> f64 {
        match window.max() {
            Some(max) if self.enabled && window.len() >= MIN_SAMPLES => {
                bounded(f64::from(max) * (1.0 + PADDING_RATIO))
            }
            _ => REST_MAX,
        }
    }

    /// One smoothing step towards the scrolling target.
    ///
    /// Returns true when the drawn axis is far enough from the target that
    /// stored points should be re-normalized.
    pub fn update(&mut self, window: &RollingStats) -> bool {
        self.target = self.scrolling_target(window);
        let remaining = self.target - self.current;
        if remaining.abs() < SNAP_DISTANCE {
            self.current = self.target;
        } else {
            self.current += remaining * SMOOTHING_FACTOR;
        }
        self.current = self.current.clamp(MIN_RANGE, MAX_RANGE);
        (self.current - self.target).abs() > RELAYOUT_THRESHOLD
    }

    /// Trend charts jump straight to their target. The average line lands near
    /// the golden ratio of the height unless the peak needs more room.
    pub fn snap_trend(&mut self, average: f64, peak: u16, samples: usize) {
        self.target = if self.enabled && samples >= MIN_SAMPLES {
            let golden = average / GOLDEN_RATIO;
            let padded = f64::from(peak) * (1.0 + PADDING_RATIO);
            bounded(golden.max(padded))
        } else {
            REST_MAX
        };
        self.current = self.target;
    }
}
