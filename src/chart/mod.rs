//! The live chart engine: rolling statistics, an auto-ranging Y axis, the two
//! point series (scrolling and trend) and a renderer that turns them into
//! drawing primitives.
//!
//! Chart space has its origin at the top-left with y growing downwards, and the
//! Y axis always starts at 0.

use std::time::Duration;

pub mod axis;
pub mod panel;
pub mod render;
pub mod series;
pub mod stats;

pub use axis::AutoRangingAxis;
pub use panel::{ScrollingChart, TrendChart};
pub use render::{ChartRenderer, DrawCommand, Stroke};
pub use series::{Point, ScrollingSeries, TrendSeries};
pub use stats::{RollingStats, SessionExtremes};

/// Axis maximum while auto-ranging is off or there isn't enough data yet.
pub const REST_MAX: f64 = 200.0;
/// Smallest axis maximum, so small changes still look like changes.
pub const MIN_RANGE: f64 = 30.0;
/// Largest axis maximum, roughly the physiological ceiling.
pub const MAX_RANGE: f64 = 250.0;
/// Headroom added above the windowed maximum.
pub const PADDING_RATIO: f64 = 0.10;
pub const SMOOTHING_FACTOR: f64 = 0.15;
pub const SNAP_DISTANCE: f64 = 0.5;
/// Stored points are only re-normalized once the axis is this far from its target.
pub const RELAYOUT_THRESHOLD: f64 = 5.0;
/// The trend chart keeps its average line at this fraction of the height.
pub const GOLDEN_RATIO: f64 = 0.618;

/// Samples needed before averages and auto-ranging kick in.
pub const MIN_SAMPLES: usize = 5;
pub const RANGING_WINDOW: usize = 40;
pub const AVERAGE_WINDOW: usize = 100;

pub const GRID_SPACE: f64 = 10.0;
pub const MOVE_STEP: f64 = 1.0;
pub const TICK_INTERVAL: Duration = Duration::from_millis(500);

/// Maps a value onto a vertical chart coordinate. Always within `0..=height`.
pub fn normalize(value: f64, max: f64, height: f64) -> f64 {
    let range = if max <= 0.0 { MIN_RANGE } else { max };
    let scaled = (value / range * height).round_ties_even();
    height - scaled.clamp(0.0, height)
}

/// Rounds to the nearest multiple of `GRID_SPACE`, ties to even.
pub(crate) fn round_to_ten(value: f64) -> f64 {
    (value / 10.0).round_ties_even() * 10.0
}
