//! Point buffers behind the two chart flavours.
//!
//! Both keep the raw sample next to each drawn point, so an axis change can
//! re-normalize everything without losing precision.

use std::collections::VecDeque;

use super::{normalize, GRID_SPACE, MOVE_STEP};

/// Pending samples beyond this are dropped oldest-first. Only reachable when a
/// device notifies much faster than the chart scrolls.
const PENDING_CAP: usize = 256;
/// Trend history is halved (and the bucket stride doubled) once it reaches this many values.
pub const TREND_HISTORY_CAP: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Fixed-width scrolling line. One slot per `MOVE_STEP` of width.
#[derive(Debug, Clone)]
pub struct ScrollingSeries {
    points: Vec<Point>,
    raw: Vec<u16>,
    pending: VecDeque<u16>,
    current: u16,
    grid_offset: u32,
    width: f64,
    height: f64,
}

impl ScrollingSeries {
    pub fn new(width: f64, height: f64) -> Self {
        let mut series = Self {
            points: Vec::new(),
            raw: Vec::new(),
            pending: VecDeque::new(),
            current: 0,
            grid_offset: 0,
            width: 0.0,
            height: 0.0,
        };
        series.resize(width, height);
        series
    }

    /// Lays every slot back onto the baseline. Done for any resize, even to the same size.
    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width.max(0.0);
        self.height = height.max(0.0);
        let count = (self.width / MOVE_STEP).floor() as usize + 1;
        self.points = (0..count)
            .map(|i| Point::new(i as f64 * MOVE_STEP, self.height))
            .collect();
        self.raw = vec![0; count];
    }

    pub fn push(&mut self, value: u16) {
        if self.pending.len() == PENDING_CAP {
            self.pending.pop_front();
        }
        self.pending.push_back(value);
    }

    /// Scrolls one step left, drawing the next pending value (or repeating the
    /// last one) at the right edge.
    pub fn advance(&mut self, max: f64) {
        let grid_steps = (GRID_SPACE / MOVE_STEP) as u32;
        self.grid_offset = (self.grid_offset + 1) % grid_steps.max(1);

        if let Some(next) = self.pending.pop_front() {
            self.current = next;
        }

        let count = self.points.len();
        for i in 1..count {
            self.points[i - 1].y = self.points[i].y;
            self.raw[i - 1] = self.raw[i];
        }
        if let (Some(last), Some(raw)) = (self.points.last_mut(), self.raw.last_mut()) {
            last.x = self.width;
            last.y = normalize(f64::from(self.current), max, self.height);
            *raw = self.current;
        }
    }

    /// Re-normalizes every stored point against a new axis maximum.
    pub fn relayout(&mut self, max: f64) {
        for (point, &raw) in self.points.iter_mut().zip(&self.raw) {
            point.y = normalize(f64::from(raw), max, self.height);
        }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn raw_values(&self) -> &[u16] {
        &self.raw
    }

    pub fn current(&self) -> u16 {
        self.current
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// How far the vertical grid lines have scrolled, in steps.
    pub fn grid_offset(&self) -> u32 {
        self.grid_offset
    }

    pub fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }
}

/// The whole session squeezed into the chart width.
///
/// Samples are folded into buckets of `stride` samples each, so every stored
/// value covers the same stretch of time. The stride doubles whenever the
/// history reaches [`TREND_HISTORY_CAP`].
#[derive(Debug, Clone)]
pub struct TrendSeries {
    values: Vec<u16>,
    points: Vec<Point>,
    stride: usize,
    bucket_sum: u64,
    bucket_len: usize,
    peak: u16,
    total: u64,
    count: u64,
    width: f64,
    height: f64,
}

impl Default for TrendSeries {
    fn default() -> Self {
        Self {
            values: Vec::new(),
            points: Vec::new(),
            stride: 1,
            bucket_sum: 0,
            bucket_len: 0,
            peak: 0,
            total: 0,
            count: 0,
            width: 0.0,
            height: 0.0,
        }
    }
}

fn rounded_mean(sum: u64, len: u64) -> u16 {
    ((sum + len / 2) / len.max(1)) as u16
}

impl TrendSeries {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width: width.max(0.0),
            height: height.max(0.0),
            ..Default::default()
        }
    }

    pub fn push(&mut self, value: u16) {
        self.peak = self.peak.max(value);
        self.total += u64::from(value);
        self.count += 1;

        self.bucket_sum += u64::from(value);
        self.bucket_len += 1;
        if self.bucket_len < self.stride {
            return;
        }
        self.values
            .push(rounded_mean(self.bucket_sum, self.bucket_len as u64));
        self.bucket_sum = 0;
        self.bucket_len = 0;
        if self.values.len() >= TREND_HISTORY_CAP {
            self.downsample();
        }
    }

    // Merges neighbouring buckets. The cap is even, so every pair is full.
    fn downsample(&mut self) {
        self.values = self
            .values
            .chunks(2)
            .map(|pair| {
                let sum: u64 = pair.iter().map(|&v| u64::from(v)).sum();
                rounded_mean(sum, pair.len() as u64)
            })
            .collect();
        self.stride *= 2;
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.width = width.max(0.0);
        self.height = height.max(0.0);
    }

    /// Recomputes every point position against `max`.
    ///
    /// Each bucket sits at the time of its last sample, and a bucket still
    /// filling up is drawn at the newest sample.
    pub fn relayout(&mut self, max: f64) {
        let (width, height) = (self.width, self.height);
        let last = self.count.saturating_sub(1) as f64;
        let x_at = |sample: usize| {
            if last == 0.0 {
                width / 2.0
            } else {
                sample as f64 / last * width
            }
        };

        let mut points: Vec<Point> = self
            .values
            .iter()
            .enumerate()
            .map(|(i, &value)| {
                let sample = (i + 1) * self.stride - 1;
                Point::new(x_at(sample), normalize(f64::from(value), max, height))
            })
            .collect();
        if self.bucket_len > 0 {
            let value = rounded_mean(self.bucket_sum, self.bucket_len as u64);
            points.push(Point::new(
                x_at(self.count as usize - 1),
                normalize(f64::from(value), max, height),
            ));
        }
        self.points = points;
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Completed buckets, each the mean of [`TrendSeries::stride`] samples.
    pub fn values(&self) -> &[u16] {
        &self.values
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Highest value ever pushed, unaffected by downsampling.
    pub fn peak(&self) -> u16 {
        self.peak
    }

    /// Mean of every value ever pushed.
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.total as f64 / self.count as f64)
    }

    /// Samples pushed since creation, not the number currently stored.
    pub fn samples(&self) -> usize {
        self.count as usize
    }

    pub fn size(&self) -> (f64, f64) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_on_the_baseline() {
        let series = ScrollingSeries::new(20.0, 40.0);
        assert_eq!(series.points().len(), 21);
        assert!(series.points().iter().all(|p| p.y == 40.0));
        assert!(series.raw_values().iter().all(|&v| v == 0));
        assert_eq!(series.points()[20].x, 20.0);
    }

    #[test]
    fn advance_scrolls_left() {
        let mut series = ScrollingSeries::new(4.0, 100.0);
        series.push(100);
        series.push(50);
        series.advance(100.0);
        series.advance(100.0);
        assert_eq!(series.raw_values(), &[0, 0, 0, 100, 50]);
        let ys: Vec<f64> = series.points().iter().map(|p| p.y).collect();
        assert_eq!(ys, vec![100.0, 100.0, 100.0, 0.0, 50.0]);
    }

    #[test]
    fn empty_queue_repeats_current_value() {
        let mut series = ScrollingSeries::new(3.0, 10.0);
        series.push(80);
        for _ in 0..3 {
            series.advance(160.0);
        }
        assert_eq!(series.raw_values(), &[0, 80, 80, 80]);
        assert_eq!(series.pending(), 0);
        assert_eq!(series.current(), 80);
    }

    #[test]
    fn relayout_uses_raw_values() {
        let mut series = ScrollingSeries::new(2.0, 100.0);
        series.push(60);
        series.advance(200.0);
        assert_eq!(series.points()[2].y, 70.0);
        series.relayout(120.0);
        assert_eq!(series.points()[2].y, 50.0);
    }

    #[test]
    fn resize_resets_and_keeps_lengths_aligned() {
        let mut series = ScrollingSeries::new(10.0, 10.0);
        series.push(90);
        series.advance(200.0);
        for (w, h) in [(10.0, 10.0), (0.0, 0.0), (7.5, 3.0), (300.0, 90.0)] {
            series.resize(w, h);
            assert_eq!(series.points().len(), series.raw_values().len());
            assert!(series.raw_values().iter().all(|&v| v == 0));
            series.advance(200.0);
        }
        assert_eq!(series.points().len(), 301);
    }

    #[test]
    fn grid_offset_wraps_every_grid_space() {
        let mut series = ScrollingSeries::new(5.0, 5.0);
        for _ in 0..10 {
            series.advance(200.0);
        }
        assert_eq!(series.grid_offset(), 0);
        series.advance(200.0);
        assert_eq!(series.grid_offset(), 1);
    }

    #[test]
    fn trend_spans_full_width() {
        let mut trend = TrendSeries::new(90.0, 50.0);
        trend.push(100);
        trend.relayout(200.0);
        assert_eq!(trend.points(), &[Point::new(45.0, 25.0)]);

        trend.push(50);
        trend.push(150);
        trend.push(200);
        trend.relayout(200.0);
        let xs: Vec<f64> = trend.points().iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![0.0, 30.0, 60.0, 90.0]);
        assert_eq!(trend.points()[3].y, 0.0);
    }

    #[test]
    fn trend_history_is_bounded() {
        let mut trend = TrendSeries::new(100.0, 100.0);
        for i in 0..(TREND_HISTORY_CAP * 3) {
            trend.push(if i == 1234 { 240 } else { 80 });
        }
        assert!(trend.values().len() < TREND_HISTORY_CAP);
        assert_eq!(trend.samples(), TREND_HISTORY_CAP * 3);
        assert_eq!(trend.peak(), 240);
        assert!(trend.values().iter().all(|&v| (80..=240).contains(&v)));
    }

    #[test]
    fn downsampling_averages_pairs() {
        let mut trend = TrendSeries::default();
        for i in 0..TREND_HISTORY_CAP {
            trend.push(if i % 2 == 0 { 60 } else { 81 });
        }
        assert_eq!(trend.values().len(), TREND_HISTORY_CAP / 2);
        // (60 + 81) / 2 = 70.5, rounded up
        assert!(trend.values().iter().all(|&v| v == 71));
        assert_eq!(trend.stride(), 2);
    }

    #[test]
    fn trend_x_follows_sample_time_after_downsampling() {
        let mut trend = TrendSeries::new(100.0, 100.0);
        for _ in 0..TREND_HISTORY_CAP {
            trend.push(60);
        }
        for _ in 0..2047 {
            trend.push(120);
        }
        trend.relayout(200.0);

        let total = trend.samples() as f64;
        let first_high = trend
            .points()
            .iter()
            .find(|p| p.y == 40.0)
            .expect("120 is drawn");
        let expected = TREND_HISTORY_CAP as f64 / (total - 1.0) * 100.0;
        let bucket_width = trend.stride() as f64 / (total - 1.0) * 100.0;
        assert!(
            (first_high.x - expected).abs() <= bucket_width,
            "drawn at {}, sampled at {expected}",
            first_high.x
        );
        // The half-filled last bucket still reaches the right edge
        assert_eq!(trend.points().last().map(|p| p.x), Some(100.0));
    }

    #[test]
    fn buckets_keep_equal_weight() {
        let mut trend = TrendSeries::default();
        for _ in 0..TREND_HISTORY_CAP {
            trend.push(60);
        }
        assert_eq!(trend.stride(), 2);
        let stored = trend.values().len();
        trend.push(100);
        // Half a bucket isn't stored yet
        assert_eq!(trend.values().len(), stored);
        trend.push(120);
        assert_eq!(trend.values().len(), stored + 1);
        assert_eq!(trend.values().last(), Some(&110));
    }
}
