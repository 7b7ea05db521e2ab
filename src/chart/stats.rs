use std::collections::VecDeque;

use super::MIN_SAMPLES;

/// A bounded window over the most recent samples.
#[derive(Debug, Clone)]
pub struct RollingStats {
    window: VecDeque<u16>,
    capacity: usize,
    sum: u64,
}

impl RollingStats {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            sum: 0,
        }
    }

    pub fn push(&mut self, sample: u16) {
        if self.window.len() == self.capacity {
            if let Some(evicted) = self.window.pop_front() {
                self.sum -= u64::from(evicted);
            }
        }
        self.window.push_back(sample);
        self.sum += u64::from(sample);
    }

    /// Mean of the window, or 0 until [`MIN_SAMPLES`] have been seen.
    pub fn average(&self) -> f64 {
        if self.window.len() < MIN_SAMPLES {
            return 0.0;
        }
        self.sum as f64 / self.window.len() as f64
    }

    pub fn max(&self) -> Option<u16> {
        self.window.iter().copied().max()
    }

    pub fn min(&self) -> Option<u16> {
        self.window.iter().copied().min()
    }

    pub fn latest(&self) -> Option<u16> {
        self.window.back().copied()
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn reset(&mut self) {
        self.window.clear();
        self.sum = 0;
    }
}

/// Highest and lowest BPM seen over a whole session.
///
/// A reading of 0 means "no contact" rather than a heart rate, so it never
/// becomes the lowest value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionExtremes {
    highest: u16,
    lowest: Option<u16>,
}

impl SessionExtremes {
    pub fn record(&mut self, bpm: u16) {
        self.highest = self.highest.max(bpm);
        if bpm > 0 {
            self.lowest = Some(self.lowest.map_or(bpm, |low| low.min(bpm)));
        }
    }

    pub fn highest(&self) -> u16 {
        self.highest
    }

    pub fn lowest(&self) -> Option<u16> {
        self.lowest
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
