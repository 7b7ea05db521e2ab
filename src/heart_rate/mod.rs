pub mod btle;
pub mod dummy;
pub mod measurement;
pub mod session;
pub mod transport;

use std::time::Duration;

use chrono::{DateTime, Local};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeartRateStatus {
    pub heart_rate_bpm: u16,
    pub rr_intervals: Vec<Duration>,
    pub timestamp: DateTime<Local>,
}

// Only used when the monitor doesn't send RR intervals itself
// (or when simulating one)
pub fn rr_from_bpm(bpm: u16) -> Duration {
    // Make sure it's at least 1 to prevent a potential divide by zero
    let bpm = bpm.max(1);
    Duration::from_secs_f32(60.0 / bpm as f32)
}
