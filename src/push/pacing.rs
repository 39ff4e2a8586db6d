//! Delivery pacing and progress cadence

use rand::Rng;
use std::time::Duration;

/// Lower bound of the jitter factor
pub const JITTER_MIN: f64 = 0.8;

/// Upper bound of the jitter factor
pub const JITTER_MAX: f64 = 1.2;

/// Smallest number of deliveries between two progress events
pub const MIN_PROGRESS_STEP: u64 = 10;

/// Delay drawn uniformly from `[0.8, 1.2] * interval`
pub fn jittered_delay(interval: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(JITTER_MIN..=JITTER_MAX);
    interval.mul_f64(factor)
}

/// Deliveries between progress events: `max(10, ceil(total / 5))`
pub fn progress_step(total: u64) -> u64 {
    total.div_ceil(5).max(MIN_PROGRESS_STEP)
}

/// Whether a progress event is due after `sent` of `total` attempts
///
/// Never true for the last attempt; the final report covers it.
pub fn progress_due(sent: u64, total: u64) -> bool {
    sent > 0 && sent < total && sent % progress_step(total) == 0
}
