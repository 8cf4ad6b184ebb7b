//! Production time source
//!
//! The engine's refill math tolerates equal timestamps but not backward
//! jumps, which would inflate buckets. Wall clocks can step backwards (NTP),
//! so production time is a wall-clock offset captured once plus a monotonic
//! elapsed term.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Monotonically non-decreasing wall-clock seconds.
#[derive(Debug, Clone)]
pub struct Clock {
    origin: Instant,
    offset: f64,
}

impl Clock {
    pub fn new() -> Self {
        let offset = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(1.0);
        Self {
            origin: Instant::now(),
            offset,
        }
    }

    /// Seconds since the Unix epoch, with sub-second resolution.
    pub fn now(&self) -> f64 {
        self.offset + self.origin.elapsed().as_secs_f64()
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}
