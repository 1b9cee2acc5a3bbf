use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Monotonic clock anchored at a fixed process epoch.
///
/// Counters are 64-bit, so `millis()` does not wrap the way a 32-bit
/// Arduino-style counter would after ~71,582 minutes.
#[derive(Debug, Clone, Copy)]
pub struct TimeBase {
    start: Instant,
}

impl TimeBase {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Monotonic microseconds since start.
    pub fn micros(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    /// Monotonic milliseconds since start.
    pub fn millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    /// Wall-clock microseconds since Unix epoch (for cross-process logs only).
    pub fn unix_us(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as u64
    }

    pub fn delay(ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }

    pub fn delay_micros(us: u64) {
        thread::sleep(Duration::from_micros(us));
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::new()
    }
}
