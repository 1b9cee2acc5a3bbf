use crate::sampler::SensorReading;
use std::sync::Mutex;

/// Latest loop state as seen by observers (metrics, diagnostics).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopSnapshot {
    pub timestamp_ms: u64,
    pub last_reading: Option<SensorReading>,
    pub target_temp_c: f64,
    pub interval_s: u32,
    pub samples: u64,
    pub read_failures: u64,
}

/// Single-writer snapshot cell between the control loop and observer threads.
#[derive(Debug, Default)]
pub struct StateExchange {
    snapshot: Mutex<LoopSnapshot>,
}

impl StateExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the control loop after every sampling cycle.
    pub fn publish(&self, snapshot: LoopSnapshot) {
        *self.snapshot.lock().unwrap() = snapshot;
    }

    pub fn read(&self) -> LoopSnapshot {
        *self.snapshot.lock().unwrap()
    }
}
