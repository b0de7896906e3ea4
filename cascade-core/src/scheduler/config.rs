//! Scheduler configuration.

use std::time::Duration;

/// Default time slice for one burst of batched tasks (one 60Hz frame).
pub const DEFAULT_FRAME_BUDGET: Duration = Duration::from_millis(16);

/// Default number of drain cycles `flush` runs before giving up.
pub const DEFAULT_MAX_FLUSH_CYCLES: usize = 1000;

/// Tuning knobs for the per-thread task scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// How long one slice of batched tasks may run before yielding to the
    /// host. At least one task runs per slice.
    pub frame_budget: Duration,

    /// Upper bound on drain cycles for `flush` and `settle`. Exceeding it
    /// means tasks keep rescheduling each other.
    pub max_flush_cycles: usize,
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self {
            frame_budget: DEFAULT_FRAME_BUDGET,
            max_flush_cycles: DEFAULT_MAX_FLUSH_CYCLES,
        }
    }

    pub fn with_frame_budget(mut self, frame_budget: Duration) -> Self {
        self.frame_budget = frame_budget;
        self
    }

    pub fn with_max_flush_cycles(mut self, max_flush_cycles: usize) -> Self {
        self.max_flush_cycles = max_flush_cycles;
        self
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}
