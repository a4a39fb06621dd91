//! Adaptive quantum sizing.
//!
//! A quantum is measured in frame-execution steps, but responsiveness is a
//! wall-clock concern. The estimator tracks a cumulative moving average of
//! observed steps-per-millisecond and sizes the next quantum to hit the
//! configured responsiveness target.

use std::time::Duration;

/// Default responsiveness target in milliseconds.
pub const DEFAULT_RESPONSIVENESS_MS: u32 = 100;

const INITIAL_STEPS_PER_MS: f64 = 100.0;
const MIN_QUANTUM_STEPS: u32 = 1_000;
const MAX_QUANTUM_STEPS: u32 = 10_000_000;

/// Sizes quanta from observed execution throughput.
#[derive(Debug)]
pub struct QuantumEstimator {
    responsiveness_ms: u32,
    steps_per_ms: f64,
    samples: u64,
}

impl QuantumEstimator {
    /// Create an estimator targeting the given responsiveness window.
    pub fn new(responsiveness_ms: u32) -> Self {
        Self {
            responsiveness_ms: responsiveness_ms.max(1),
            steps_per_ms: INITIAL_STEPS_PER_MS,
            samples: 0,
        }
    }

    /// Steps to grant the next quantum.
    pub fn suggested_steps(&self) -> u32 {
        let steps = self.steps_per_ms * f64::from(self.responsiveness_ms);
        (steps as u32).clamp(MIN_QUANTUM_STEPS, MAX_QUANTUM_STEPS)
    }

    /// Fold one completed quantum into the moving average.
    pub fn record(&mut self, steps: u32, elapsed: Duration) {
        let ms = elapsed.as_secs_f64() * 1_000.0;
        // Sub-millisecond quanta are common on short threads; floor the
        // denominator so one fast sample cannot blow up the average.
        let rate = f64::from(steps) / ms.max(0.01);
        self.samples += 1;
        self.steps_per_ms += (rate - self.steps_per_ms) / self.samples as f64;
    }
}

impl Default for QuantumEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_RESPONSIVENESS_MS)
    }
}
