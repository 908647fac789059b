use std::time::{Duration, Instant};

/// Cooperative wall-clock budget, checked between phases and on every chain expansion.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Duration,
}

impl Deadline {
    pub fn after(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.started.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// A fresh deadline covering `fraction` of what is left of this one.
    pub fn portion(&self, fraction: f64) -> Deadline {
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            1.0
        };
        Deadline::after(self.remaining().mul_f64(fraction))
    }
}
