use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// Stop condition for a constant executor's VUs: iterations may start until
/// the deadline passes. An iteration that is already running when the
/// deadline elapses finishes normally; the gate is only consulted between
/// iterations.
#[derive(Debug)]
pub struct IterationGate {
    duration: Duration,
    deadline: OnceLock<Instant>,
}

impl IterationGate {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            deadline: OnceLock::new(),
        }
    }

    /// Anchors the deadline at the shared run start, so every VU of the
    /// scenario stops at the same wall-clock moment.
    pub fn start_at(&self, started: Instant) {
        let _ = self.deadline.set(started + self.duration);
    }

    /// Whether another iteration may start.
    pub fn next(&self) -> bool {
        let now = Instant::now();

        // If the runner didn't explicitly set a start time, lazily anchor the
        // deadline at the first observed iteration.
        if self.deadline.get().is_none() {
            self.start_at(now);
        }

        match self.deadline.get() {
            Some(deadline) => now < *deadline,
            None => false,
        }
    }
}
