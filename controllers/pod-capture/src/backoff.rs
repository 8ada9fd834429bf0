//! # Fibonacci Backoff
//!
//! Delays between attempts to re-establish the pod watch after a stream
//! error. Grows more slowly than exponential backoff so a briefly unavailable
//! API server is picked up again quickly.
//!
//! Sequence: 1s, 1s, 2s, 3s, 5s, 8s, 13s, 21s, 30s (max).

use std::time::Duration;

/// Fibonacci backoff calculator
///
/// Each delay is the sum of the previous two, capped at the maximum.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// First delay, used again after `reset`
    min: Duration,
    prev: Duration,
    current: Duration,
    max: Duration,
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff between `min` and `max`
    #[must_use]
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            prev: Duration::ZERO,
            current: min,
            max,
        }
    }

    /// Get the next delay and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;

        let next = self.prev.saturating_add(self.current);
        self.prev = self.current;
        self.current = std::cmp::min(next, self.max);

        result
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.prev = Duration::ZERO;
        self.current = self.min;
    }
}

impl Default for FibonacciBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(30))
    }
}
