//! # Fibonacci Backoff
//!
//! Requeue delays for reconciles that keep failing. The sequence grows more
//! slowly than exponential backoff: 1m, 1m, 2m, 3m, 5m, 8m, 10m (max).
//!
//! [`ErrorBackoff`] keeps one sequence per object key (`namespace/name`) so a
//! single broken object does not slow down the others.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

/// Fibonacci backoff calculator, in whole minutes
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_minutes: u64,
    prev_minutes: u64,
    current_minutes: u64,
    max_minutes: u64,
}

impl Default for FibonacciBackoff {
    /// 1 minute min, 10 minutes max
    fn default() -> Self {
        Self::new(1, 10)
    }
}

impl FibonacciBackoff {
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        Self {
            min_minutes,
            prev_minutes: 0,
            current_minutes: min_minutes,
            max_minutes,
        }
    }

    /// Current delay; advances the sequence
    pub fn next_delay(&mut self) -> Duration {
        let result = Duration::from_secs(self.current_minutes * 60);
        let next_minutes = self.prev_minutes + self.current_minutes;
        self.prev_minutes = self.current_minutes;
        self.current_minutes = next_minutes.min(self.max_minutes);
        result
    }

    pub fn reset(&mut self) {
        self.prev_minutes = 0;
        self.current_minutes = self.min_minutes;
    }
}

#[derive(Debug, Clone, Default)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

/// Per-object error backoff shared by a controller's error policy
#[derive(Debug, Default)]
pub struct ErrorBackoff {
    states: Mutex<HashMap<String, BackoffState>>,
}

impl ErrorBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure for `key` and return (delay, consecutive errors)
    pub fn on_error(&self, key: &str) -> (Duration, u32) {
        match self.states.lock() {
            Ok(mut states) => {
                let state = states.entry(key.to_string()).or_default();
                state.error_count += 1;
                (state.backoff.next_delay(), state.error_count)
            }
            Err(e) => {
                warn!("Failed to lock backoff states: {}, using default backoff", e);
                (Duration::from_secs(60), 0)
            }
        }
    }

    /// Forget the failures of `key` after a successful reconcile
    pub fn reset(&self, key: &str) {
        if let Ok(mut states) = self.states.lock() {
            states.remove(key);
        }
    }

    /// Consecutive failures recorded for `key`
    pub fn error_count(&self, key: &str) -> u32 {
        self.states
            .lock()
            .ok()
            .and_then(|states| states.get(key).map(|s| s.error_count))
            .unwrap_or(0)
    }
}
