//! Per-step duration measurement and pool-based overtime detection (§4.4).
//!
//! Invariant: `overtime_pool_remaining = step_limit_pool − Σ max(0, dᵢ − step_time_limit)`.
//! Transient jitter under the per-step limit never touches the pool; only the overage
//! above `step_time_limit` is debited. The pool can go negative — that's exactly the
//! TIMEOUT condition, and `record` reports it so the supervisor can taint.

use std::time::{Duration, Instant};

/// Tracks one agent's per-step durations against a step limit and a cumulative pool.
#[derive(Debug, Clone)]
pub struct TimeAccountant {
    step_time_limit: Duration,
    pool_remaining_nanos: i128,
    durations: Vec<Duration>,
    running_since: Option<Instant>,
}

/// How many past step durations to retain for inspection/debugging; the pool
/// accounting itself only needs the running total, not the full history.
const MAX_RETAINED_DURATIONS: usize = 256;

impl TimeAccountant {
    pub fn new(step_time_limit: Duration, step_limit_pool: Duration) -> Self {
        TimeAccountant {
            step_time_limit,
            pool_remaining_nanos: step_limit_pool.as_nanos() as i128,
            durations: Vec::new(),
            running_since: None,
        }
    }

    /// Start timing a step.
    pub fn tick_start(&mut self) {
        self.running_since = Some(Instant::now());
    }

    /// Stop timing a step started with [`Self::tick_start`], debit the overage
    /// against the pool, and report whether the pool is now exhausted (TIMEOUT).
    pub fn tick_end(&mut self) -> bool {
        let start = self
            .running_since
            .take()
            .expect("tick_end called without a matching tick_start");
        self.record(start.elapsed())
    }

    /// Record a duration directly (used by tests and by timed-out reads, whose
    /// duration is the deadline itself per §5).
    pub fn record(&mut self, duration: Duration) -> bool {
        if self.durations.len() >= MAX_RETAINED_DURATIONS {
            self.durations.remove(0);
        }
        self.durations.push(duration);

        let overage = duration.saturating_sub(self.step_time_limit);
        self.pool_remaining_nanos -= overage.as_nanos() as i128;
        self.is_exhausted()
    }

    /// `true` once the pool has gone negative.
    pub fn is_exhausted(&self) -> bool {
        self.pool_remaining_nanos < 0
    }

    /// Remaining pool, clamped to zero (never negative — use [`Self::is_exhausted`]
    /// to observe the TIMEOUT condition itself).
    pub fn remaining(&self) -> Duration {
        if self.pool_remaining_nanos <= 0 {
            Duration::ZERO
        } else {
            Duration::from_nanos(self.pool_remaining_nanos as u64)
        }
    }

    /// Step durations recorded so far, most recent last (bounded history).
    pub fn durations(&self) -> &[Duration] {
        &self.durations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overage_within_pool_is_not_exhausted() {
        let mut acc = TimeAccountant::new(Duration::from_millis(200), Duration::from_secs(2));
        for _ in 0..10 {
            assert!(!acc.record(Duration::from_millis(300)));
        }
        assert_eq!(acc.remaining(), Duration::from_secs(1));
    }

    #[test]
    fn pool_exhausts_past_budget() {
        let mut acc = TimeAccountant::new(Duration::from_millis(200), Duration::from_secs(2));
        let mut exhausted = false;
        for _ in 0..21 {
            exhausted = acc.record(Duration::from_millis(300));
        }
        assert!(exhausted);
    }

    #[test]
    fn exact_limit_never_debits_pool() {
        let mut acc = TimeAccountant::new(Duration::from_millis(200), Duration::from_millis(1));
        for _ in 0..1000 {
            assert!(!acc.record(Duration::from_millis(200)));
        }
        assert_eq!(acc.remaining(), Duration::from_millis(1));
    }
}
