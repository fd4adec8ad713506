//! Request pacing.
//!
//! [`Pacer`] is a fixed-window policy: after every `batch_size` processed
//! entries (whatever their outcome) the run sleeps for `pause`, except after
//! the last entry.  It does not look at provider responses.  [`RetryPolicy`]
//! optionally re-attempts retryable backend errors.
//!
//! Both go through a [`Clock`] so tests can run without real delays.

use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

// ─────────────────────────────────────────────────────────────────────────────
// Clock
// ─────────────────────────────────────────────────────────────────────────────

/// Time source for pacing, retries and ETA reporting.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by [`std::thread::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// A clock that never blocks: `sleep` advances virtual time and is recorded.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    state: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self { start: Instant::now(), state: Mutex::new(ManualState::default()) }
    }

    /// Move virtual time forward without recording a sleep.
    pub fn advance(&self, by: Duration) {
        self.lock().elapsed += by;
    }

    /// Every duration passed to `sleep`, in order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.start + self.lock().elapsed
    }

    fn sleep(&self, duration: Duration) {
        let mut state = self.lock();
        state.elapsed += duration;
        state.sleeps.push(duration);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Pacer
// ─────────────────────────────────────────────────────────────────────────────

/// Fixed-window batch pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pacer {
    batch_size: usize,
    pause: Duration,
}

impl Pacer {
    /// `batch_size` of 0 is treated as 1.
    pub fn new(batch_size: usize, pause: Duration) -> Self {
        Self { batch_size: batch_size.max(1), pause }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn pause(&self) -> Duration {
        self.pause
    }

    /// Whether to pause after the `processed`-th (1-based) of `total` entries.
    pub fn should_pause(&self, processed: usize, total: usize) -> bool {
        processed > 0 && processed % self.batch_size == 0 && processed < total
    }

    /// Pause through `clock` if the window is full.  Returns whether it paused.
    pub fn after_entry(&self, processed: usize, total: usize, clock: &dyn Clock) -> bool {
        if !self.should_pause(processed, total) {
            return false;
        }
        log::info!(
            "Pausing {:.1}s after {} of {} entries to respect rate limits",
            self.pause.as_secs_f64(),
            processed,
            total
        );
        clock.sleep(self.pause);
        true
    }

    /// Pauses a full run over `total` entries will take.
    pub fn expected_pauses(&self, total: usize) -> usize {
        total.saturating_sub(1) / self.batch_size
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Retry
// ─────────────────────────────────────────────────────────────────────────────

/// Linear backoff for retryable backend errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    /// One attempt, no retries.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(max_retries: u32, backoff: Duration) -> Self {
        Self { max_retries, backoff }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_points() {
        let p = Pacer::new(10, Duration::from_secs(2));
        assert!(!p.should_pause(9, 30));
        assert!(p.should_pause(10, 30));
        assert!(p.should_pause(20, 30));
        // Never after the final entry.
        assert!(!p.should_pause(30, 30));
    }

    #[test]
    fn test_pause_count_matches_formula() {
        for (n, b) in [(1, 1), (2, 1), (10, 3), (30, 10), (31, 10), (7, 100)] {
            let clock = ManualClock::new();
            let p = Pacer::new(b, Duration::from_millis(5));
            let paused = (1..=n).filter(|&i| p.after_entry(i, n, &clock)).count();
            assert_eq!(paused, (n - 1) / b, "n={n} b={b}");
            assert_eq!(paused, p.expected_pauses(n));
            assert_eq!(clock.sleeps().len(), paused);
        }
    }

    #[test]
    fn test_zero_batch_is_one() {
        assert_eq!(Pacer::new(0, Duration::ZERO).batch_size(), 1);
    }

    #[test]
    fn test_manual_clock_advances_on_sleep() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        clock.sleep(Duration::from_secs(3));
        clock.advance(Duration::from_secs(1));
        assert_eq!(clock.now() - t0, Duration::from_secs(4));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(3)]);
    }

    #[test]
    fn test_retry_delay_is_linear() {
        let r = RetryPolicy::new(3, Duration::from_millis(500));
        assert_eq!(r.delay(1), Duration::from_millis(500));
        assert_eq!(r.delay(3), Duration::from_millis(1_500));
        assert_eq!(RetryPolicy::none().max_retries, 0);
    }
}
