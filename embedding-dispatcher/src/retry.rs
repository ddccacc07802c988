//! Exponential backoff with jitter for transient provider failures
//! (spec.md §4.3, `DispatcherConfig::retry_*`).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use engine_model::config::DispatcherConfig;

/// Walks the backoff sequence for one request: `initial * multiplier^n`,
/// capped, for up to `max_attempts` total tries (the first try plus
/// `max_attempts - 1` retries).
pub struct BackoffSchedule {
    initial: Duration,
    multiplier: f64,
    cap: Duration,
    max_attempts: u32,
    attempt: u32,
}

impl BackoffSchedule {
    pub fn new(config: &DispatcherConfig) -> Self {
        Self {
            initial: config.retry_initial_backoff,
            multiplier: config.retry_backoff_multiplier,
            cap: config.retry_backoff_cap,
            max_attempts: config.retry_max_attempts.max(1),
            attempt: 0,
        }
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempt
    }

    pub fn exhausted(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Consume one attempt and return the delay to wait before the next
    /// one, or `None` once `max_attempts` has been reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.exhausted() {
            return None;
        }
        let exp = self.multiplier.powi(self.attempt as i32);
        let base = self.initial.mul_f64(exp).min(self.cap);
        self.attempt += 1;
        Some(jitter(base))
    }
}

/// Full jitter: a uniformly random duration in `[0, base]`, computed
/// without pulling in a dependency purely for this. Seeded from the wall
/// clock and the base duration itself, which is enough spread for
/// request-level retry staggering.
fn jitter(base: Duration) -> Duration {
    if base.is_zero() {
        return base;
    }
    let seed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
        ^ base.as_nanos() as u64;
    let mixed = splitmix64(seed);
    let fraction = (mixed >> 11) as f64 / (1u64 << 53) as f64;
    base.mul_f64(fraction)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// True for provider errors the dispatcher should retry; false for
/// configuration or input-shape errors that will never succeed on replay.
pub fn is_transient(err: &crate::embedder::EmbedderError) -> bool {
    matches!(err, crate::embedder::EmbedderError::ProviderFailure { .. })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_attempts: u32) -> DispatcherConfig {
        let mut c = DispatcherConfig::default();
        c.retry_initial_backoff = Duration::from_millis(10);
        c.retry_backoff_multiplier = 2.0;
        c.retry_backoff_cap = Duration::from_millis(100);
        c.retry_max_attempts = max_attempts;
        c
    }

    #[test]
    fn stops_after_max_attempts() {
        let cfg = config(3);
        let mut schedule = BackoffSchedule::new(&cfg);
        assert!(schedule.next_delay().is_some());
        assert!(schedule.next_delay().is_some());
        assert!(schedule.next_delay().is_some());
        assert!(schedule.next_delay().is_none());
        assert!(schedule.exhausted());
    }

    #[test]
    fn delays_never_exceed_cap() {
        let cfg = config(10);
        let mut schedule = BackoffSchedule::new(&cfg);
        while let Some(delay) = schedule.next_delay() {
            assert!(delay <= cfg.retry_backoff_cap);
        }
    }

    #[test]
    fn zero_max_attempts_still_allows_one_try() {
        let cfg = config(0);
        let mut schedule = BackoffSchedule::new(&cfg);
        assert!(schedule.next_delay().is_some());
    }
}
