//! Process-wide token-bucket rate limiter, one instance per embedding
//! provider (spec.md §4.3: "a token bucket ... shared by every worker
//! calling the same provider").

use std::sync::Mutex;
use std::time::{Duration, Instant};

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Limits the rate at which request tokens are spent against a provider.
/// `capacity` bounds the burst size; `refill_per_sec` is the sustained
/// rate. Exhausted callers block (with a capped maximum wait) rather than
/// being rejected outright.
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    max_wait: Duration,
    state: Mutex<BucketState>,
}

/// Returned when a caller would have had to wait longer than `max_wait`
/// for enough tokens to become available.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitExceeded {
    pub requested: f64,
    pub would_wait: Duration,
}

impl TokenBucket {
    pub fn new(capacity: f64, refill_per_sec: f64, max_wait: Duration) -> Self {
        // A non-positive refill rate or capacity would never grant tokens;
        // floor both so a misconfigured dispatcher fails loudly through
        // repeated `RateLimitExceeded` rather than deadlocking silently.
        let capacity = capacity.max(1.0);
        let refill_per_sec = refill_per_sec.max(0.01);
        Self {
            capacity,
            refill_per_sec,
            max_wait,
            state: Mutex::new(BucketState { tokens: capacity, last_refill: Instant::now() }),
        }
    }

    /// Block until `amount` tokens are available, or return
    /// [`RateLimitExceeded`] if that would take longer than `max_wait`.
    pub fn acquire(&self, amount: f64) -> Result<(), RateLimitExceeded> {
        let amount = amount.min(self.capacity);
        loop {
            let wait = {
                let mut state = self.state.lock().unwrap();
                self.refill(&mut state);
                if state.tokens >= amount {
                    state.tokens -= amount;
                    return Ok(());
                }
                let deficit = amount - state.tokens;
                Duration::from_secs_f64(deficit / self.refill_per_sec)
            };
            if wait > self.max_wait {
                return Err(RateLimitExceeded { requested: amount, would_wait: wait });
            }
            std::thread::sleep(wait.min(Duration::from_millis(50)));
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grants_up_to_capacity_immediately() {
        let bucket = TokenBucket::new(100.0, 10.0, Duration::from_secs(5));
        assert!(bucket.acquire(100.0).is_ok());
    }

    #[test]
    fn refuses_requests_larger_than_max_wait_allows() {
        let bucket = TokenBucket::new(10.0, 1.0, Duration::from_millis(10));
        bucket.acquire(10.0).unwrap();
        let err = bucket.acquire(10.0).unwrap_err();
        assert!(err.would_wait > Duration::from_millis(10));
    }

    #[test]
    fn refills_over_time() {
        let bucket = TokenBucket::new(10.0, 1000.0, Duration::from_secs(1));
        bucket.acquire(10.0).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert!(bucket.acquire(5.0).is_ok());
    }
}
