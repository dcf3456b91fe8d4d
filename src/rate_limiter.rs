//! Per-direction byte-rate leaky bucket.
//!
//! One bucket exists per flow direction (client→upstream, upstream→client) for the lifetime of a
//! connection; it is never shared across connections or threads.

use std::time::Instant;

use crate::error::ProxyError;

/// Leaky-bucket rate limiter: `rate` bytes/sec, refilled on every `consume` call based on wall
/// clock elapsed since the last check.
///
/// Invariant: `0 <= tokens <= rate` holds after every public method returns.
#[derive(Debug)]
pub struct LeakyBucket {
    rate: u64,
    tokens: u64,
    last_check: Instant,
}

impl LeakyBucket {
    /// Creates a bucket starting full at `rate` bytes/sec.
    pub fn new(rate: u64) -> Self {
        Self {
            rate,
            tokens: rate,
            last_check: Instant::now(),
        }
    }

    /// Bytes/sec this bucket enforces.
    pub fn rate(&self) -> u64 {
        self.rate
    }

    /// Tokens currently available, after refilling for elapsed time.
    pub fn available(&mut self) -> u64 {
        self.refill();
        self.tokens
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(self.last_check);
        let leaked = (elapsed.as_secs_f64() * self.rate as f64) as u64;
        self.tokens = self.tokens.saturating_add(leaked).min(self.rate);
        self.last_check = now;
    }

    /// Attempts to consume `amount` bytes. Returns the amount actually granted, which is
    /// `min(amount, tokens)` after refilling. Never blocks.
    pub fn consume(&mut self, amount: u64) -> u64 {
        self.refill();
        let granted = amount.min(self.tokens);
        self.tokens -= granted;
        granted
    }

    /// Returns `n` unused tokens to the bucket, e.g. after a reserved amount turned out larger
    /// than what the socket actually accepted. `n` must be non-negative by construction (`u64`);
    /// callers passing a negative delta should not have reached this call.
    pub fn release(&mut self, n: u64) -> Result<(), ProxyError> {
        self.tokens = self.tokens.saturating_add(n).min(self.rate);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn starts_full() {
        let mut b = LeakyBucket::new(100);
        assert_eq!(b.consume(0), 0);
        assert_eq!(b.available(), 100);
    }

    #[test]
    fn consume_caps_at_available_tokens() {
        let mut b = LeakyBucket::new(100);
        assert_eq!(b.consume(150), 100);
        assert_eq!(b.consume(10), 0);
    }

    #[test]
    fn refill_over_time_steady_state() {
        let mut b = LeakyBucket::new(100);
        // drain
        assert_eq!(b.consume(100), 100);
        sleep(Duration::from_millis(500));
        let granted = b.consume(60);
        // ~50 tokens should have leaked back in; allow scheduler slack.
        assert!((40..=60).contains(&granted), "granted = {granted}");
    }

    #[test]
    fn release_returns_unused_tokens() {
        let mut b = LeakyBucket::new(100);
        sleep(Duration::from_millis(50));
        let granted = b.consume(80);
        assert!(granted > 0);
        b.release(30).unwrap();
        let next = b.consume(1_000_000);
        assert!(next >= 30);
    }

    #[test]
    fn release_never_exceeds_rate() {
        let mut b = LeakyBucket::new(10);
        b.release(1_000).unwrap();
        assert_eq!(b.available(), 10);
    }

    #[test]
    fn tokens_never_negative() {
        let mut b = LeakyBucket::new(50);
        for _ in 0..10 {
            b.consume(1_000);
        }
        assert!(b.available() <= 50);
    }
}
