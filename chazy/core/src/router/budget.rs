//! Response budget
//!
//! A small token bucket: at most `max` immediate responses banked, one token
//! regained per refill interval. Refill keeps the remainder of a partially
//! elapsed interval, so checking often never loses time; once the bucket is
//! full the refill clock restarts.

use std::time::Duration;

use tokio::time::Instant;

/// Token bucket for immediate responses
#[derive(Clone, Debug)]
pub struct ResponseBudget {
    max: u32,
    tokens: u32,
    refill_interval: Duration,
    last_refill: Instant,
}

impl ResponseBudget {
    /// Full bucket of `max` tokens
    #[must_use]
    pub fn new(max: u32, refill_interval: Duration, now: Instant) -> Self {
        Self {
            max,
            tokens: max,
            refill_interval,
            last_refill: now,
        }
    }

    /// Bucket capacity
    #[must_use]
    pub fn max(&self) -> u32 {
        self.max
    }

    /// Credit whole intervals elapsed since the last refill
    pub fn refill(&mut self, now: Instant) {
        if self.tokens >= self.max || self.refill_interval.is_zero() {
            self.tokens = self.max;
            self.last_refill = now;
            return;
        }
        let elapsed = now.saturating_duration_since(self.last_refill);
        let intervals = elapsed.as_nanos() / self.refill_interval.as_nanos();
        if intervals == 0 {
            return;
        }
        let intervals = u32::try_from(intervals).unwrap_or(u32::MAX);
        self.tokens = self.tokens.saturating_add(intervals).min(self.max);
        if self.tokens == self.max {
            self.last_refill = now;
        } else {
            self.last_refill += self.refill_interval * intervals;
        }
    }

    /// Tokens available at `now`
    pub fn available(&mut self, now: Instant) -> u32 {
        self.refill(now);
        self.tokens
    }

    /// Spend one token if there is one
    pub fn try_debit(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens == 0 {
            return false;
        }
        self.tokens -= 1;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(45);

    #[test]
    fn test_starts_full_and_drains() {
        let now = Instant::now();
        let mut budget = ResponseBudget::new(3, INTERVAL, now);
        assert!(budget.try_debit(now));
        assert!(budget.try_debit(now));
        assert!(budget.try_debit(now));
        assert!(!budget.try_debit(now));
        assert_eq!(budget.available(now), 0);
    }

    #[test]
    fn test_refill_preserves_remainder() {
        let start = Instant::now();
        let mut budget = ResponseBudget::new(3, INTERVAL, start);
        for _ in 0..3 {
            budget.try_debit(start);
        }
        // Bucket was last full at `start`; 60 s later one token and 15 s of credit.
        assert_eq!(budget.available(start + Duration::from_secs(60)), 1);
        // 30 s more completes the second interval thanks to the kept 15 s.
        assert_eq!(budget.available(start + Duration::from_secs(90)), 2);
    }

    #[test]
    fn test_never_exceeds_max() {
        let start = Instant::now();
        let mut budget = ResponseBudget::new(3, INTERVAL, start);
        budget.try_debit(start);
        assert_eq!(budget.available(start + Duration::from_secs(3600)), 3);
    }

    #[test]
    fn test_conservation() {
        // Over any window, successful debits ≤ max + refills.
        let start = Instant::now();
        let mut budget = ResponseBudget::new(3, INTERVAL, start);
        let mut spent = 0;
        for second in 0..=300u64 {
            if budget.try_debit(start + Duration::from_secs(second)) {
                spent += 1;
            }
        }
        assert!(spent <= 3 + 300 / 45);
        assert!(spent >= 3 + 300 / 45 - 1);
    }
}
