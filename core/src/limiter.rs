//! "Next allowed timestamp" gates for the low-priority periodic features.
//!
//! Time resync, registration and similar housekeeping all follow the same
//! shape: compare a monotonic clock against the last time the action ran,
//! and no-op idempotently when not yet due. This is the only state those
//! features carry across cycles.

/// Rate limiter over a monotonic millisecond clock.
pub struct RateLimiter {
    interval_ms: u64,
    last_fire_ms: Option<u64>,
    defer_first: bool,
}

impl RateLimiter {
    /// Gate that fires on its first poll, then at most once per interval.
    pub const fn immediate(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_fire_ms: None,
            defer_first: false,
        }
    }

    /// Gate whose first fire comes one full interval after the first poll,
    /// as if the action had just run at startup.
    pub const fn deferred(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_fire_ms: None,
            defer_first: true,
        }
    }

    /// Returns true when the action is due, consuming the window.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        match self.last_fire_ms {
            None => {
                self.last_fire_ms = Some(now_ms);
                !self.defer_first
            }
            Some(last) => {
                if now_ms.saturating_sub(last) >= self.interval_ms {
                    self.last_fire_ms = Some(now_ms);
                    true
                } else {
                    false
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn immediate_gate_fires_once_then_waits() {
        let mut gate = RateLimiter::immediate(1_000);
        assert!(gate.poll(0));
        assert!(!gate.poll(1));
        assert!(!gate.poll(999));
        assert!(gate.poll(1_000));
        assert!(!gate.poll(1_500));
    }

    #[test]
    fn deferred_gate_waits_a_full_interval_first() {
        let mut gate = RateLimiter::deferred(1_000);
        assert!(!gate.poll(0));
        assert!(!gate.poll(999));
        assert!(gate.poll(1_000));
        assert!(!gate.poll(1_999));
        assert!(gate.poll(2_000));
    }

    #[test]
    fn polling_when_not_due_does_not_slide_the_window() {
        let mut gate = RateLimiter::deferred(1_000);
        assert!(!gate.poll(0));
        assert!(!gate.poll(500));
        assert!(!gate.poll(900));
        assert!(gate.poll(1_000));
    }
}
