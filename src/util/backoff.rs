//! Backoff for optimistic retry loops.

use std::hint::spin_loop;
use std::thread;

/// Per-loop backoff: exponential spinning that degrades into yielding.
///
/// It never sleeps, so a retry loop stays a tight read-compute-attempt
/// cycle; losers of a race just burn fewer cycles while the winner finishes.
#[derive(Debug, Default)]
pub struct Backoff {
    attempts: u32,
}

impl Backoff {
    /// Attempts after which spinning gives way to `yield_now`.
    const SPIN_LIMIT: u32 = 6;

    pub fn new() -> Self {
        Self { attempts: 0 }
    }

    /// Wait a little before the next attempt.
    pub fn spin(&mut self) {
        if self.attempts < Self::SPIN_LIMIT {
            for _ in 0..(1u32 << self.attempts) {
                spin_loop();
            }
        } else {
            thread::yield_now();
        }
        self.attempts = self.attempts.saturating_add(1);
    }

    /// Failed attempts so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// True once spinning has given way to yielding.
    pub fn is_yielding(&self) -> bool {
        self.attempts >= Self::SPIN_LIMIT
    }

    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spins_before_yielding() {
        let mut backoff = Backoff::new();

        for _ in 0..Backoff::SPIN_LIMIT {
            assert!(!backoff.is_yielding());
            backoff.spin();
        }

        assert!(backoff.is_yielding());
        assert_eq!(backoff.attempts(), Backoff::SPIN_LIMIT);
    }

    #[test]
    fn test_reset_starts_over() {
        let mut backoff = Backoff::new();
        for _ in 0..20 {
            backoff.spin();
        }

        backoff.reset();
        assert_eq!(backoff.attempts(), 0);
        assert!(!backoff.is_yielding());
    }
}
