//! Failed login tracking.
//!
//! After `max_attempts` failures inside the window an account is locked
//! until `lockout` has passed since the oldest counted failure.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

/// Maximum failed attempts before lockout.
pub const MAX_LOGIN_ATTEMPTS: u32 = 5;

/// Lockout duration (5 minutes).
pub const LOCKOUT_DURATION_SECS: u64 = 5 * 60;

/// Tracked usernames before aged-out entries are swept.
pub const CLEANUP_THRESHOLD: usize = 1024;

/// Result of a lockout check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitResult {
    /// The attempt may proceed.
    Allowed,
    /// The account is locked for the remaining duration.
    Locked(Duration),
}

/// Per-username failed attempt tracker.
#[derive(Debug)]
pub struct LoginLimiter {
    failures: HashMap<String, Vec<Instant>>,
    max_attempts: u32,
    lockout: Duration,
    next_cleanup: usize,
}

impl Default for LoginLimiter {
    fn default() -> Self {
        Self::new(MAX_LOGIN_ATTEMPTS, Duration::from_secs(LOCKOUT_DURATION_SECS))
    }
}

impl LoginLimiter {
    /// Create a limiter. `max_attempts == 0` disables locking.
    pub fn new(max_attempts: u32, lockout: Duration) -> Self {
        Self {
            failures: HashMap::new(),
            max_attempts,
            lockout,
            next_cleanup: CLEANUP_THRESHOLD,
        }
    }

    /// Check whether `username` may attempt a login now.
    pub fn check(&mut self, username: &str) -> LimitResult {
        if self.max_attempts == 0 {
            return LimitResult::Allowed;
        }
        let Some(failures) = self.failures.get_mut(username) else {
            return LimitResult::Allowed;
        };

        let lockout = self.lockout;
        failures.retain(|t| t.elapsed() < lockout);
        if failures.len() >= self.max_attempts as usize {
            if let Some(oldest) = failures.first() {
                return LimitResult::Locked(lockout.saturating_sub(oldest.elapsed()));
            }
        }
        LimitResult::Allowed
    }

    /// Record a failed attempt.
    ///
    /// Does nothing when locking is disabled. Once the number of tracked
    /// usernames reaches the sweep threshold, aged-out entries are dropped.
    pub fn record_failure(&mut self, username: &str) {
        if self.max_attempts == 0 {
            return;
        }
        if self.failures.len() >= self.next_cleanup {
            self.cleanup();
            self.next_cleanup = CLEANUP_THRESHOLD.max(self.failures.len() * 2);
        }

        let lockout = self.lockout;
        let failures = self.failures.entry(username.to_string()).or_default();
        failures.retain(|t| t.elapsed() < lockout);
        failures.push(Instant::now());

        debug!(
            username = %username,
            attempt_count = failures.len(),
            "Recorded failed login attempt"
        );
    }

    /// Forget the failures of `username` (after a successful login).
    pub fn clear(&mut self, username: &str) {
        self.failures.remove(username);
    }

    /// Drop entries whose failures have all aged out.
    pub fn cleanup(&mut self) {
        let lockout = self.lockout;
        self.failures.retain(|_, failures| {
            failures.retain(|t| t.elapsed() < lockout);
            !failures.is_empty()
        });
    }

    /// Number of usernames currently tracked.
    pub fn tracked(&self) -> usize {
        self.failures.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_allows_unknown_user() {
        let mut limiter = LoginLimiter::default();
        assert_eq!(limiter.check("operator"), LimitResult::Allowed);
    }

    #[test]
    fn test_locks_after_max_attempts() {
        let mut limiter = LoginLimiter::new(3, Duration::from_secs(60));
        limiter.record_failure("operator");
        limiter.record_failure("operator");
        assert_eq!(limiter.check("operator"), LimitResult::Allowed);

        limiter.record_failure("operator");
        match limiter.check("operator") {
            LimitResult::Locked(remaining) => assert!(remaining.as_secs() > 0),
            LimitResult::Allowed => panic!("expected lockout"),
        }
        assert_eq!(limiter.check("someone_else"), LimitResult::Allowed);
    }

    #[test]
    fn test_clear_unlocks() {
        let mut limiter = LoginLimiter::new(1, Duration::from_secs(60));
        limiter.record_failure("operator");
        assert!(matches!(limiter.check("operator"), LimitResult::Locked(_)));

        limiter.clear("operator");
        assert_eq!(limiter.check("operator"), LimitResult::Allowed);
    }

    #[test]
    fn test_zero_attempts_disables_locking() {
        let mut limiter = LoginLimiter::new(0, Duration::from_secs(60));
        for _ in 0..10 {
            limiter.record_failure("operator");
        }
        assert_eq!(limiter.check("operator"), LimitResult::Allowed);
        assert_eq!(limiter.tracked(), 0);
    }

    #[test]
    fn test_distinct_usernames_are_swept() {
        let mut limiter = LoginLimiter::new(3, Duration::from_millis(10));
        for i in 0..CLEANUP_THRESHOLD {
            limiter.record_failure(&format!("user{i}"));
        }
        assert_eq!(limiter.tracked(), CLEANUP_THRESHOLD);

        sleep(Duration::from_millis(30));
        limiter.record_failure("latecomer");
        assert_eq!(limiter.tracked(), 1);
    }

    #[test]
    fn test_fresh_failures_survive_sweep() {
        let mut limiter = LoginLimiter::new(3, Duration::from_secs(60));
        for i in 0..=CLEANUP_THRESHOLD {
            limiter.record_failure(&format!("user{i}"));
        }
        assert_eq!(limiter.tracked(), CLEANUP_THRESHOLD + 1);
    }

    #[test]
    fn test_lockout_expires() {
        let mut limiter = LoginLimiter::new(1, Duration::from_millis(20));
        limiter.record_failure("operator");
        sleep(Duration::from_millis(40));

        assert_eq!(limiter.check("operator"), LimitResult::Allowed);
        limiter.cleanup();
        assert_eq!(limiter.tracked(), 0);
    }
}
