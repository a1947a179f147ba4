use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Per-address last-failure table used to pace redials.
///
/// Its own lock domain, independent of all routing state: a slow or
/// backing-off dial must never stall an unrelated configuration update.
#[derive(Debug, Default)]
pub struct FailureTracker {
    failures: Mutex<HashMap<String, Instant>>,
}

impl FailureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a dial failure for `address` as of now.
    pub fn record(&self, address: &str) {
        let mut failures = self.failures.lock().unwrap();
        failures.insert(address.to_string(), Instant::now());
    }

    pub fn last_failure(&self, address: &str) -> Option<Instant> {
        self.failures.lock().unwrap().get(address).copied()
    }

    /// Time still to wait before `address` may be dialed again, given the
    /// minimum interval between attempts. `None` means dial away.
    pub fn remaining_wait(&self, address: &str, interval: Duration) -> Option<Duration> {
        let waited = self.last_failure(address)?.elapsed();
        (waited < interval).then(|| interval - waited)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_address_has_no_wait() {
        let tracker = FailureTracker::new();
        assert!(tracker.last_failure("n1:11210").is_none());
        assert!(
            tracker
                .remaining_wait("n1:11210", Duration::from_secs(5))
                .is_none()
        );
    }

    #[test]
    fn fresh_failure_requires_nearly_the_full_interval() {
        let tracker = FailureTracker::new();
        tracker.record("n1:11210");
        let remaining = tracker
            .remaining_wait("n1:11210", Duration::from_secs(5))
            .unwrap();
        assert!(remaining > Duration::from_secs(4));
        assert!(remaining <= Duration::from_secs(5));
        // other addresses are unaffected
        assert!(
            tracker
                .remaining_wait("n2:11210", Duration::from_secs(5))
                .is_none()
        );
    }

    #[test]
    fn elapsed_interval_clears_the_wait() {
        let tracker = FailureTracker::new();
        tracker.record("n1:11210");
        std::thread::sleep(Duration::from_millis(20));
        assert!(
            tracker
                .remaining_wait("n1:11210", Duration::from_millis(10))
                .is_none()
        );
    }
}
