//! Fixed-window counter of failed logins per `email|ip` key.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    failures: u32,
}

pub struct LoginThrottle {
    max_attempts: u32,
    window: Duration,
    entries: Mutex<HashMap<String, Window>>,
}

impl LoginThrottle {
    pub fn new(max_attempts: u32, window: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn key(email: &str, ip: Option<&str>) -> String {
        format!("{}|{}", email.trim().to_lowercase(), ip.unwrap_or("unknown"))
    }

    /// True while the key has used up its failures in the current window.
    pub fn is_blocked(&self, key: &str) -> bool {
        self.is_blocked_at(key, Instant::now())
    }

    pub fn record_failure(&self, key: &str) {
        self.record_failure_at(key, Instant::now());
    }

    pub fn clear(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    fn is_blocked_at(&self, key: &str, now: Instant) -> bool {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(w) if now.duration_since(w.started) >= self.window => {
                entries.remove(key);
                false
            }
            Some(w) => w.failures >= self.max_attempts,
            None => false,
        }
    }

    fn record_failure_at(&self, key: &str, now: Instant) {
        let mut entries = self.entries.lock();
        // Drop expired windows so the map stays bounded by active keys.
        let window = self.window;
        entries.retain(|_, w| now.duration_since(w.started) < window);

        entries
            .entry(key.to_string())
            .and_modify(|w| w.failures += 1)
            .or_insert(Window {
                started: now,
                failures: 1,
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_after_max_failures() {
        let throttle = LoginThrottle::new(3, Duration::from_secs(60));
        let key = LoginThrottle::key("A@Example.com", Some("10.0.0.1"));
        assert_eq!(key, "a@example.com|10.0.0.1");

        let t0 = Instant::now();
        for _ in 0..2 {
            throttle.record_failure_at(&key, t0);
        }
        assert!(!throttle.is_blocked_at(&key, t0));
        throttle.record_failure_at(&key, t0);
        assert!(throttle.is_blocked_at(&key, t0));
    }

    #[test]
    fn window_expiry_and_clear_reset_the_counter() {
        let throttle = LoginThrottle::new(1, Duration::from_secs(60));
        let t0 = Instant::now();
        throttle.record_failure_at("k", t0);
        assert!(throttle.is_blocked_at("k", t0 + Duration::from_secs(59)));
        assert!(!throttle.is_blocked_at("k", t0 + Duration::from_secs(60)));

        throttle.record_failure_at("k", t0);
        throttle.clear("k");
        assert!(!throttle.is_blocked("k"));
    }

    #[test]
    fn keys_are_independent() {
        let throttle = LoginThrottle::new(1, Duration::from_secs(60));
        throttle.record_failure("a|1");
        assert!(throttle.is_blocked("a|1"));
        assert!(!throttle.is_blocked("a|2"));
    }
}
