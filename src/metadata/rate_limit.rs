use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Sliding-window request limiter keyed by caller identifier.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    requests: HashMap<String, VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            requests: HashMap::new(),
        }
    }

    /// Records a request for `identifier` and returns true, or returns false
    /// without recording when the window is already full.
    pub fn try_acquire(&mut self, identifier: &str) -> bool {
        self.try_acquire_at(identifier, Instant::now())
    }

    pub fn try_acquire_at(&mut self, identifier: &str, now: Instant) -> bool {
        let stamps = self.requests.entry(identifier.to_string()).or_default();
        while let Some(&oldest) = stamps.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                stamps.pop_front();
            } else {
                break;
            }
        }

        if stamps.len() >= self.max_requests {
            return false;
        }
        stamps.push_back(now);
        true
    }

    pub fn clear(&mut self, identifier: &str) {
        self.requests.remove(identifier);
    }

    pub fn clear_all(&mut self) {
        self.requests.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_once_window_is_full() {
        let mut limiter = RateLimiter::new(2, Duration::from_secs(60));
        let now = Instant::now();
        assert!(limiter.try_acquire_at("a", now));
        assert!(limiter.try_acquire_at("a", now));
        assert!(!limiter.try_acquire_at("a", now));
        assert!(limiter.try_acquire_at("b", now));
    }

    #[test]
    fn window_slides() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(10));
        let start = Instant::now();
        assert!(limiter.try_acquire_at("a", start));
        assert!(!limiter.try_acquire_at("a", start + Duration::from_secs(9)));
        assert!(limiter.try_acquire_at("a", start + Duration::from_secs(10)));
    }

    #[test]
    fn clearing_resets_counts() {
        let mut limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.try_acquire("a"));
        assert!(limiter.try_acquire("b"));
        limiter.clear("a");
        assert!(limiter.try_acquire("a"));
        assert!(!limiter.try_acquire("b"));
        limiter.clear_all();
        assert!(limiter.try_acquire("b"));
    }
}
