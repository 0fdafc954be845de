use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

struct Pacing {
    requests_per_second: f64,
    interval: Duration,
    last_admitted: Instant,
}

/// A minimum-interval gate: any two calls admitted through one limiter are
/// at least `1/rate` apart.
///
/// The lock is held across the pacing sleep on purpose: that is what makes
/// the guarantee hold for every pair of callers sharing the limiter, not
/// just consecutive calls on one thread. A limiter shared by many threads
/// therefore serializes them.
pub struct RateLimiter {
    pacing: Mutex<Pacing>,
}

impl RateLimiter {
    /// Panics if `requests_per_second` is not strictly positive.
    pub fn new(requests_per_second: f64) -> Self {
        assert!(
            requests_per_second > 0.0,
            "rate must be strictly positive, got {requests_per_second}"
        );
        Self {
            pacing: Mutex::new(Pacing {
                requests_per_second,
                interval: Duration::from_secs_f64(1.0 / requests_per_second),
                last_admitted: Instant::now(),
            }),
        }
    }

    /// Blocks until the pacing interval since the last admitted call has
    /// passed, then records this call as admitted.
    pub fn wait(&self) {
        let mut pacing = self.pacing.lock().unwrap();
        let elapsed = pacing.last_admitted.elapsed();
        if elapsed < pacing.interval {
            thread::sleep(pacing.interval - elapsed);
        }
        pacing.last_admitted = Instant::now();
    }

    /// Swaps in a new rate; the derived interval changes atomically with it.
    pub fn set_rate(&self, requests_per_second: f64) {
        assert!(
            requests_per_second > 0.0,
            "rate must be strictly positive, got {requests_per_second}"
        );
        let mut pacing = self.pacing.lock().unwrap();
        pacing.requests_per_second = requests_per_second;
        pacing.interval = Duration::from_secs_f64(1.0 / requests_per_second);
    }

    pub fn rate(&self) -> f64 {
        self.pacing.lock().unwrap().requests_per_second
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consecutive_waits_are_at_least_an_interval_apart() {
        let limiter = RateLimiter::new(1000.0);
        limiter.wait();

        let before = Instant::now();
        limiter.wait();
        limiter.wait();
        assert!(before.elapsed() >= Duration::from_millis(2));
    }

    #[test]
    fn set_rate_changes_the_interval() {
        let limiter = RateLimiter::new(10.0);
        limiter.set_rate(500.0);
        assert_eq!(limiter.rate(), 500.0);

        limiter.wait();
        let before = Instant::now();
        limiter.wait();
        // 500/s means 2ms pacing, nowhere near the old 100ms.
        assert!(before.elapsed() < Duration::from_millis(50));
    }

    #[test]
    #[should_panic(expected = "strictly positive")]
    fn zero_rate_is_rejected() {
        let _ = RateLimiter::new(0.0);
    }
}
