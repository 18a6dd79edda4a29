use log::debug;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Sliding-window limiter: at most `max_requests` calls start within any
/// `window`. Callers `acquire()` before each outbound request.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    requests: Mutex<VecDeque<Instant>>,
    max_requests: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(name: impl Into<String>, max_requests: u32, window: Duration) -> Self {
        Self {
            name: name.into(),
            requests: Mutex::new(VecDeque::new()),
            max_requests: max_requests.max(1),
            window,
        }
    }

    /// One call per `interval`.
    pub fn spaced(name: impl Into<String>, interval: Duration) -> Self {
        Self::new(name, 1, interval)
    }

    pub fn per_second(name: impl Into<String>, max_requests: u32) -> Self {
        Self::new(name, max_requests, Duration::from_secs(1))
    }

    /// Waits until a slot is free, then claims it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut requests = self.requests.lock().await;
                let now = Instant::now();
                Self::cleanup_old_requests(&mut requests, now, self.window);

                if requests.len() < self.max_requests as usize {
                    requests.push_back(now);
                    return;
                }

                match requests.front() {
                    Some(oldest) => (*oldest + self.window).saturating_duration_since(now),
                    None => Duration::ZERO,
                }
            };

            debug!("{} rate limit reached, waiting {}ms", self.name, wait.as_millis());
            tokio::time::sleep(wait).await;
        }
    }

    /// Claims a slot only if one is free right now.
    pub async fn try_acquire(&self) -> bool {
        let mut requests = self.requests.lock().await;
        let now = Instant::now();
        Self::cleanup_old_requests(&mut requests, now, self.window);

        if requests.len() >= self.max_requests as usize {
            return false;
        }
        requests.push_back(now);
        true
    }

    fn cleanup_old_requests(requests: &mut VecDeque<Instant>, now: Instant, window: Duration) {
        while let Some(oldest) = requests.front() {
            if now.duration_since(*oldest) >= window {
                requests.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_try_acquire_respects_limit() {
        let limiter = RateLimiter::new("test", 2, Duration::from_secs(60));

        assert!(limiter.try_acquire().await);
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_waits_for_window() {
        let limiter = RateLimiter::spaced("test", Duration::from_secs(4));
        let start = Instant::now();

        limiter.acquire().await;
        limiter.acquire().await;
        limiter.acquire().await;

        assert!(start.elapsed() >= Duration::from_secs(8));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slots_free_after_window() {
        let limiter = RateLimiter::new("test", 1, Duration::from_millis(100));
        assert!(limiter.try_acquire().await);
        assert!(!limiter.try_acquire().await);

        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(limiter.try_acquire().await);
    }
}
