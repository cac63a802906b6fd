use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::Quota;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("request cancelled")]
pub struct Cancelled;

type DirectLimiter = governor::RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Enforces a minimum spacing between successive releases.
///
/// One limiter belongs to exactly one discovery service. The quota allows a
/// burst of one, so the first release is immediate and every later one waits
/// out the interval since the previous release. A zero interval disables
/// limiting.
pub struct RateLimiter {
    interval: Duration,
    limiter: Option<DirectLimiter>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        RateLimiter {
            interval,
            limiter: Quota::with_period(interval).map(governor::RateLimiter::direct),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Blocks until the quota allows another release.
    ///
    /// Returns `Err(Cancelled)` as soon as `cancel` fires; a cancelled wait does
    /// not consume a permit.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
        if cancel.is_cancelled() {
            return Err(Cancelled);
        }

        let Some(limiter) = &self.limiter else {
            return Ok(());
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Cancelled),
            _ = limiter.until_ready() => Ok(()),
        }
    }
}

pub fn interval_for_rate(requests_per_second: f32) -> Duration {
    if requests_per_second.is_finite() && requests_per_second > 0.0 {
        Duration::from_secs_f64(1.0 / requests_per_second as f64)
    } else {
        Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    const INTERVAL: Duration = Duration::from_millis(50);
    // Slack for the limiter clock and the test clock being read separately
    const SLACK: Duration = Duration::from_millis(5);

    #[test]
    fn test_interval_for_rate() {
        assert_eq!(interval_for_rate(1.0), Duration::from_secs(1));
        assert_eq!(interval_for_rate(4.0), Duration::from_millis(250));
        assert_eq!(interval_for_rate(0.0), Duration::ZERO);
        assert_eq!(interval_for_rate(-2.0), Duration::ZERO);
        assert_eq!(interval_for_rate(f32::NAN), Duration::ZERO);
    }

    #[test]
    fn test_interval_is_reported() {
        assert_eq!(RateLimiter::new(INTERVAL).interval(), INTERVAL);
        assert_eq!(RateLimiter::new(Duration::ZERO).interval(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_first_wait_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(5));
        let token = CancellationToken::new();
        let start = Instant::now();
        limiter.wait(&token).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_successive_waits_are_spaced() {
        let limiter = RateLimiter::new(INTERVAL);
        let token = CancellationToken::new();

        limiter.wait(&token).await.unwrap();
        let first = Instant::now();
        limiter.wait(&token).await.unwrap();
        let second = Instant::now();
        limiter.wait(&token).await.unwrap();
        let third = Instant::now();

        assert!(second - first + SLACK >= INTERVAL);
        assert!(third - second + SLACK >= INTERVAL);
    }

    #[tokio::test]
    async fn test_no_wait_when_interval_already_elapsed() {
        let limiter = RateLimiter::new(INTERVAL);
        let token = CancellationToken::new();

        limiter.wait(&token).await.unwrap();
        tokio::time::sleep(INTERVAL * 3).await;
        let before = Instant::now();
        limiter.wait(&token).await.unwrap();
        assert!(before.elapsed() < INTERVAL / 2);
    }

    #[tokio::test]
    async fn test_zero_interval_never_waits() {
        let limiter = RateLimiter::new(Duration::ZERO);
        let token = CancellationToken::new();
        let start = Instant::now();
        for _ in 0..100 {
            limiter.wait(&token).await.unwrap();
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_pre_cancelled_token_rejected() {
        let limiter = RateLimiter::new(Duration::ZERO);
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(limiter.wait(&token).await, Err(Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_during_wait_returns_promptly() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(60)));
        let token = CancellationToken::new();
        limiter.wait(&token).await.unwrap();

        let waiter = {
            let limiter = limiter.clone();
            let token = token.clone();
            tokio::spawn(async move { limiter.wait(&token).await })
        };

        tokio::time::sleep(INTERVAL).await;
        assert!(!waiter.is_finished());
        let cancelled_at = Instant::now();
        token.cancel();

        assert_eq!(waiter.await.unwrap(), Err(Cancelled));
        assert!(cancelled_at.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_cancelled_wait_does_not_consume_a_permit() {
        let limiter = Arc::new(RateLimiter::new(INTERVAL * 4));
        let live = CancellationToken::new();
        limiter.wait(&live).await.unwrap();
        let released = Instant::now();

        // Abandoned while the quota is still exhausted
        let dead = CancellationToken::new();
        let abandoned = {
            let limiter = limiter.clone();
            let dead = dead.clone();
            tokio::spawn(async move { limiter.wait(&dead).await })
        };
        tokio::time::sleep(INTERVAL).await;
        dead.cancel();
        assert_eq!(abandoned.await.unwrap(), Err(Cancelled));

        limiter.wait(&live).await.unwrap();
        let waited = released.elapsed();
        assert!(waited + SLACK >= INTERVAL * 4);
        assert!(waited < INTERVAL * 7);
    }
}
