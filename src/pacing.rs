//! Outbound call pacing.
//!
//! One [`PacingController`] exists per provider (plus one for the batch loop)
//! and is shared by every worker, so the aggregate request rate towards a
//! vendor is bounded no matter how many contacts run concurrently.

use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::errors::ProviderFailure;

/// Default cooldown after a provider-reported rate limit.
pub const DEFAULT_RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(5);

#[derive(Debug)]
pub struct PacingController {
    channel: String,
    inter_call_delay: Duration,
    cooldown: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl PacingController {
    pub fn new(channel: impl Into<String>, inter_call_delay: Duration, cooldown: Duration) -> Self {
        Self {
            channel: channel.into(),
            inter_call_delay,
            cooldown,
            last_call: Mutex::new(None),
        }
    }

    /// Waits until `inter_call_delay` has elapsed since the previous call on
    /// this channel, then claims the slot.
    ///
    /// The lock is held while sleeping so concurrent callers queue up behind
    /// each other instead of all firing once the delay elapses.
    pub async fn wait_turn(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(previous) = *last_call {
            let elapsed = previous.elapsed();
            if elapsed < self.inter_call_delay {
                tokio::time::sleep(self.inter_call_delay - elapsed).await;
            }
        }
        *last_call = Some(Instant::now());
    }

    /// Runs `op` with pacing applied.
    ///
    /// A `RateLimited` result triggers one cooldown and exactly one retry; a
    /// second consecutive rate limit is handed back to the caller unchanged.
    pub async fn execute<T, F, Fut>(&self, mut op: F) -> Result<T, ProviderFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderFailure>>,
    {
        self.wait_turn().await;
        match op().await {
            Err(ProviderFailure::RateLimited(msg)) => {
                tracing::warn!(
                    "{}: rate limited ({}), cooling down for {:?} before retrying",
                    self.channel,
                    msg,
                    self.cooldown
                );
                tokio::time::sleep(self.cooldown).await;
                self.wait_turn().await;
                op().await
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_first_call_does_not_wait() {
        let pacer = PacingController::new("test", Duration::from_secs(10), Duration::ZERO);
        let started = Instant::now();
        pacer.wait_turn().await;
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_consecutive_calls_are_spaced() {
        let pacer = PacingController::new("test", Duration::from_millis(60), Duration::ZERO);
        let started = Instant::now();
        pacer.wait_turn().await;
        pacer.wait_turn().await;
        pacer.wait_turn().await;
        assert!(started.elapsed() >= Duration::from_millis(120));
    }

    #[tokio::test]
    async fn test_shared_controller_spaces_concurrent_callers() {
        let pacer = Arc::new(PacingController::new(
            "shared",
            Duration::from_millis(50),
            Duration::ZERO,
        ));
        let started = Instant::now();
        let mut handles = Vec::new();
        for _ in 0..4 {
            let pacer = pacer.clone();
            handles.push(tokio::spawn(async move { pacer.wait_turn().await }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried_once() {
        let pacer = PacingController::new("test", Duration::ZERO, Duration::from_millis(20));
        let attempts = AtomicUsize::new(0);

        let result = pacer
            .execute(|| {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(ProviderFailure::RateLimited("429".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(1));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_rate_limit_is_returned() {
        let pacer = PacingController::new("test", Duration::ZERO, Duration::from_millis(10));
        let attempts = AtomicUsize::new(0);

        let result: Result<(), _> = pacer
            .execute(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderFailure::RateLimited("429".into())) }
            })
            .await;

        assert!(matches!(result, Err(ProviderFailure::RateLimited(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_other_failures_are_not_retried() {
        let pacer = PacingController::new("test", Duration::ZERO, Duration::from_millis(10));
        let attempts = AtomicUsize::new(0);

        let result: Result<(), _> = pacer
            .execute(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(ProviderFailure::Transport("timeout".into())) }
            })
            .await;

        assert!(matches!(result, Err(ProviderFailure::Transport(_))));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
