//! Shared back-off state for the accrual service.
//!
//! A single "resume at" instant shared by every worker. A `429` pushes it forward; every
//! worker checks it before each request and sleeps until it passes.

use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Pool-wide pause driven by `Retry-After`.
#[derive(Debug, Default)]
pub struct RateLimitGate {
    resume_at: RwLock<Option<Instant>>,
}

impl RateLimitGate {
    /// Longest pause a single `429` can impose.
    pub const MAX_PAUSE: Duration = Duration::from_secs(24 * 60 * 60);

    pub fn new() -> Self {
        Self::default()
    }

    /// Suspend requests for at least `duration` from now.
    ///
    /// `duration` is capped at [`MAX_PAUSE`](Self::MAX_PAUSE). An existing pause that ends
    /// later is kept. Returns the effective resume instant.
    pub async fn pause_for(&self, duration: Duration) -> Instant {
        let now = Instant::now();
        let until = now
            .checked_add(duration.min(Self::MAX_PAUSE))
            .unwrap_or(now);
        let mut resume_at = self.resume_at.write().await;
        let effective = match *resume_at {
            Some(existing) if existing > until => existing,
            _ => until,
        };
        *resume_at = Some(effective);
        effective
    }

    /// The instant requests may resume, if a pause is still active.
    pub async fn resume_at(&self) -> Option<Instant> {
        let resume_at = *self.resume_at.read().await;
        let now = Instant::now();
        resume_at.filter(|until| *until > now)
    }

    /// Whether requests are currently suspended.
    pub async fn is_paused(&self) -> bool {
        self.resume_at().await.is_some()
    }

    /// Wait until requests are allowed.
    ///
    /// Returns `false` if `shutdown` fires while a pause is active, `true` once requests may
    /// be sent. A pause extended during the wait is honoured.
    pub async fn wait_ready(&self, shutdown: &CancellationToken) -> bool {
        while let Some(until) = self.resume_at().await {
            tokio::select! {
                _ = shutdown.cancelled() => return false,
                _ = tokio::time::sleep_until(until) => {}
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_not_paused_initially() {
        let gate = RateLimitGate::new();
        assert!(!gate.is_paused().await);
        assert!(gate.wait_ready(&CancellationToken::new()).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_ready_sleeps_until_resume() {
        let gate = RateLimitGate::new();
        let start = Instant::now();

        gate.pause_for(Duration::from_secs(60)).await;
        assert!(gate.is_paused().await);

        assert!(gate.wait_ready(&CancellationToken::new()).await);
        assert!(start.elapsed() >= Duration::from_secs(60));
        assert!(!gate.is_paused().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shorter_pause_does_not_shorten() {
        let gate = RateLimitGate::new();
        let long = gate.pause_for(Duration::from_secs(60)).await;
        let effective = gate.pause_for(Duration::from_secs(5)).await;
        assert_eq!(effective, long);
    }

    #[tokio::test(start_paused = true)]
    async fn test_longer_pause_extends() {
        let gate = RateLimitGate::new();
        let start = Instant::now();
        gate.pause_for(Duration::from_secs(5)).await;
        let effective = gate.pause_for(Duration::from_secs(30)).await;
        assert_eq!(effective, start + Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_extended_while_waiting() {
        let gate = std::sync::Arc::new(RateLimitGate::new());
        let start = Instant::now();
        gate.pause_for(Duration::from_secs(10)).await;

        let extender = std::sync::Arc::clone(&gate);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            extender.pause_for(Duration::from_secs(20)).await;
        });

        assert!(gate.wait_ready(&CancellationToken::new()).await);
        assert!(start.elapsed() >= Duration::from_secs(25));
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_pause_is_capped() {
        let gate = RateLimitGate::new();
        let start = Instant::now();

        let effective = gate.pause_for(Duration::from_secs(u64::MAX)).await;
        assert_eq!(effective, start + RateLimitGate::MAX_PAUSE);
        assert!(gate.is_paused().await);

        let effective = gate.pause_for(Duration::MAX).await;
        assert_eq!(effective, start + RateLimitGate::MAX_PAUSE);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_ready_aborts_on_shutdown() {
        let gate = RateLimitGate::new();
        gate.pause_for(Duration::from_secs(60)).await;

        let shutdown = CancellationToken::new();
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        assert!(!gate.wait_ready(&shutdown).await);
        assert!(start.elapsed() < Duration::from_secs(60));
    }
}
