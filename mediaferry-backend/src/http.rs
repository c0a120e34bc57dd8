//! Shared HTTP client construction and rate limiting for remote services

use crate::error::ServiceError;
use governor::clock::DefaultClock;
use governor::state::{direct::NotKeyed, InMemoryState};
use governor::{Quota, RateLimiter as GovernorLimiter};
use reqwest::{Client, Response};
use std::num::NonZeroU32;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::warn;

/// User agent sent with every outbound request
pub fn user_agent() -> String {
    format!("MediaFerry/{}", env!("CARGO_PKG_VERSION"))
}

/// Build a client with the standard user agent and timeouts
pub fn build_client(timeout: Duration) -> Result<Client, ServiceError> {
    Client::builder()
        .user_agent(user_agent())
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(5))
        .build()
        .map_err(|e| ServiceError::Network(format!("Failed to build HTTP client: {}", e)))
}

/// Turn a non-success response into [`ServiceError::Api`]
pub async fn check_status(response: Response) -> Result<Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(ServiceError::RateLimited);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::Api {
        status: status.as_u16(),
        body,
    })
}

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// One governor quota of a [`RateLimiter`]
struct Window {
    limiter: DirectLimiter,
    period: Duration,
    /// Paced windows make callers wait; budget windows reject
    paced: bool,
}

/// One or more quotas that must all allow a request
///
/// Remote APIs usually combine a request budget over a long window with a
/// pacing limit (for example 60 per minute and 1 per second). Budget
/// windows reject with [`ServiceError::RateLimited`] when exhausted; paced
/// windows only delay the call. After the remote reports a rate limit the
/// whole limiter stays closed for `cooldown`.
pub struct RateLimiter {
    windows: Vec<Window>,
    cooldown: Duration,
    blocked_until: Mutex<Option<Instant>>,
}

fn non_zero(n: u32) -> NonZeroU32 {
    NonZeroU32::new(n).unwrap_or(NonZeroU32::MIN)
}

fn governor(calls: u32, period: Duration) -> DirectLimiter {
    let calls = non_zero(calls);
    let replenish = period / calls.get();
    let quota = Quota::with_period(replenish)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
        .allow_burst(calls);
    GovernorLimiter::direct(quota)
}

impl RateLimiter {
    /// Budget of `calls` requests per `period`
    pub fn new(calls: u32, period: Duration) -> Self {
        Self {
            windows: Vec::new(),
            cooldown: period,
            blocked_until: Mutex::new(None),
        }
        .and(calls, period)
    }

    pub fn per_second(calls: u32) -> Self {
        Self::new(calls, Duration::from_secs(1))
    }

    /// Add another budget of `calls` per `period`
    pub fn and(self, calls: u32, period: Duration) -> Self {
        self.window(calls, period, false)
    }

    /// Space requests to at most `calls` per `period`, waiting instead of failing
    pub fn paced(self, calls: u32, period: Duration) -> Self {
        self.window(calls, period, true)
    }

    fn window(mut self, calls: u32, period: Duration, paced: bool) -> Self {
        self.windows.push(Window {
            limiter: governor(calls, period),
            period,
            paced,
        });
        // Paced windows first, then budgets from the shortest period up, so
        // a rejection by a later window never spends a long budget
        self.windows.sort_by_key(|w| (!w.paced, w.period));
        self.cooldown = self.cooldown.max(period);
        self
    }

    fn blocked_for(&self) -> Option<Duration> {
        let guard = self.blocked_until.lock().ok()?;
        let until = (*guard)?;
        until.checked_duration_since(Instant::now())
    }

    /// Wait until every window has a permit
    pub async fn acquire(&self) {
        if let Some(wait) = self.blocked_for() {
            tokio::time::sleep(wait).await;
        }
        for window in &self.windows {
            window.limiter.until_ready().await;
        }
    }

    /// Wait on paced windows, fail if a budget is exhausted
    pub async fn try_acquire(&self) -> Result<(), ServiceError> {
        if self.blocked_for().is_some() {
            return Err(ServiceError::RateLimited);
        }
        for window in &self.windows {
            if window.paced {
                window.limiter.until_ready().await;
            } else {
                window.limiter.check().map_err(|_| ServiceError::RateLimited)?;
            }
        }
        Ok(())
    }

    /// Close the limiter for its longest period
    pub fn limit_hit(&self) {
        warn!(cooldown_secs = self.cooldown.as_secs(), "Remote rate limit hit");
        if let Ok(mut guard) = self.blocked_until.lock() {
            *guard = Some(Instant::now() + self.cooldown);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_burst_then_rejected() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.try_acquire().await.is_ok());
        assert!(limiter.try_acquire().await.is_ok());
        assert!(matches!(limiter.try_acquire().await, Err(ServiceError::RateLimited)));
    }

    #[tokio::test]
    async fn test_paced_window_waits_instead_of_failing() {
        let limiter = RateLimiter::new(60, Duration::from_secs(60)).paced(1, Duration::from_millis(50));
        assert!(limiter.try_acquire().await.is_ok());
        let start = Instant::now();
        assert!(limiter.try_acquire().await.is_ok());
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn test_rejected_call_keeps_long_budget() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60)).and(1, Duration::from_millis(50));
        assert!(limiter.try_acquire().await.is_ok());
        // Rejected by the short window; the minute budget must stay at one
        assert!(limiter.try_acquire().await.is_err());
        assert!(limiter.try_acquire().await.is_err());
        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(limiter.try_acquire().await.is_ok());
        tokio::time::sleep(Duration::from_millis(70)).await;
        assert!(matches!(limiter.try_acquire().await, Err(ServiceError::RateLimited)));
    }

    #[tokio::test]
    async fn test_limit_hit_blocks() {
        let limiter = RateLimiter::per_second(10);
        limiter.limit_hit();
        assert!(matches!(limiter.try_acquire().await, Err(ServiceError::RateLimited)));
    }

    #[tokio::test]
    async fn test_acquire_waits_for_replenish() {
        let limiter = RateLimiter::new(1, Duration::from_millis(50));
        limiter.acquire().await;
        let start = Instant::now();
        limiter.acquire().await;
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_user_agent_has_version() {
        assert!(user_agent().starts_with("MediaFerry/"));
    }
}
