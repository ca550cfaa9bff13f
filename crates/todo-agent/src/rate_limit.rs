//! Sliding-window gate for outbound model requests.
//!
//! At most `capacity` calls are released in any trailing `window`. Callers
//! that arrive when the window is full wait until its oldest entry expires.
//! Waiters queue on an async mutex, so they are released in arrival order.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

/// Requests per minute allowed by the upstream provider's free tier.
pub const DEFAULT_REQUESTS_PER_MINUTE: usize = 15;

const MINUTE: Duration = Duration::from_secs(60);

/// Time source for the limiter.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by tokio timers.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Simulated clock: time only moves through `sleep` or `advance`, and every
/// sleep is recorded.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    state: Arc<Mutex<ManualState>>,
}

#[derive(Debug, Default)]
struct ManualState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Arc::default(),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut state) = self.state.lock() {
            state.elapsed += by;
        }
    }

    /// Time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.state.lock().map(|s| s.elapsed).unwrap_or_default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.state
            .lock()
            .map(|s| s.sleeps.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        if let Ok(mut state) = self.state.lock() {
            state.elapsed += duration;
            state.sleeps.push(duration);
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("rate limit capacity must be at least 1")]
    ZeroCapacity,
}

/// Sliding-window rate limiter shared by every dispatch.
pub struct RateLimiter {
    capacity: usize,
    window: Duration,
    clock: Arc<dyn Clock>,
    releases: AsyncMutex<VecDeque<Instant>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("capacity", &self.capacity)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    pub fn new(
        capacity: usize,
        window: Duration,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RateLimitError> {
        if capacity == 0 {
            return Err(RateLimitError::ZeroCapacity);
        }
        Ok(Self {
            capacity,
            window,
            clock,
            releases: AsyncMutex::new(VecDeque::with_capacity(capacity)),
        })
    }

    /// `capacity` calls per rolling minute on the wall clock.
    pub fn per_minute(capacity: usize) -> Result<Self, RateLimitError> {
        Self::new(capacity, MINUTE, Arc::new(TokioClock))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of releases currently remembered by the window.
    pub async fn recorded(&self) -> usize {
        self.releases.lock().await.len()
    }

    /// Wait until a call may go out, then record it.
    pub async fn acquire(&self) {
        let mut releases = self.releases.lock().await;
        let now = self.clock.now();
        while let Some(&oldest) = releases.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                releases.pop_front();
            } else {
                break;
            }
        }

        if releases.len() >= self.capacity {
            if let Some(&oldest) = releases.front() {
                let age = now.saturating_duration_since(oldest);
                let wait = self.window.saturating_sub(age);
                if !wait.is_zero() {
                    debug!(
                        wait_ms = wait.as_millis() as u64,
                        capacity = self.capacity,
                        "rate limit window full, waiting"
                    );
                    self.clock.sleep(wait).await;
                }
            }
            releases.pop_front();
        }

        releases.push_back(self.clock.now());
    }
}
