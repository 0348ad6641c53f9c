//! Sliding-window rate limiting for outbound fetches.
//!
//! `RateLimitedClient` wraps any `FetchClient` and blocks the calling thread
//! until a call slot is free. The reconciler never sees the limiter.

use super::provider::{FetchClient, TransportError};
use crate::domain::Bar;
use chrono::NaiveDate;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// At most `max_calls` calls in any `period`.
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    period: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_calls: usize, period: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            period,
            calls: Mutex::new(VecDeque::with_capacity(max_calls)),
        }
    }

    /// Block until a call is permitted, then record it.
    ///
    /// Returns how long the caller waited.
    pub fn acquire(&self) -> Duration {
        let mut calls = self.calls.lock().unwrap_or_else(|p| p.into_inner());
        let now = Instant::now();
        while calls
            .front()
            .is_some_and(|&t| now.duration_since(t) >= self.period)
        {
            calls.pop_front();
        }

        let mut waited = Duration::ZERO;
        if calls.len() >= self.max_calls {
            if let Some(&oldest) = calls.front() {
                waited = self.period.saturating_sub(now.duration_since(oldest));
                std::thread::sleep(waited);
                calls.pop_front();
            }
        }

        calls.push_back(Instant::now());
        waited
    }

    /// Calls recorded inside the current window.
    pub fn in_flight(&self) -> usize {
        let calls = self.calls.lock().unwrap_or_else(|p| p.into_inner());
        let now = Instant::now();
        calls
            .iter()
            .filter(|&&t| now.duration_since(t) < self.period)
            .count()
    }
}

/// FetchClient decorator that applies a `RateLimiter` before each call.
pub struct RateLimitedClient<C> {
    inner: C,
    limiter: RateLimiter,
}

impl<C: FetchClient> RateLimitedClient<C> {
    pub fn new(inner: C, limiter: RateLimiter) -> Self {
        Self { inner, limiter }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: FetchClient> FetchClient for RateLimitedClient<C> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn fetch(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, TransportError> {
        let waited = self.limiter.acquire();
        if !waited.is_zero() {
            tracing::debug!(
                client = self.inner.name(),
                waited_ms = waited.as_millis() as u64,
                "rate limit delayed fetch"
            );
        }
        self.inner.fetch(symbol, start, end)
    }
}
