//! Per-service call budgets for the free-tier APIs.
//!
//! Each service gets a fixed window (e.g. 5 calls per minute for Polygon).
//! Callers take a [`Permit`] before a request and `commit` it after a
//! successful one. A permit dropped without commit hands its slot back, so
//! failed requests never eat into the budget.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Service {
    Polygon,
    CoinGecko,
    CryptoCompare,
    Alternative,
}

impl Service {
    pub const ALL: [Service; 4] = [
        Service::Polygon,
        Service::CoinGecko,
        Service::CryptoCompare,
        Service::Alternative,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Polygon => "polygon",
            Service::CoinGecko => "coingecko",
            Service::CryptoCompare => "cryptocompare",
            Service::Alternative => "alternative",
        }
    }

    /// Free-tier budget as (max calls, window)
    pub fn default_budget(&self) -> (u32, Duration) {
        match self {
            Service::Polygon => (5, Duration::from_secs(60)),
            Service::CoinGecko => (10, Duration::from_secs(60)),
            Service::CryptoCompare => (100, Duration::from_secs(86_400)),
            Service::Alternative => (30, Duration::from_secs(60)),
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed-window counter
#[derive(Debug)]
struct WindowCounter {
    calls: u32,
    max_calls: u32,
    window: Duration,
    window_start: Instant,
}

impl WindowCounter {
    fn new(max_calls: u32, window: Duration) -> Self {
        Self {
            calls: 0,
            max_calls,
            window,
            window_start: Instant::now(),
        }
    }

    fn roll(&mut self) {
        let now = Instant::now();
        if now.duration_since(self.window_start) >= self.window {
            self.calls = 0;
            self.window_start = now;
        }
    }

    /// Take a slot, returning the window it belongs to
    fn try_reserve(&mut self) -> Option<Instant> {
        self.roll();
        if self.calls < self.max_calls {
            self.calls += 1;
            Some(self.window_start)
        } else {
            None
        }
    }

    /// Give a slot back, unless its window has already rolled over
    fn release(&mut self, window_start: Instant) {
        if self.window_start == window_start {
            self.calls = self.calls.saturating_sub(1);
        }
    }

    fn reset(&mut self) {
        self.calls = 0;
        self.window_start = Instant::now();
    }
}

/// Budget state reported by health checks
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStatus {
    pub service: Service,
    pub calls: u32,
    pub max: u32,
    pub window_secs: u64,
}

/// Rate limits for every external service
#[derive(Debug)]
pub struct RateLimits {
    counters: Mutex<HashMap<Service, WindowCounter>>,
}

impl RateLimits {
    pub fn new() -> Self {
        let counters = Service::ALL
            .iter()
            .map(|service| {
                let (max, window) = service.default_budget();
                (*service, WindowCounter::new(max, window))
            })
            .collect();

        Self {
            counters: Mutex::new(counters),
        }
    }

    /// Override the budget for one service
    pub fn with_budget(self, service: Service, max_calls: u32, window: Duration) -> Self {
        if let Ok(mut counters) = self.counters.lock() {
            counters.insert(service, WindowCounter::new(max_calls, window));
        }
        self
    }

    /// Reserve one call to `service`, or None when the window is spent.
    /// The check and the reservation happen under one lock.
    pub fn try_acquire(&self, service: Service) -> Option<Permit<'_>> {
        let mut counters = self.counters.lock().ok()?;
        let window_start = counters.get_mut(&service)?.try_reserve()?;
        Some(Permit {
            limits: self,
            service,
            window_start,
            committed: false,
        })
    }

    fn release(&self, service: Service, window_start: Instant) {
        if let Ok(mut counters) = self.counters.lock() {
            if let Some(counter) = counters.get_mut(&service) {
                counter.release(window_start);
            }
        }
    }

    pub fn reset_all(&self) {
        if let Ok(mut counters) = self.counters.lock() {
            for counter in counters.values_mut() {
                counter.reset();
            }
        }
        tracing::info!("Rate limits reset");
    }

    pub fn snapshot(&self) -> Vec<RateLimitStatus> {
        let Ok(mut counters) = self.counters.lock() else {
            return Vec::new();
        };

        let mut statuses: Vec<RateLimitStatus> = counters
            .iter_mut()
            .map(|(service, counter)| {
                counter.roll();
                RateLimitStatus {
                    service: *service,
                    calls: counter.calls,
                    max: counter.max_calls,
                    window_secs: counter.window.as_secs(),
                }
            })
            .collect();
        statuses.sort_by_key(|s| s.service);
        statuses
    }
}

/// A reserved call. Dropping it without `commit` frees the slot.
#[must_use = "an unused permit releases its slot immediately"]
#[derive(Debug)]
pub struct Permit<'a> {
    limits: &'a RateLimits,
    service: Service,
    window_start: Instant,
    committed: bool,
}

impl Permit<'_> {
    /// Keep the slot; call once the request succeeded
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.limits.release(self.service, self.window_start);
        }
    }
}

impl Default for RateLimits {
    fn default() -> Self {
        Self::new()
    }
}
