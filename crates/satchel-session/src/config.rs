//! Configuration for the session manager.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// Default session lifetime (30 minutes).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(30 * 60);

/// Default capacity of the store mirror queue.
pub const DEFAULT_MIRROR_CAPACITY: usize = 1024;

/// Default number of store mirror workers.
pub const DEFAULT_MIRROR_WORKERS: usize = 4;

/// Process-wide session options.
///
/// Set once when the [`SessionManager`](crate::SessionManager) is built and
/// read-only afterwards.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Session lifetime. Every save pushes expiry to `now + max_age`.
    pub max_age: Duration,

    /// Mark session cookies `Secure`.
    pub secure: bool,

    /// Mark session cookies `HttpOnly`.
    pub http_only: bool,

    /// How often the sweeper evicts expired sessions.
    /// `None` ties the interval to `max_age`.
    pub sweep_interval: Option<Duration>,

    /// Bounded capacity of the store mirror queue.
    /// Enqueueing waits when the queue is full.
    pub mirror_capacity: usize,

    /// Number of workers draining the store mirror queue.
    pub mirror_workers: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_MAX_AGE,
            secure: false,
            http_only: true,
            sweep_interval: None,
            mirror_capacity: DEFAULT_MIRROR_CAPACITY,
            mirror_workers: DEFAULT_MIRROR_WORKERS,
        }
    }
}

impl SessionOptions {
    /// Create options with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the session lifetime.
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Set the `Secure` cookie attribute.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Set the `HttpOnly` cookie attribute.
    pub fn with_http_only(mut self, http_only: bool) -> Self {
        self.http_only = http_only;
        self
    }

    /// Sweep on a fixed interval instead of once per `max_age`.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Set the mirror queue capacity.
    pub fn with_mirror_capacity(mut self, capacity: usize) -> Self {
        self.mirror_capacity = capacity;
        self
    }

    /// Set the number of mirror workers.
    pub fn with_mirror_workers(mut self, workers: usize) -> Self {
        self.mirror_workers = workers;
        self
    }

    /// Session lifetime, falling back to the default when zero.
    pub fn effective_max_age(&self) -> Duration {
        if self.max_age.is_zero() {
            DEFAULT_MAX_AGE
        } else {
            self.max_age
        }
    }

    /// Interval between sweeper passes.
    pub fn effective_sweep_interval(&self) -> Duration {
        match self.sweep_interval {
            Some(interval) if !interval.is_zero() => interval,
            _ => self.effective_max_age(),
        }
    }
}

/// Absolute expiry for something created at `now` living for `ttl`.
///
/// Saturates at the maximum representable timestamp.
pub fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(ttl)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
