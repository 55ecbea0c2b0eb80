//! Rate limiting for the request inspection service.
//!
//! This module provides fixed-window admission control keyed by client
//! and route category. Counter storage is pluggable: an in-process map
//! for single-instance deployments, or Redis for horizontally scaled
//! ones.

use crate::models::{RateLimitConfig, RouteQuota};
use crate::utils::{format_counter_key, get_current_timestamp, window_start};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors that can occur during rate limiting operations
#[derive(Error, Debug)]
pub enum RateLimitError {
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),
    #[error("Rate limit exceeded")]
    ExceededLimit,
}

/// Route category a request is admitted under. Quotas are configured
/// per category, so one client hammering login does not consume the
/// quota of its ordinary API traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteCategory {
    Login,
    PasswordReset,
    Register,
    TokenRefresh,
    AdminBulk,
    Admin,
    Upload,
    Health,
    Default,
}

impl RouteCategory {
    /// Derive the category from a lower-cased request path
    pub fn from_path(path: &str) -> Self {
        if path.contains("/auth/login") {
            RouteCategory::Login
        } else if path.contains("/auth/password-reset") || path.contains("/auth/change-password") {
            RouteCategory::PasswordReset
        } else if path.contains("/auth/register") {
            RouteCategory::Register
        } else if path.contains("/auth/refresh") {
            RouteCategory::TokenRefresh
        } else if path.contains("/admin/") && path.contains("/bulk") {
            RouteCategory::AdminBulk
        } else if path.contains("/admin") {
            RouteCategory::Admin
        } else if path.contains("/upload") {
            RouteCategory::Upload
        } else if path == "/health" || path == "/" {
            RouteCategory::Health
        } else {
            RouteCategory::Default
        }
    }

    /// Configuration key for this category
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteCategory::Login => "login",
            RouteCategory::PasswordReset => "password_reset",
            RouteCategory::Register => "register",
            RouteCategory::TokenRefresh => "token_refresh",
            RouteCategory::AdminBulk => "admin_bulk",
            RouteCategory::Admin => "admin",
            RouteCategory::Upload => "upload",
            RouteCategory::Health => "health",
            RouteCategory::Default => "default",
        }
    }
}

/// Atomic increment-and-get counter storage for fixed windows
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment the counter for (client, category) in the fixed window
    /// of `window_seconds` containing now, returning the new count.
    async fn incr(
        &self,
        client: &str,
        category: &str,
        window_seconds: u64,
    ) -> Result<u64, RateLimitError>;

    /// Drop counters whose window has ended. Backends with native
    /// expiry can leave this as the default no-op.
    async fn sweep(&self) {}
}

/// In-process counter store for single-instance deployments
pub struct MemoryCounterStore {
    /// (client, category, window length) -> (window start, count)
    counters: Mutex<HashMap<String, (u64, u64)>>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) async fn incr_at(
        &self,
        client: &str,
        category: &str,
        window_seconds: u64,
        now: u64,
    ) -> u64 {
        let start = window_start(now, window_seconds);
        let key = format!("{}:{}:{}", category, client, window_seconds);
        let mut counters = self.counters.lock().await;

        let entry = counters.entry(key).or_insert((start, 0));
        if entry.0 != start {
            // Window rolled over; the counter resets.
            *entry = (start, 0);
        }
        entry.1 += 1;
        entry.1
    }

    pub(crate) async fn sweep_at(&self, now: u64) {
        let mut counters = self.counters.lock().await;
        counters.retain(|key, (start, _)| {
            let window_seconds = key
                .rsplit(':')
                .next()
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(0);
            *start + window_seconds > now
        });
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn incr(
        &self,
        client: &str,
        category: &str,
        window_seconds: u64,
    ) -> Result<u64, RateLimitError> {
        Ok(self
            .incr_at(client, category, window_seconds, get_current_timestamp())
            .await)
    }

    async fn sweep(&self) {
        self.sweep_at(get_current_timestamp()).await;
    }
}

/// Redis-backed counter store for horizontally scaled deployments.
/// Counters live under window-stamped keys and expire on their own.
pub struct RedisCounterStore {
    redis: redis::Client,
}

impl RedisCounterStore {
    pub fn new(redis: redis::Client) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn incr(
        &self,
        client: &str,
        category: &str,
        window_seconds: u64,
    ) -> Result<u64, RateLimitError> {
        let now = get_current_timestamp();
        let key = format_counter_key(category, client, window_seconds, window_start(now, window_seconds));
        let mut conn = self.redis.get_async_connection().await?;

        let count: u64 = conn.incr(&key, 1).await?;
        if count == 1 {
            let _: () = conn.expire(&key, (window_seconds * 2) as usize).await?;
        }

        Ok(count)
    }
}

/// Fixed-window rate limiter keyed by (client, route category).
///
/// Window boundaries are discrete, so a client can burst across a
/// boundary; that is the accepted tradeoff versus a sliding window.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Create a new rate limiter over a counter store
    pub fn new(store: Arc<dyn CounterStore>, config: RateLimitConfig) -> Self {
        Self { store, config }
    }

    fn quota_for(&self, category: RouteCategory) -> RouteQuota {
        self.config
            .routes
            .get(category.as_str())
            .cloned()
            .unwrap_or_else(|| self.config.default_quota.clone())
    }

    /// Check whether a request should be admitted.
    ///
    /// # Returns
    ///
    /// * `Ok(())` if the request is within both the per-minute and the
    ///   per-hour quota for its category
    /// * `Err(RateLimitError::ExceededLimit)` if either quota is exhausted
    /// * `Err(RateLimitError::RedisError)` if the counter store failed
    pub async fn check(&self, client: &str, category: RouteCategory) -> Result<(), RateLimitError> {
        let quota = self.quota_for(category);

        let minute = self.store.incr(client, category.as_str(), 60).await?;
        if minute > quota.per_minute as u64 {
            return Err(RateLimitError::ExceededLimit);
        }

        let hour = self.store.incr(client, category.as_str(), 3600).await?;
        if hour > quota.per_hour as u64 {
            return Err(RateLimitError::ExceededLimit);
        }

        Ok(())
    }

    /// Housekeeping passthrough to the counter store
    pub async fn sweep(&self) {
        self.store.sweep().await;
    }
}
