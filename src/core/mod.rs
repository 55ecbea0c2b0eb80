//! Core functionality for the request inspection service.
//!
//! This module contains the core components of the service:
//! pattern classification, violation tracking, rate limiting,
//! alerting, and the request-handling middleware built on them.

pub mod admission;
pub mod alerts;
pub mod inspector;
pub mod patterns;
pub mod rate_limiter;
pub mod tracker;

pub use admission::RateLimitGuard;
pub use alerts::{
    AlertDispatcher, AlertError, EmailApiTransport, NoopTransport, NotificationTransport,
    SecurityAlert, Severity,
};
pub use inspector::RequestInspector;
pub use patterns::{PatternCatalog, PatternError, PatternRules, RuleCategory, Violation};
pub use rate_limiter::{
    CounterStore, MemoryCounterStore, RateLimitError, RateLimiter, RedisCounterStore,
    RouteCategory,
};
pub use tracker::{TrackerStats, ViolationTracker};
