//! Request Inspection Service
//!
//! Inline request inspection and adaptive blocking for web APIs:
//! a pattern-based classifier over paths, query strings and user
//! agents, a per-client sliding-window violation tracker with
//! auto-expiring blocks, fixed-window rate limiting, and throttled
//! operator alerting.

pub mod api;
pub mod config;
pub mod core;
pub mod models;
pub mod utils;
