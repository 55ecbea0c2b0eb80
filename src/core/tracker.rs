//! Violation tracking and IP blocking for the request inspection service.
//!
//! This module keeps a per-client sliding window of recent violations
//! and derives temporary blocks from it. Blocks expire on their own;
//! permanent blocks are administrative and never expire.

use crate::models::InspectionConfig;
use chrono::{DateTime, Duration, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

/// Snapshot of the current blocking state, recomputed at call time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerStats {
    /// Number of active temporary blocks
    pub currently_blocked: usize,
    /// Active temporary blocks: IP -> ISO-8601 unblock instant
    pub blocked_ips: HashMap<String, String>,
    /// Permanently blocked IPs
    pub permanent_blocks: Vec<String>,
    /// Number of IPs with at least one recorded violation
    pub tracked_ips: usize,
}

#[derive(Default)]
struct TrackerState {
    /// IP -> violation timestamps, pruned to the tracking window on use
    violations: HashMap<String, Vec<DateTime<Utc>>>,
    /// IP -> unblock instant
    blocked: HashMap<String, DateTime<Utc>>,
    /// Append-only permanent block set
    permanent: HashSet<String>,
}

/// Per-client sliding-window violation ledger and block state machine.
///
/// All mutation goes through one async lock, so every operation for a
/// given client is serialized. Cross-client ordering is not provided.
pub struct ViolationTracker {
    block_threshold: usize,
    block_duration: Duration,
    track_window: Duration,
    state: Mutex<TrackerState>,
}

impl ViolationTracker {
    /// Create a new tracker from the inspection configuration
    pub fn new(config: &InspectionConfig) -> Self {
        Self {
            block_threshold: config.block_threshold as usize,
            block_duration: Duration::minutes(config.block_duration_minutes),
            track_window: Duration::minutes(config.track_window_minutes),
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// Record a violation for an IP.
    ///
    /// Violations older than the tracking window are discarded before
    /// counting. Returns true if the in-window count has reached the
    /// block threshold; the block expiry is (re)set to now plus the
    /// block duration on every threshold hit, so violations while
    /// blocked extend the block.
    pub async fn record_violation(&self, ip: &str, label: &str) -> bool {
        self.record_violation_at(ip, label, Utc::now()).await
    }

    pub(crate) async fn record_violation_at(
        &self,
        ip: &str,
        label: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        let cutoff = now - self.track_window;
        let timestamps = state.violations.entry(ip.to_string()).or_default();
        timestamps.retain(|t| *t > cutoff);
        timestamps.push(now);
        let in_window = timestamps.len();

        if in_window >= self.block_threshold {
            state.blocked.insert(ip.to_string(), now + self.block_duration);
            warn!(
                "IP BLOCKED: {} - {} violations within {}s window (rule: {})",
                ip,
                in_window,
                self.track_window.num_seconds(),
                label
            );
            return true;
        }

        false
    }

    /// Check whether an IP is currently blocked. An expired temporary
    /// block is evicted lazily here.
    pub async fn is_blocked(&self, ip: &str) -> bool {
        self.is_blocked_at(ip, Utc::now()).await
    }

    pub(crate) async fn is_blocked_at(&self, ip: &str, now: DateTime<Utc>) -> bool {
        let mut state = self.state.lock().await;

        if state.permanent.contains(ip) {
            return true;
        }

        match state.blocked.get(ip) {
            Some(until) if *until > now => true,
            Some(_) => {
                state.blocked.remove(ip);
                false
            }
            None => false,
        }
    }

    /// Add an IP to the permanent block list. There is no corresponding
    /// removal operation.
    pub async fn add_permanent_block(&self, ip: &str) {
        let mut state = self.state.lock().await;
        state.permanent.insert(ip.to_string());
        warn!("IP PERMANENTLY BLOCKED: {}", ip);
    }

    /// Current blocking statistics, filtered of expired entries
    pub async fn stats(&self) -> TrackerStats {
        self.stats_at(Utc::now()).await
    }

    pub(crate) async fn stats_at(&self, now: DateTime<Utc>) -> TrackerStats {
        let state = self.state.lock().await;

        let blocked_ips: HashMap<String, String> = state
            .blocked
            .iter()
            .filter(|(_, until)| **until > now)
            .map(|(ip, until)| (ip.clone(), until.to_rfc3339()))
            .collect();

        TrackerStats {
            currently_blocked: blocked_ips.len(),
            blocked_ips,
            permanent_blocks: state.permanent.iter().cloned().collect(),
            tracked_ips: state.violations.len(),
        }
    }

    /// Housekeeping: drop violation lists with no in-window entries and
    /// temporary blocks that have expired. Bounds memory growth over
    /// long uptimes.
    pub async fn sweep(&self) {
        self.sweep_at(Utc::now()).await;
    }

    pub(crate) async fn sweep_at(&self, now: DateTime<Utc>) {
        let mut state = self.state.lock().await;
        let cutoff = now - self.track_window;

        state.violations.retain(|_, timestamps| {
            timestamps.retain(|t| *t > cutoff);
            !timestamps.is_empty()
        });
        state.blocked.retain(|_, until| *until > now);
    }
}
