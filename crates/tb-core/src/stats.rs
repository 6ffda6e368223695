//! Block/allow statistics.
//!
//! Counters are atomics so recording never contends with evaluation; the
//! per-tracker and per-type breakdowns sit behind a mutex that only the
//! recording side and readers touch.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;

use crate::types::ResourceType;

/// Point-in-time copy of the statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub blocked_count: u64,
    pub allowed_count: u64,
    /// Blocks that were satisfied with a surrogate (included in `blocked_count`)
    pub replaced_count: u64,
    pub blocked_by_tracker: BTreeMap<String, u64>,
    pub blocked_by_type: BTreeMap<ResourceType, u64>,
}

impl StatsSnapshot {
    pub fn total(&self) -> u64 {
        self.blocked_count + self.allowed_count
    }

    /// Blocked share of all recorded requests, as a percentage.
    ///
    /// Returns 0.0 if nothing has been recorded.
    pub fn block_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            (self.blocked_count as f64 / total as f64) * 100.0
        }
    }
}

#[derive(Debug, Default)]
struct Breakdown {
    by_tracker: BTreeMap<String, u64>,
    by_type: BTreeMap<ResourceType, u64>,
}

/// Aggregates decisions for the UI and analytics collaborators.
#[derive(Debug, Default)]
pub struct StatisticsCollector {
    blocked: AtomicU64,
    allowed: AtomicU64,
    replaced: AtomicU64,
    breakdown: Mutex<Breakdown>,
}

impl StatisticsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_blocked(&self, tracker_domain: &str, resource_type: ResourceType) {
        self.blocked.fetch_add(1, Ordering::Relaxed);
        // A poisoned breakdown only loses detail; the totals stay exact
        if let Ok(mut breakdown) = self.breakdown.lock() {
            *breakdown.by_tracker.entry(tracker_domain.to_string()).or_insert(0) += 1;
            *breakdown.by_type.entry(resource_type).or_insert(0) += 1;
        }
    }

    /// Record a block that was satisfied with a surrogate.
    pub fn record_replaced(&self, tracker_domain: &str, resource_type: ResourceType) {
        self.replaced.fetch_add(1, Ordering::Relaxed);
        self.record_blocked(tracker_domain, resource_type);
    }

    pub fn record_allowed(&self, _resource_type: ResourceType) {
        self.allowed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn blocked_count(&self) -> u64 {
        self.blocked.load(Ordering::Relaxed)
    }

    pub fn allowed_count(&self) -> u64 {
        self.allowed.load(Ordering::Relaxed)
    }

    pub fn replaced_count(&self) -> u64 {
        self.replaced.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let (blocked_by_tracker, blocked_by_type) = match self.breakdown.lock() {
            Ok(breakdown) => (breakdown.by_tracker.clone(), breakdown.by_type.clone()),
            Err(_) => (BTreeMap::new(), BTreeMap::new()),
        };
        StatsSnapshot {
            blocked_count: self.blocked_count(),
            allowed_count: self.allowed_count(),
            replaced_count: self.replaced_count(),
            blocked_by_tracker,
            blocked_by_type,
        }
    }

    pub fn reset(&self) {
        self.blocked.store(0, Ordering::Relaxed);
        self.allowed.store(0, Ordering::Relaxed);
        self.replaced.store(0, Ordering::Relaxed);
        if let Ok(mut breakdown) = self.breakdown.lock() {
            breakdown.by_tracker.clear();
            breakdown.by_type.clear();
        }
    }
}
