//! Thread-safe call and volume accounting for the orchestrator.
//!
//! An explicit, injected counter service: the orchestrator holds a shared
//! reference and increments per attempt; callers read snapshots. No
//! module-level state.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Atomic usage counters. One `record_attempt` per external call attempt,
/// successful or not.
#[derive(Debug, Default)]
pub struct UsageTracker {
    attempts: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    cache_hits: AtomicU64,
    chars_sent: AtomicU64,
    chars_received: AtomicU64,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_attempt(&self, chars_sent: usize) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        self.chars_sent.fetch_add(chars_sent as u64, Ordering::Relaxed);
    }

    pub fn record_success(&self, chars_received: usize) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        self.chars_received
            .fetch_add(chars_received as u64, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters.
    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            chars_sent: self.chars_sent.load(Ordering::Relaxed),
            chars_received: self.chars_received.load(Ordering::Relaxed),
        }
    }
}

/// Read-only view of the usage counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub cache_hits: u64,
    pub chars_sent: u64,
    pub chars_received: u64,
}
