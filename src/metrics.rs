// ═══════════════════════════════════════════════════════════════
// RUN METRICS - Counting everything that happens in one run
// ═══════════════════════════════════════════════════════════════
//
// Atomic counters, bumped from whichever task or rayon thread is doing the
// work, read once at the end for the summary line. There is no server: the
// run is short and the summary goes to the log.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

use crate::models::Classification;

/// The metrics snapshot - what gets serialized into the summary log line
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct MetricsSnapshot {
    pub channels_fetched: u64,
    pub channels_failed: u64,
    pub urls_extracted: u64,
    pub inline_links_extracted: u64,
    pub candidates_accepted: u64,
    pub checks_completed: u64,
    pub fetch_attempts: u64,
    pub fetch_retries: u64,
    pub fetch_failures: u64,
    pub non_success_status: u64,
    pub usable_subscriptions: u64,
    pub exhausted_subscriptions: u64,
    pub structured_configs: u64,
    pub encoded_payloads: u64,
    pub rejected: u64,
    pub elapsed_seconds: f64,
}

/// Thread-safe atomic counters for one run
pub struct RunMetrics {
    channels_fetched: AtomicU64,
    channels_failed: AtomicU64,
    urls_extracted: AtomicU64,
    inline_links_extracted: AtomicU64,
    candidates_accepted: AtomicU64,
    checks_completed: AtomicU64,
    fetch_attempts: AtomicU64,
    fetch_retries: AtomicU64,
    fetch_failures: AtomicU64,
    non_success_status: AtomicU64,
    usable_subscriptions: AtomicU64,
    exhausted_subscriptions: AtomicU64,
    structured_configs: AtomicU64,
    encoded_payloads: AtomicU64,
    rejected: AtomicU64,
    start_time: Instant,
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            channels_fetched: AtomicU64::new(0),
            channels_failed: AtomicU64::new(0),
            urls_extracted: AtomicU64::new(0),
            inline_links_extracted: AtomicU64::new(0),
            candidates_accepted: AtomicU64::new(0),
            checks_completed: AtomicU64::new(0),
            fetch_attempts: AtomicU64::new(0),
            fetch_retries: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
            non_success_status: AtomicU64::new(0),
            usable_subscriptions: AtomicU64::new(0),
            exhausted_subscriptions: AtomicU64::new(0),
            structured_configs: AtomicU64::new(0),
            encoded_payloads: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn increment_channels_fetched(&self) {
        self.channels_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_channels_failed(&self) {
        self.channels_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_extracted(&self, urls: usize, inline_links: usize) {
        self.urls_extracted.fetch_add(urls as u64, Ordering::Relaxed);
        self.inline_links_extracted
            .fetch_add(inline_links as u64, Ordering::Relaxed);
    }

    pub fn add_candidates_accepted(&self, count: usize) {
        self.candidates_accepted
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn increment_checks_completed(&self) {
        self.checks_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_fetch_attempts(&self) {
        self.fetch_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_fetch_retries(&self) {
        self.fetch_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_fetch_failures(&self) {
        self.fetch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_non_success_status(&self) {
        self.non_success_status.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_classification(&self, classification: Classification) {
        let counter = match classification {
            Classification::UsableSubscription => &self.usable_subscriptions,
            Classification::Exhausted => &self.exhausted_subscriptions,
            Classification::StructuredConfig => &self.structured_configs,
            Classification::EncodedPayload => &self.encoded_payloads,
            Classification::Rejected => &self.rejected,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn checks_completed(&self) -> u64 {
        self.checks_completed.load(Ordering::Relaxed)
    }

    /// Take a snapshot of all metrics (lock-free reads)
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            channels_fetched: self.channels_fetched.load(Ordering::Relaxed),
            channels_failed: self.channels_failed.load(Ordering::Relaxed),
            urls_extracted: self.urls_extracted.load(Ordering::Relaxed),
            inline_links_extracted: self.inline_links_extracted.load(Ordering::Relaxed),
            candidates_accepted: self.candidates_accepted.load(Ordering::Relaxed),
            checks_completed: self.checks_completed.load(Ordering::Relaxed),
            fetch_attempts: self.fetch_attempts.load(Ordering::Relaxed),
            fetch_retries: self.fetch_retries.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            non_success_status: self.non_success_status.load(Ordering::Relaxed),
            usable_subscriptions: self.usable_subscriptions.load(Ordering::Relaxed),
            exhausted_subscriptions: self.exhausted_subscriptions.load(Ordering::Relaxed),
            structured_configs: self.structured_configs.load(Ordering::Relaxed),
            encoded_payloads: self.encoded_payloads.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            elapsed_seconds: self.start_time.elapsed().as_secs_f64(),
        }
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}
