// =============================================================================
// dedup.rs — THE CANDIDATE POOL
// =============================================================================
//
// The same subscription link tends to get reposted across half a dozen
// channels. Every candidate must be fetched exactly once, so everything the
// extraction threads find is offered to this pool first, and only the first
// offer of a given string gets in.
//
// Equality is exact string equality. No normalisation, no probabilistic
// structures: a false positive here would silently lose a subscription.
//
// The pool is fed from rayon threads, so the set sits behind a parking_lot
// Mutex and the counters are plain atomics.
// =============================================================================

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::models::Candidate;

/// Thread-safe, insertion-ordered set of candidate URLs.
pub struct CandidatePool {
    inner: Mutex<PoolInner>,
    pub stats: PoolStats,
}

#[derive(Default)]
struct PoolInner {
    seen: HashSet<String>,
    ordered: Vec<String>,
}

/// Counters for what the pool has been offered.
#[derive(Default)]
pub struct PoolStats {
    pub offered: AtomicU64,
    pub unique: AtomicU64,
    pub duplicates: AtomicU64,
}

impl CandidatePool {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PoolInner::default()),
            stats: PoolStats::default(),
        }
    }

    /// Offer a URL to the pool. Returns `true` if it was new.
    pub fn check_and_insert(&self, url: &str) -> bool {
        self.stats.offered.fetch_add(1, Ordering::Relaxed);

        let inserted = {
            let mut inner = self.inner.lock();
            if inner.seen.contains(url) {
                false
            } else {
                inner.seen.insert(url.to_string());
                inner.ordered.push(url.to_string());
                true
            }
        };

        if inserted {
            self.stats.unique.fetch_add(1, Ordering::Relaxed);
        } else {
            self.stats.duplicates.fetch_add(1, Ordering::Relaxed);
            debug!(url, "Candidate already pooled");
        }
        inserted
    }

    pub fn len(&self) -> usize {
        self.inner.lock().ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain the pool into candidates, in first-seen order.
    pub fn into_candidates(self) -> Vec<Candidate> {
        self.inner
            .into_inner()
            .ordered
            .into_iter()
            .map(Candidate)
            .collect()
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        PoolSnapshot {
            offered: self.stats.offered.load(Ordering::Relaxed),
            unique: self.stats.unique.load(Ordering::Relaxed),
            duplicates: self.stats.duplicates.load(Ordering::Relaxed),
        }
    }
}

impl Default for CandidatePool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct PoolSnapshot {
    pub offered: u64,
    pub unique: u64,
    pub duplicates: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    #[test]
    fn test_new_url_is_accepted() {
        let pool = CandidatePool::new();
        assert!(pool.check_and_insert("https://a.example/sub"));
    }

    #[test]
    fn test_duplicate_url_is_rejected() {
        let pool = CandidatePool::new();
        assert!(pool.check_and_insert("https://a.example/sub"));
        assert!(!pool.check_and_insert("https://a.example/sub"));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_equality_is_exact() {
        let pool = CandidatePool::new();
        assert!(pool.check_and_insert("https://a.example/sub"));
        assert!(pool.check_and_insert("https://a.example/sub/"));
        assert!(pool.check_and_insert("https://A.example/sub"));
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn test_first_seen_order_is_kept() {
        let pool = CandidatePool::new();
        pool.check_and_insert("https://c.example/sub");
        pool.check_and_insert("https://a.example/sub");
        pool.check_and_insert("https://c.example/sub");
        pool.check_and_insert("https://b.example/sub");
        let urls: Vec<_> = pool
            .into_candidates()
            .into_iter()
            .map(|c| c.0)
            .collect();
        assert_eq!(
            urls,
            vec![
                "https://c.example/sub",
                "https://a.example/sub",
                "https://b.example/sub",
            ]
        );
    }

    #[test]
    fn test_parallel_offers_keep_exactly_one_of_each() {
        let pool = CandidatePool::new();
        // 50 distinct URLs, each offered 8 times from whatever thread rayon picks.
        let offers: Vec<String> = (0..400)
            .map(|i| format!("https://n{}.example/sub", i % 50))
            .collect();
        offers.par_iter().for_each(|url| {
            pool.check_and_insert(url);
        });

        let snapshot = pool.snapshot();
        assert_eq!(snapshot.offered, 400);
        assert_eq!(snapshot.unique, 50);
        assert_eq!(snapshot.duplicates, 350);
        assert_eq!(pool.len(), 50);
    }
}
