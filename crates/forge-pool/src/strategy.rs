//! Pluggable credential selection
//!
//! Strategies see only the healthy candidates (index into the pool's
//! credential list plus recency data) and pick one. The pool calls `pick`
//! while holding its write lock, so strategies may assume the view is
//! consistent and must not block.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// A selectable credential as the strategy sees it.
#[derive(Debug, Clone, Copy)]
pub struct Candidate {
    /// Index into the pool's credential list.
    pub index: usize,
    /// When this credential was last handed out, if ever.
    pub last_used_at: Option<Instant>,
}

/// Picks one candidate from the healthy set.
pub trait SelectionStrategy: Send + Sync {
    /// Returns the pool index of the chosen candidate, or `None` when the
    /// candidate set is empty.
    fn pick(&self, candidates: &[Candidate]) -> Option<usize>;
}

/// Default strategy: hand out the credential that has gone unused the
/// longest. Never-used credentials come first. Because the pool stamps
/// `last_used_at` under the same lock, this behaves as recency-weighted
/// round robin and spreads load evenly under concurrency.
#[derive(Debug, Default)]
pub struct LeastRecentlyUsed;

impl SelectionStrategy for LeastRecentlyUsed {
    fn pick(&self, candidates: &[Candidate]) -> Option<usize> {
        // Option ordering puts None (never used) before any Some.
        candidates
            .iter()
            .min_by_key(|c| c.last_used_at)
            .map(|c| c.index)
    }
}

/// Positional round robin over the healthy set, cursor advanced atomically.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl SelectionStrategy for RoundRobin {
    fn pick(&self, candidates: &[Candidate]) -> Option<usize> {
        if candidates.is_empty() {
            return None;
        }
        let position = self.cursor.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Some(candidates[position].index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn candidate(index: usize, last_used_at: Option<Instant>) -> Candidate {
        Candidate {
            index,
            last_used_at,
        }
    }

    #[test]
    fn lru_prefers_never_used() {
        let now = Instant::now();
        let candidates = vec![
            candidate(0, Some(now)),
            candidate(1, None),
            candidate(2, Some(now - Duration::from_secs(10))),
        ];
        assert_eq!(LeastRecentlyUsed.pick(&candidates), Some(1));
    }

    #[test]
    fn lru_picks_oldest_use() {
        let now = Instant::now();
        let candidates = vec![
            candidate(0, Some(now - Duration::from_secs(5))),
            candidate(1, Some(now - Duration::from_secs(30))),
            candidate(2, Some(now - Duration::from_secs(1))),
        ];
        assert_eq!(LeastRecentlyUsed.pick(&candidates), Some(1));
    }

    #[test]
    fn lru_empty_set_is_none() {
        assert_eq!(LeastRecentlyUsed.pick(&[]), None);
    }

    #[test]
    fn round_robin_cycles_positions() {
        let strategy = RoundRobin::default();
        let candidates = vec![candidate(3, None), candidate(7, None)];
        assert_eq!(strategy.pick(&candidates), Some(3));
        assert_eq!(strategy.pick(&candidates), Some(7));
        assert_eq!(strategy.pick(&candidates), Some(3));
    }

    #[test]
    fn round_robin_empty_set_is_none() {
        let strategy = RoundRobin::default();
        assert_eq!(strategy.pick(&[]), None);
    }
}
