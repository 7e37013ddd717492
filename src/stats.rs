//! Process-wide counters. §3/§5: each counter only ever increases and is
//! independent of the others, so plain atomics are sufficient -- no lock
//! needs to be held across a suspension point to keep them consistent.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
pub struct Stats {
    pub added: AtomicU64,
    pub retried: AtomicU64,
    pub dropped: AtomicU64,
    pub exceptions: AtomicU64,
    pub not_found: AtomicU64,
    pub moved_to_public: AtomicU64,
    pub dumped_to_secret: AtomicU64,
    pub archived: AtomicU64,
}

impl Stats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            added: self.added.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            exceptions: self.exceptions.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            moved_to_public: self.moved_to_public.load(Ordering::Relaxed),
            dumped_to_secret: self.dumped_to_secret.load(Ordering::Relaxed),
            archived: self.archived.load(Ordering::Relaxed),
        }
    }
}

pub trait CounterExt {
    fn incr(&self);
}

impl CounterExt for AtomicU64 {
    fn incr(&self) {
        self.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StatsSnapshot {
    pub added: u64,
    pub retried: u64,
    pub dropped: u64,
    pub exceptions: u64,
    pub not_found: u64,
    pub moved_to_public: u64,
    pub dumped_to_secret: u64,
    pub archived: u64,
}

impl std::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "added={} retried={} dropped={} exceptions={} not_found={} \
             moved_to_public={} dumped_to_secret={} archived={}",
            self.added,
            self.retried,
            self.dropped,
            self.exceptions,
            self.not_found,
            self.moved_to_public,
            self.dumped_to_secret,
            self.archived
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let stats = Stats::new();
        let snap = stats.snapshot();
        assert_eq!(snap.added, 0);
        assert_eq!(snap.archived, 0);
    }

    #[test]
    fn test_incr_is_visible_in_snapshot() {
        let stats = Stats::new();
        stats.archived.incr();
        stats.archived.incr();
        stats.dropped.incr();
        let snap = stats.snapshot();
        assert_eq!(snap.archived, 2);
        assert_eq!(snap.dropped, 1);
    }
}
