//! Signature dedup cache with TTL eviction.
//!
//! The cache answers seen/unseen for event signatures so the same event
//! arriving from several upstreams is broadcast once.  Eviction is purely
//! age-based; a periodic sweep task removes entries older than the TTL and
//! is never on the `check_and_record` critical path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::engine::ProxyEngine;

/// Outcome of a dedup check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Fresh,
    Duplicate,
}

/// Map from event signature to first-seen time.
pub struct DedupCache {
    entries: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
}

impl DedupCache {
    pub fn new(ttl: Duration) -> Self {
        DedupCache {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Atomically record `sig` if unseen.
    ///
    /// A duplicate does not refresh the original timestamp, so an event
    /// seen continuously still ages out after one TTL.
    pub fn check_and_record(&self, sig: &str) -> Admission {
        self.check_and_record_at(sig, Instant::now())
    }

    fn check_and_record_at(&self, sig: &str, now: Instant) -> Admission {
        let mut entries = self.entries.lock().expect("dedup lock poisoned");
        if entries.contains_key(sig) {
            Admission::Duplicate
        } else {
            entries.insert(sig.to_owned(), now);
            Admission::Fresh
        }
    }

    /// Remove every entry at least one TTL old.
    pub fn sweep(&self) {
        self.sweep_at(Instant::now());
    }

    fn sweep_at(&self, now: Instant) {
        let ttl = self.ttl;
        self.entries
            .lock()
            .expect("dedup lock poisoned")
            .retain(|_, first_seen| now.duration_since(*first_seen) < ttl);
    }

    pub fn size(&self) -> usize {
        self.entries.lock().expect("dedup lock poisoned").len()
    }
}

/// Spawn the periodic sweep task.  Runs for the life of the process.
pub fn spawn_sweeper(engine: Arc<ProxyEngine>, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        // The first tick fires immediately; skip it so a fresh cache is not
        // swept at startup for nothing.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            engine.dedup.sweep();
            debug!(entries = engine.dedup.size(), "dedup cache swept");
        }
    })
}
