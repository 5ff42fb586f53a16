//! # Dedup Guard
//!
//! Membership sets that keep expensive response work from running twice:
//!
//! * `dumped`     – SHA-256 of file bodies already copied (add-only)
//! * `memdumped`  – GUIDs whose memory has been dumped (add-only while the
//!                  process lives)
//! * events       – content hashes of the `event.json` artifacts written
//!                  per GUID, dropped with the process
//! * `in_flight`  – GUIDs or artifact paths currently being worked on; held
//!                  through an [`InFlight`] permit and released on drop

pub mod barrier;
pub mod state;

pub use barrier::{DumpBarrier, DumpTicket};

use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

/// Concurrency-safe string set.
#[derive(Debug, Default)]
pub struct DedupSet {
    inner: Mutex<HashSet<String>>,
}

impl DedupSet {
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().contains(key)
    }

    /// Returns `true` when the key was not present yet.
    pub fn add(&self, key: &str) -> bool {
        self.inner.lock().insert(key.to_string())
    }

    pub fn del(&self, key: &str) -> bool {
        self.inner.lock().remove(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn items(&self) -> Vec<String> {
        self.inner.lock().iter().cloned().collect()
    }
}

/// Scoped membership in the in-flight set.
#[derive(Debug)]
pub struct InFlight {
    set: Arc<DedupSet>,
    key: String,
}

impl InFlight {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.set.del(&self.key);
    }
}

#[derive(Debug, Default)]
pub struct DedupGuard {
    pub dumped:    DedupSet,
    pub memdumped: DedupSet,
    in_flight:     Arc<DedupSet>,
    events:        Mutex<HashMap<String, HashSet<String>>>,
}

impl DedupGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key` for the duration of one action. `None` when another worker
    /// already holds it.
    pub fn enter(&self, key: &str) -> Option<InFlight> {
        self.in_flight.add(key).then(|| InFlight {
            set: Arc::clone(&self.in_flight),
            key: key.to_string(),
        })
    }

    pub fn in_flight(&self, key: &str) -> bool {
        self.in_flight.contains(key)
    }

    /// Whether the event artifact `hash` of `guid` was already written.
    pub fn event_written(&self, guid: &str, hash: &str) -> bool {
        self.events.lock().get(guid).is_some_and(|set| set.contains(hash))
    }

    /// Returns `true` when the marker was not present yet.
    pub fn mark_event(&self, guid: &str, hash: &str) -> bool {
        self.events
            .lock()
            .entry(guid.to_string())
            .or_default()
            .insert(hash.to_string())
    }

    /// Number of event artifacts remembered for `guid`.
    pub fn event_markers(&self, guid: &str) -> usize {
        self.events.lock().get(guid).map_or(0, HashSet::len)
    }

    /// Drop guid-keyed state once the process is gone.
    pub fn forget_process(&self, guid: &str) {
        self.memdumped.del(guid);
        self.events.lock().remove(guid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_is_released_on_every_exit_path() {
        let guard = DedupGuard::new();
        {
            let permit = guard.enter("{G1}").unwrap();
            assert_eq!(permit.key(), "{G1}");
            assert!(guard.enter("{G1}").is_none());
            assert!(guard.in_flight("{G1}"));
        }
        assert!(!guard.in_flight("{G1}"));

        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _permit = guard.enter("{G2}").unwrap();
            panic!("dump blew up");
        }));
        assert!(res.is_err());
        assert!(guard.enter("{G2}").is_some());
    }

    #[test]
    fn sets_are_independent() {
        let guard = DedupGuard::new();
        assert!(guard.dumped.add("abc"));
        assert!(!guard.dumped.add("abc"));
        assert!(!guard.memdumped.contains("abc"));
        guard.memdumped.add("{G}");
        guard.forget_process("{G}");
        assert!(guard.memdumped.is_empty());
        assert!(guard.dumped.contains("abc"));
    }

    #[test]
    fn event_markers_go_with_the_process() {
        let guard = DedupGuard::new();
        assert!(guard.mark_event("{G1}", "00000000deadbeef"));
        assert!(!guard.mark_event("{G1}", "00000000deadbeef"));
        guard.mark_event("{G2}", "00000000deadbeef");
        assert!(guard.event_written("{G1}", "00000000deadbeef"));
        assert!(!guard.event_written("{G1}", "0000000000000001"));

        guard.forget_process("{G1}");
        assert_eq!(guard.event_markers("{G1}"), 0);
        assert!(!guard.event_written("{G1}", "00000000deadbeef"));
        assert_eq!(guard.event_markers("{G2}"), 1);
    }
}
