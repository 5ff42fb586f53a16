// src/tracker/store.rs

//! # ProcessTrack Store
//!
//! Authoritative table of live processes, keyed by GUID with a best-effort
//! PID index. Tracks are shared as `Arc<RwLock<ProcessTrack>>` so enrichment
//! and action code can update a track without holding the table lock.
//!
//! Lock order: table maps first, then an individual track. Nothing in this
//! crate takes a table lock while holding a track lock.

use crate::hids_log;
use crate::tracker::track::{DriverInfo, ProcessFacts, ProcessTrack};
use log::Level;
use parking_lot::RwLock;
use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

pub type TrackRef = Arc<RwLock<ProcessTrack>>;

#[derive(Default)]
pub struct ProcessStore {
    by_guid:          RwLock<HashMap<String, TrackRef>>,
    by_pid:           RwLock<HashMap<u32, String>>,
    blacklist:        RwLock<HashSet<String>>,
    drivers:          RwLock<Vec<DriverInfo>>,
    termination_seen: AtomicBool,
}

impl ProcessStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new process.
    ///
    /// Returns `None` (and logs) when the GUID is already tracked. Lineage and
    /// parent context are inherited from the parent track when it is known;
    /// otherwise the ancestor chain is seeded from the raw parent image.
    pub fn create(&self, guid: &str, parent_guid: &str, facts: ProcessFacts) -> Option<TrackRef> {
        let mut by_guid = self.by_guid.write();
        if by_guid.contains_key(guid) {
            hids_log!(Level::Debug, "tracker", "Duplicate process creation for {}, ignored", guid);
            return None;
        }

        let pid = facts.pid;
        let mut track = ProcessTrack::new(guid, parent_guid, facts);

        // a process can never be its own parent
        let parent = (parent_guid != guid).then(|| by_guid.get(parent_guid)).flatten();
        match parent {
            Some(parent) => {
                let p = parent.read();
                track.ancestors = p.ancestors.clone();
                track.ancestors.push(p.image.clone());
                track.parent_user = p.user.clone();
                track.parent_integrity_level = p.integrity_level.clone();
                track.parent_services = p.services.clone().unwrap_or_default();
                track.parent_current_directory = p.current_directory.clone();
            }
            None => {
                if !track.parent_image.is_empty() {
                    track.ancestors.push(track.parent_image.clone());
                }
            }
        }

        let track = Arc::new(RwLock::new(track));
        by_guid.insert(guid.to_string(), Arc::clone(&track));
        self.by_pid.write().insert(pid, guid.to_string());
        hids_log!(Level::Debug, "tracker", "Tracking {} pid={}", guid, pid);
        Some(track)
    }

    pub fn get_by_guid(&self, guid: &str) -> Option<TrackRef> {
        self.by_guid.read().get(guid).cloned()
    }

    /// PIDs are recycled by the OS; only use this for short-lived correlation.
    pub fn get_by_pid(&self, pid: u32) -> Option<TrackRef> {
        let guid = self.by_pid.read().get(&pid).cloned()?;
        self.get_by_guid(&guid)
    }

    /// Remove a track from both indexes and release its heavy fields.
    pub fn terminate(&self, guid: &str) -> Option<TrackRef> {
        let track = self.by_guid.write().remove(guid)?;
        let pid = {
            let mut t = track.write();
            t.retire();
            t.pid
        };
        let mut by_pid = self.by_pid.write();
        if by_pid.get(&pid).is_some_and(|g| g == guid) {
            by_pid.remove(&pid);
        }
        hids_log!(Level::Debug, "tracker", "Terminated {} pid={}", guid, pid);
        Some(track)
    }

    pub fn blacklist(&self, command_line: &str) {
        if self.blacklist.write().insert(command_line.to_string()) {
            hids_log!(Level::Info, "tracker", "Blacklisted command line: {}", command_line);
        }
    }

    pub fn is_blacklisted(&self, command_line: &str) -> bool {
        self.blacklist.read().contains(command_line)
    }

    pub fn blacklisted(&self) -> Vec<String> {
        let mut v: Vec<_> = self.blacklist.read().iter().cloned().collect();
        v.sort();
        v
    }

    /// Atomically consume one unit of dump budget for `guid`.
    ///
    /// Tracked processes are allowed while their count is below `max`;
    /// untracked ones are allowed only when `dump_untracked` is set.
    pub fn check_dump_count_or_inc(&self, guid: &str, max: u32, dump_untracked: bool) -> bool {
        match self.get_by_guid(guid) {
            Some(track) => {
                let mut t = track.write();
                if t.dump_count < max {
                    t.dump_count += 1;
                    true
                } else {
                    false
                }
            }
            None => dump_untracked,
        }
    }

    pub fn add_driver(&self, driver: DriverInfo) {
        self.drivers.write().push(driver);
    }

    pub fn drivers(&self) -> Vec<DriverInfo> {
        self.drivers.read().clone()
    }

    /// Point-in-time copy of every live track, ordered by creation.
    pub fn snapshot(&self) -> Vec<ProcessTrack> {
        let tracks: Vec<TrackRef> = self.by_guid.read().values().cloned().collect();
        let mut out: Vec<ProcessTrack> = tracks.iter().map(|t| t.read().clone()).collect();
        out.sort_by(|a, b| a.created.cmp(&b.created).then_with(|| a.guid.cmp(&b.guid)));
        out
    }

    pub fn len(&self) -> usize {
        self.by_guid.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn mark_termination_seen(&self) {
        if !self.termination_seen.swap(true, Ordering::AcqRel) {
            hids_log!(Level::Info, "tracker", "Process termination events are enabled");
        }
    }

    pub fn termination_seen(&self) -> bool {
        self.termination_seen.load(Ordering::Acquire)
    }
}
