// src/tracker/track.rs

//! Per-process state: identity, lineage, risk score and statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Facts copied from the process creation event.
#[derive(Debug, Clone, Default)]
pub struct ProcessFacts {
    pub pid:                 u32,
    pub image:               String,
    pub command_line:        String,
    pub parent_image:        String,
    pub parent_command_line: String,
    pub current_directory:   String,
    pub user:                String,
    pub integrity_level:     String,
    pub hashes:              String,
}

/// Risk accumulated by a process over its lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneScore {
    /// Sum of every criticality reported for the process.
    pub score:       i64,
    /// Highest criticality reported for the process.
    pub criticality: i64,
    /// Rules that matched at least once.
    pub signatures:  BTreeSet<String>,
}

impl GeneScore {
    /// Record a detection. Negative values are ignored so neither field can
    /// decrease.
    pub fn update_criticality(&mut self, criticality: i64) {
        if criticality <= 0 {
            return;
        }
        self.score = self.score.saturating_add(criticality);
        self.criticality = self.criticality.max(criticality);
    }

    pub fn update_signature<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signatures.extend(names.into_iter().map(Into::into));
    }
}

/// One observed network destination.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConStat {
    pub ip:    String,
    pub port:  u16,
    pub count: u64,
    pub first: String,
    pub last:  String,
}

/// File creation and deletion counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileStats {
    pub created:            u64,
    pub deleted:            u64,
    pub created_by_ext:     BTreeMap<String, u64>,
    pub deleted_by_ext:     BTreeMap<String, u64>,
    pub first_created:      Option<DateTime<Utc>>,
    pub last_created:       Option<DateTime<Utc>>,
    pub first_deleted:      Option<DateTime<Utc>>,
    pub last_deleted:       Option<DateTime<Utc>>,
    /// Files reported by object access auditing.
    pub last_accessed:      BTreeSet<String>,
}

/// Outcome of one file counter update, injected back into the event.
#[derive(Debug, Clone, PartialEq)]
pub struct FileCounters {
    pub total:     u64,
    pub by_ext:    u64,
    pub extension: String,
    /// Events per second since the first one of the same kind.
    pub frequency: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOp {
    Created,
    Deleted,
}

impl FileStats {
    pub fn record(&mut self, op: FileOp, extension: &str, now: DateTime<Utc>) -> FileCounters {
        let (total, by_ext, first, last) = match op {
            FileOp::Created => (
                &mut self.created,
                &mut self.created_by_ext,
                &mut self.first_created,
                &mut self.last_created,
            ),
            FileOp::Deleted => (
                &mut self.deleted,
                &mut self.deleted_by_ext,
                &mut self.first_deleted,
                &mut self.last_deleted,
            ),
        };
        let first = *first.get_or_insert(now);
        *total += 1;
        let ext_count = by_ext.entry(extension.to_string()).or_insert(0);
        *ext_count += 1;
        *last = Some(now);

        let elapsed = (now - first).num_nanoseconds().unwrap_or(0);
        let frequency = if elapsed > 0 {
            (*total as i128 * 1_000_000_000 / elapsed as i128) as i64
        } else {
            0
        };
        FileCounters { total: *total, by_ext: *ext_count, extension: extension.to_string(), frequency }
    }
}

/// Activity counters of one process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcStats {
    pub create_process_count: u64,
    /// Keyed by `ip:port`.
    pub connections:          BTreeMap<String, ConStat>,
    /// Resolved IP → queried names.
    pub resolutions:          BTreeMap<String, BTreeSet<String>>,
    pub files:                FileStats,
}

impl ProcStats {
    pub fn update_connection(&mut self, ts: &str, ip: &str, port: u16) {
        let stat = self
            .connections
            .entry(format!("{ip}:{port}"))
            .or_insert_with(|| ConStat {
                ip: ip.to_string(),
                port,
                first: ts.to_string(),
                ..Default::default()
            });
        stat.count += 1;
        stat.last = ts.to_string();
    }

    pub fn update_resolution(&mut self, ip: &str, name: &str) {
        self.resolutions.entry(ip.to_string()).or_default().insert(name.to_string());
    }
}

/// Driver seen by a driver load event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverInfo {
    pub image:            String,
    pub hashes:           String,
    pub signature:        String,
    pub signature_status: String,
    pub signed:           bool,
}

impl Default for DriverInfo {
    fn default() -> Self {
        Self {
            image:            "?".into(),
            hashes:           "?".into(),
            signature:        "?".into(),
            signature_status: "?".into(),
            signed:           false,
        }
    }
}

/// In-memory record of one live process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessTrack {
    pub guid:                     String,
    pub parent_guid:              String,
    pub pid:                      u32,
    pub image:                    String,
    pub command_line:             String,
    pub current_directory:        String,
    pub user:                     String,
    pub integrity_level:          String,
    pub hashes:                   String,
    pub parent_image:             String,
    pub parent_command_line:      String,
    pub parent_current_directory: String,
    pub parent_user:              String,
    pub parent_integrity_level:   String,
    pub parent_services:          String,
    pub signed:                   bool,
    pub signature:                String,
    pub signature_status:         String,
    /// Image paths from the oldest known ancestor down to the parent.
    pub ancestors:                Vec<String>,
    /// `None` until the lookup ran once.
    pub services:                 Option<String>,
    pub score:                    GeneScore,
    pub stats:                    ProcStats,
    pub dump_count:               u32,
    pub blacklisted:              bool,
    pub terminated:               bool,
    pub created:                  DateTime<Utc>,
}

impl ProcessTrack {
    pub fn new(guid: &str, parent_guid: &str, facts: ProcessFacts) -> Self {
        Self {
            guid:                guid.to_string(),
            parent_guid:         parent_guid.to_string(),
            pid:                 facts.pid,
            image:               facts.image,
            command_line:        facts.command_line,
            current_directory:   facts.current_directory,
            user:                facts.user,
            integrity_level:     facts.integrity_level,
            hashes:              facts.hashes,
            parent_image:        facts.parent_image,
            parent_command_line: facts.parent_command_line,
            created:             Utc::now(),
            ..Default::default()
        }
    }

    /// Parsed `ALGO=value` pairs of the hash set.
    pub fn hash_set(&self) -> BTreeMap<String, String> {
        self.hashes
            .split(',')
            .filter_map(|kv| kv.split_once('='))
            .map(|(k, v)| (k.trim().to_ascii_uppercase(), v.trim().to_string()))
            .collect()
    }

    /// Release the data that is only useful while the process runs.
    pub(crate) fn retire(&mut self) {
        self.terminated = true;
        self.stats = ProcStats::default();
        self.ancestors = Vec::new();
    }
}
