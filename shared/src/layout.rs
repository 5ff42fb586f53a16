// shared/src/layout.rs

//! On-disk artifact layout.
//!
//! `<dump_root>/<process_guid>/<event_hash>/<artifact>` where `<artifact>` is
//! one of [`EVENT_FILE`], [`REPORT_FILE`], [`REG_FILE`], a binary dump named by
//! [`bin_dump_name`] (plus its `.sha256` sidecar) or a memory dump named by
//! [`memdump_name`].
//!
//! [`EVENT_FILE`]: crate::constants::EVENT_FILE
//! [`REPORT_FILE`]: crate::constants::REPORT_FILE
//! [`REG_FILE`]: crate::constants::REG_FILE

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use crate::constants::{ADS_SEPARATOR, BIN_EXT, DMP_EXT, SHA256_EXT};

/// One file inside an event dump directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DumpFile {
    pub name:      String,
    pub size:      u64,
    pub timestamp: DateTime<Utc>,
}

/// Every artifact produced for one (process, event) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointDumps {
    #[serde(rename = "creation")]
    pub created:      DateTime<Utc>,
    pub modification: DateTime<Utc>,
    #[serde(rename = "process-guid")]
    pub process_guid: String,
    #[serde(rename = "event-hash")]
    pub event_hash:   String,
    pub files:        Vec<DumpFile>,
}

/// Directory holding every artifact of one event for one process.
pub fn artifact_dir(root: &Path, guid: &str, event_hash: &str) -> PathBuf {
    root.join(guid).join(event_hash)
}

/// Last component of a path, accepting both `/` and `\` separators so that
/// Windows paths coming from telemetry resolve the same way on every host.
pub fn basename(path: &str) -> &str {
    path.rsplit(['\\', '/']).next().unwrap_or(path)
}

/// `<nanos>_<basename>.bin`, with `:` (alternate data streams) replaced.
pub fn bin_dump_name(src: &str, nanos: i64) -> String {
    let base = basename(src).replace(':', ADS_SEPARATOR);
    format!("{nanos}_{base}.{BIN_EXT}")
}

/// `<image basename>_<pid>_<nanos>.dmp`
pub fn memdump_name(image: &str, pid: u32, nanos: i64) -> String {
    format!("{}_{pid}_{nanos}.{DMP_EXT}", basename(image))
}

/// Path of the hash sidecar that accompanies a binary dump.
pub fn sha256_sidecar(dump: &Path) -> PathBuf {
    let mut name = dump.as_os_str().to_owned();
    name.push(".");
    name.push(SHA256_EXT);
    PathBuf::from(name)
}

/// Walk `<root>/<guid>/<hash>/` and describe every event dump directory whose
/// newest file is strictly more recent than `since`.
///
/// Curly braces are trimmed from the process GUID the same way the
/// management plane exposes it in artifact URLs.
pub fn list_dumps(root: &Path, since: DateTime<Utc>) -> io::Result<Vec<EndpointDumps>> {
    let mut dumps = Vec::new();

    for proc_entry in sorted_entries(root)? {
        if !proc_entry.file_type()?.is_dir() {
            continue;
        }
        let guid = proc_entry.file_name().to_string_lossy().into_owned();

        for evt_entry in sorted_entries(&proc_entry.path())? {
            if !evt_entry.file_type()?.is_dir() {
                continue;
            }
            let event_hash = evt_entry.file_name().to_string_lossy().into_owned();

            let mut files = Vec::new();
            let mut created: Option<DateTime<Utc>> = None;
            let mut modification: Option<DateTime<Utc>> = None;

            for file in sorted_entries(&evt_entry.path())? {
                let meta = file.metadata()?;
                let mtime: DateTime<Utc> = meta.modified()?.into();

                created = Some(created.map_or(mtime, |c| c.min(mtime)));
                modification = Some(modification.map_or(mtime, |m| m.max(mtime)));

                files.push(DumpFile {
                    name:      file.file_name().to_string_lossy().into_owned(),
                    size:      meta.len(),
                    timestamp: mtime,
                });
            }

            if let (Some(created), Some(modification)) = (created, modification) {
                if since < modification {
                    dumps.push(EndpointDumps {
                        created,
                        modification,
                        process_guid: guid.trim_matches(|c| c == '{' || c == '}').to_string(),
                        event_hash,
                        files,
                    });
                }
            }
        }
    }
    Ok(dumps)
}

fn sorted_entries(dir: &Path) -> io::Result<Vec<fs::DirEntry>> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());
    Ok(entries)
}
