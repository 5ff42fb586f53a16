// src/actions/dump.rs

//! Artifact writers and the per-detection dump job.

use chrono::Utc;
use log::Level;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::{
    collections::BTreeSet,
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};
use thiserror::Error;

use shared::constants::{EVENT_FILE, REG_FILE, REPORT_FILE};
use shared::{artifact_dir, bin_dump_name, memdump_name, sha256_sidecar};

use super::Action;
use super::cmdline::{argv_from_command_line, files_from_command_line, is_dumpable_file};
use super::report;
use crate::compress::CompressionWorker;
use crate::context::Context;
use crate::event::{Event, archive::deleted_file, fields::*};
use crate::guard::barrier::DumpTicket;
use crate::hids_log;
use crate::os::OsError;
use crate::tracker::{ProcessTrack, TrackRef};

#[derive(Debug, Error)]
pub enum DumpError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("OS error: {0}")]
    Os(#[from] OsError),
}

/// Dump-class work of one detection, executed off the detection path.
#[derive(Debug)]
pub struct DumpJob {
    pub event:   Event,
    pub guid:    String,
    pub hash:    String,
    pub actions: BTreeSet<Action>,
    pub track:   Option<TrackRef>,
    /// Held while the memory dump is outstanding; a pending kill waits on it.
    pub ticket:  Option<DumpTicket>,
}

/// Outcome of a single file dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileDump {
    Skipped,
    /// Content already stored; only the hash sidecar was written.
    HashOnly,
    Copied,
}

fn now_nanos() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

/// Lower-case hex SHA-256 of a file's content.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut File::open(path)?, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// `HKLM\...\Key\Value` → (`HKLM\...\Key`, `Value`)
pub fn split_registry_path(target: &str) -> (&str, &str) {
    match target.rfind('\\') {
        Some(i) => (&target[..i], &target[i + 1..]),
        None => ("", target),
    }
}

/// Writes the artifacts of one (process, event) directory.
pub struct Dumper<'a> {
    ctx:        &'a Context,
    compressor: &'a CompressionWorker,
    guid:       String,
    hash:       String,
    dir:        PathBuf,
}

impl<'a> Dumper<'a> {
    pub fn new(ctx: &'a Context, compressor: &'a CompressionWorker, guid: &str, hash: &str) -> Self {
        let dir = artifact_dir(&ctx.config.dump.dir, guid, hash);
        Self { ctx, compressor, guid: guid.to_string(), hash: hash.to_string(), dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn prepare(&self) -> io::Result<()> {
        fs::create_dir_all(&self.dir)
    }

    /// Write `name` and hand it to the compression worker.
    pub fn write_artifact(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, DumpError> {
        self.prepare()?;
        let path = self.dir.join(name);
        fs::write(&path, bytes)?;
        self.compressor.enqueue(path.clone());
        Ok(path)
    }

    pub fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<PathBuf, DumpError> {
        let bytes = serde_json::to_vec(value)?;
        self.write_artifact(name, &bytes)
    }

    /// Dump a file referenced by the detection.
    ///
    /// The hash sidecar is always written; the body only the first time its
    /// content is seen.
    pub fn file(&self, src: &str) -> Result<FileDump, DumpError> {
        if !is_dumpable_file(src) {
            return Ok(FileDump::Skipped);
        }
        let sha256 = sha256_file(Path::new(src))?;
        self.prepare()?;
        let dst = self.dir.join(bin_dump_name(src, now_nanos()));
        fs::write(sha256_sidecar(&dst), sha256.as_bytes())?;

        if !self.ctx.guard.dumped.add(&sha256) {
            return Ok(FileDump::HashOnly);
        }
        hids_log!(Level::Debug, "actions", "Dumping file: {} -> {}", src, dst.display());
        if let Err(e) = fs::copy(src, &dst) {
            // leave the content claimable by a later detection
            self.ctx.guard.dumped.del(&sha256);
            return Err(e.into());
        }
        self.compressor.enqueue(dst);
        Ok(FileDump::Copied)
    }

    /// Full memory snapshot of a tracked process, at most once per GUID.
    pub fn memory(&self, guid: &str, pid: u32, image: &str) -> Result<Option<PathBuf>, DumpError> {
        let guard = &self.ctx.guard;
        if self.ctx.identity.is_self_pid(pid) || guard.memdumped.contains(guid) {
            return Ok(None);
        }
        let Some(_dumping) = guard.enter(guid) else {
            hids_log!(Level::Debug, "actions", "Memory dump already running for {}", guid);
            return Ok(None);
        };
        // the permit makes this check and the add below atomic per GUID
        if guard.memdumped.contains(guid) {
            return Ok(None);
        }
        if !self.ctx.os.is_running(pid) {
            hids_log!(Level::Warn, "actions", "Cannot dump process PID={}, the process is already terminated", pid);
            return Ok(None);
        }

        self.prepare()?;
        let path = self.dir.join(memdump_name(image, pid, now_nanos()));
        hids_log!(Level::Info, "actions", "Trying to dump memory of process PID={} Image=\"{}\"", pid, image);
        self.ctx.os.memory_snapshot(pid, &path)?;
        guard.memdumped.add(guid);
        self.compressor.enqueue(path.clone());
        Ok(Some(path))
    }

    /// Live content of the binary registry value set by the event. A failed
    /// query is written into the artifact instead.
    pub fn registry(&self, ev: &Event) -> Result<Option<PathBuf>, DumpError> {
        if ev.event_id() != sysmon::REG_SET_VALUE || ev.get_str(DETAILS).as_deref() != Some(BINARY_DATA) {
            return Ok(None);
        }
        let Some(target) = ev.get_str(TARGET_OBJECT) else { return Ok(None) };
        let (key, value) = split_registry_path(&target);
        let content = match self.ctx.os.read_registry_value(key, value) {
            Ok(content) => content,
            Err(e) => {
                hids_log!(Level::Error, "actions", "Failed to run reg query: {}", e);
                format!("Error Dumping {target}: {e}")
            }
        };
        self.write_artifact(REG_FILE, content.as_bytes()).map(Some)
    }

    /// The triggering event itself, written once per artifact directory
    /// while the process lives.
    pub fn event(&self, ev: &Event) -> Result<Option<PathBuf>, DumpError> {
        let guard = &self.ctx.guard;
        if guard.event_written(&self.guid, &self.hash) {
            return Ok(None);
        }
        let key = self.dir.join(EVENT_FILE).to_string_lossy().into_owned();
        let Some(_writing) = guard.enter(&key) else { return Ok(None) };
        if guard.event_written(&self.guid, &self.hash) {
            return Ok(None);
        }
        let path = self.write_artifact(EVENT_FILE, &ev.to_json()?)?;
        guard.mark_event(&self.guid, &self.hash);
        Ok(Some(path))
    }
}

/// Every file worth dumping for a detection: the process image and parent
/// image, the files on both command lines, and whatever the event kind
/// points at.
pub fn filedump_set(ev: &Event, track: Option<&ProcessTrack>, archive_dir: &Path) -> BTreeSet<String> {
    let mut set = BTreeSet::new();
    let mut add = |path: Option<String>| {
        if let Some(p) = path.filter(|p| !p.is_empty() && p != UNKNOWN) {
            set.insert(p);
        }
    };

    if let Some(t) = track {
        add(Some(t.image.clone()));
        add(Some(t.parent_image.clone()));
    }

    let cmd = ev.get_str(COMMAND_LINE).or_else(|| track.map(|t| t.command_line.clone()));
    let cwd = ev
        .get_str(CURRENT_DIRECTORY)
        .filter(|c| c != UNKNOWN)
        .or_else(|| track.map(|t| t.current_directory.clone()))
        .unwrap_or_default();
    if let Some(cmd) = cmd {
        files_from_command_line(&cmd, &cwd, true).into_iter().for_each(|f| add(Some(f)));
    }
    if let Some(t) = track {
        files_from_command_line(&t.parent_command_line, &t.parent_current_directory, true)
            .into_iter()
            .for_each(|f| add(Some(f)));
    }

    match ev.event_id() {
        sysmon::FILE_TIME | sysmon::FILE_CREATE | sysmon::CREATE_STREAM_HASH => add(ev.get_str(TARGET_FILENAME)),
        sysmon::DRIVER_LOAD | sysmon::IMAGE_LOAD => add(ev.get_str(IMAGE_LOADED)),
        sysmon::ACCESS_PROCESS => add(ev.get_str(SOURCE_IMAGE)),
        sysmon::REG_SET_VALUE | sysmon::WMI_CONSUMER => {
            let key = if ev.event_id() == sysmon::WMI_CONSUMER { DESTINATION } else { DETAILS };
            if let Some(cl) = ev.get_str(key) {
                argv_from_command_line(&cl).into_iter().for_each(|a| add(Some(a)));
            }
        }
        sysmon::FILE_DELETE | sysmon::FILE_DELETE_DETECTED => {
            add(ev.get_str(IMAGE));
            if ev.get_bool(ARCHIVED) == Some(true) {
                if let (Some(hashes), Some(target)) = (ev.get_str(HASHES), ev.get_str(TARGET_FILENAME)) {
                    add(Some(deleted_file(archive_dir, &hashes, &target).to_string_lossy().into_owned()));
                }
            }
        }
        _ => {
            add(ev.get_str(IMAGE));
            add(ev.get_str(PARENT_IMAGE));
        }
    }
    set
}

fn log_failure(what: &str, ev: &Event, err: &dyn std::fmt::Display) {
    metrics::counter!("hids_dump_failures_total", "kind" => what.to_string()).increment(1);
    hids_log!(Level::Error, "actions", "{} failed for EventID={}: {}", what, ev.event_id(), err);
}

fn count(kind: &'static str) {
    metrics::counter!("hids_dumps_total", "kind" => kind).increment(1);
}

/// Execute a dump job. Runs on the blocking pool.
///
/// Order: memory dump, report, files, registry, then the event itself.
pub fn execute(ctx: &Context, compressor: &CompressionWorker, job: DumpJob) {
    let DumpJob { event, guid, hash, actions, track, ticket } = job;
    let dumper = Dumper::new(ctx, compressor, &guid, &hash);
    let snapshot = track.as_ref().map(|t| t.read().clone());

    if actions.contains(&Action::Memdump) {
        match &snapshot {
            Some(t) => match dumper.memory(&guid, t.pid, &t.image) {
                Ok(Some(_)) => count("memdump"),
                Ok(None) => {}
                Err(e) => log_failure("memdump", &event, &e),
            },
            None => hids_log!(Level::Debug, "actions", "No track for {}, memory dump skipped", guid),
        }
    }
    // settles the barrier whatever the memory dump outcome
    drop(ticket);

    let wants_report = actions.contains(&Action::Report) || actions.contains(&Action::Brief);
    if wants_report && ctx.config.report.enable {
        // a full report supersedes a brief one
        let brief = !actions.contains(&Action::Report);
        hids_log!(Level::Info, "actions", "Generating IR report: {}", guid);
        match dumper.write_json(REPORT_FILE, &report::build(ctx, brief)) {
            Ok(_) => count("report"),
            Err(e) => log_failure("report", &event, &e),
        }
    }

    if actions.contains(&Action::Filedump) {
        for src in filedump_set(&event, snapshot.as_ref(), &ctx.config.sysmon.archive_directory) {
            match dumper.file(&src) {
                Ok(FileDump::Copied) => count("filedump"),
                Ok(_) => {}
                Err(e) => log_failure("filedump", &event, &format!("\"{src}\": {e}")),
            }
        }
    }

    if actions.contains(&Action::Regdump) {
        match dumper.registry(&event) {
            Ok(Some(_)) => count("regdump"),
            Ok(None) => {}
            Err(e) => log_failure("regdump", &event, &e),
        }
    }

    if let Err(e) = dumper.event(&event) {
        log_failure("event dump", &event, &e);
    }
}
