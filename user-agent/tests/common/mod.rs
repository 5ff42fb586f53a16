// tests/common/mod.rs
#![allow(dead_code)]

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread::sleep,
    time::Duration,
};

use parking_lot::Mutex;
use tempfile::TempDir;

use agent::config::Config;
use agent::event::{Detection, Event, fields::*};
use agent::os::{AgentIdentity, OsApi, OsError};
use agent::Agent;

pub const SELF_PID: u32 = 1;
pub const SELF_IMAGE: &str = r"C:\Program Files\Hids\agent.exe";

/// Records every destructive call, in order. Memory snapshots record
/// `memdump:<pid>` once the (optionally slow) dump completed. Lookups are
/// only counted.
#[derive(Default)]
pub struct FakeOs {
    pub calls:           Mutex<Vec<String>>,
    pub running:         Mutex<HashSet<u32>>,
    pub memdump_delay:   Duration,
    /// Answer of the service lookup; `FakeSvc` when unset.
    pub services:        Option<String>,
    pub service_lookups: AtomicUsize,
    pub registry_fails:  bool,
    pub integrity:       f64,
}

impl FakeOs {
    pub fn new(pids: &[u32]) -> Self {
        Self { running: Mutex::new(pids.iter().copied().collect()), ..Default::default() }
    }

    pub fn with_running(pids: &[u32]) -> Arc<Self> {
        Arc::new(Self::new(pids))
    }

    pub fn slow(pids: &[u32], memdump_delay: Duration) -> Arc<Self> {
        Arc::new(Self { memdump_delay, ..Self::new(pids) })
    }

    pub fn service_lookups(&self) -> usize {
        self.service_lookups.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls.lock().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls.lock().iter().position(|c| c == call)
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

impl OsApi for FakeOs {
    fn suspend(&self, pid: u32) -> Result<(), OsError> {
        self.record(format!("suspend:{pid}"));
        Ok(())
    }

    fn terminate(&self, pid: u32) -> Result<(), OsError> {
        self.record(format!("terminate:{pid}"));
        self.running.lock().remove(&pid);
        Ok(())
    }

    fn is_running(&self, pid: u32) -> bool {
        self.running.lock().contains(&pid)
    }

    fn memory_snapshot(&self, pid: u32, dest: &Path) -> Result<(), OsError> {
        sleep(self.memdump_delay);
        fs::write(dest, b"MDMP")?;
        self.record(format!("memdump:{pid}"));
        Ok(())
    }

    fn read_registry_value(&self, key: &str, value: &str) -> Result<String, OsError> {
        if self.registry_fails {
            return Err(OsError::Command(format!("reg query {key} /v {value}: access denied")));
        }
        Ok(format!("{value}    REG_BINARY    DEADBEEF"))
    }

    fn registry_value_size(&self, _target_object: &str) -> Result<i64, OsError> {
        Ok(4)
    }

    fn service_names(&self, _pid: u32) -> Result<String, OsError> {
        self.service_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.services.clone().unwrap_or_else(|| "FakeSvc".into()))
    }

    fn process_integrity(&self, pid: u32) -> Result<f64, OsError> {
        self.record(format!("integrity:{pid}"));
        Ok(self.integrity)
    }
}

/// Defaults with every artifact under `root`, no compression, no persisted
/// state and no detection log.
pub fn test_config(root: &TempDir) -> Config {
    let mut cfg = Config::default();
    cfg.dump.dir = root.path().join("dumps");
    cfg.dump.compression = false;
    cfg.dump.kill_wait = Duration::from_secs(5);
    cfg.state.path = None;
    cfg.database.enable = false;
    cfg.report.commands.clear();
    cfg.sysmon.archive_directory = root.path().join("archive");
    cfg
}

pub fn new_agent(cfg: Config, os: Arc<FakeOs>) -> Agent {
    Agent::new(cfg, os, AgentIdentity::new(SELF_PID, SELF_IMAGE))
}

pub fn process_create(guid: &str, pid: u32, image: &str, parent_guid: &str, parent_image: &str) -> Event {
    Event::new(SYSMON_CHANNEL, sysmon::PROCESS_CREATE)
        .with(PROCESS_GUID, guid)
        .with(PROCESS_ID, pid.to_string())
        .with(IMAGE, image)
        .with(COMMAND_LINE, image)
        .with(CURRENT_DIRECTORY, r"C:\Users\alice\")
        .with(USER, r"CORP\alice")
        .with(INTEGRITY_LEVEL, "Medium")
        .with(HASHES, "SHA256=00AA")
        .with(PARENT_PROCESS_GUID, parent_guid)
        .with(PARENT_IMAGE, parent_image)
}

pub fn detected(mut ev: Event, criticality: i64, actions: &[&str]) -> Event {
    ev.set_detection(Detection {
        criticality,
        actions: actions.iter().map(|a| a.to_string()).collect(),
        signatures: vec!["TestRule".into()],
    });
    ev
}

/// Network connection from `guid`; `n` makes each event distinct.
pub fn connection(guid: &str, n: u16) -> Event {
    Event::new(SYSMON_CHANNEL, sysmon::NETWORK_CONNECT)
        .with(PROCESS_GUID, guid)
        .with(IMAGE, r"C:\Windows\System32\cmd.exe")
        .with(DESTINATION_IP, "10.0.0.1")
        .with(DESTINATION_PORT, (4000 + n).to_string())
        .with(UTC_TIME, "2024-01-01 00:00:00.000")
}

/// Sysmon registry value set by `guid`.
pub fn registry_set(guid: &str, target: &str, details: &str) -> Event {
    Event::new(SYSMON_CHANNEL, sysmon::REG_SET_VALUE)
        .with(PROCESS_GUID, guid)
        .with(EVENT_TYPE, "SetValue")
        .with(TARGET_OBJECT, target)
        .with(DETAILS, details)
}

/// Every file below `root` whose name ends with `suffix`.
pub fn files_with_suffix(root: &Path, suffix: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.to_string_lossy().ends_with(suffix) {
                found.push(path);
            }
        }
    }
    found
}
