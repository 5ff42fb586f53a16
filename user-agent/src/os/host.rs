// src/os/host.rs

//! Default [`OsApi`] backed by `sysinfo` and the stock Windows tools.

use super::{OsApi, OsError};
use crate::hids_log;
use log::Level;
use parking_lot::Mutex;
use std::{path::Path, process::Command};
use sysinfo::{Pid, Signal, System};

pub struct HostOs {
    sys: Mutex<System>,
}

impl Default for HostOs {
    fn default() -> Self {
        Self { sys: Mutex::new(System::new()) }
    }
}

impl HostOs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refresh one process and apply `f` to it.
    fn with_process<T>(
        &self,
        pid: u32,
        f: impl FnOnce(&sysinfo::Process) -> T,
    ) -> Result<T, OsError> {
        let mut sys = self.sys.lock();
        let spid = Pid::from_u32(pid);
        if !sys.refresh_process(spid) {
            return Err(OsError::NoSuchProcess(pid));
        }
        sys.process(spid).map(f).ok_or(OsError::NoSuchProcess(pid))
    }
}

fn run(cmd: &mut Command) -> Result<String, OsError> {
    let out = cmd.output()?;
    if !out.status.success() {
        return Err(OsError::Command(String::from_utf8_lossy(&out.stderr).trim().to_string()));
    }
    Ok(String::from_utf8_lossy(&out.stdout).into_owned())
}

impl OsApi for HostOs {
    fn suspend(&self, pid: u32) -> Result<(), OsError> {
        match self.with_process(pid, |p| p.kill_with(Signal::Stop))? {
            Some(true) => Ok(()),
            Some(false) => Err(OsError::Refused { op: "suspend", pid }),
            None => Err(OsError::Unsupported("process suspension")),
        }
    }

    fn terminate(&self, pid: u32) -> Result<(), OsError> {
        if self.with_process(pid, |p| p.kill())? {
            hids_log!(Level::Debug, "os", "Terminated pid={}", pid);
            Ok(())
        } else {
            Err(OsError::Refused { op: "terminate", pid })
        }
    }

    fn is_running(&self, pid: u32) -> bool {
        self.with_process(pid, |_| ()).is_ok()
    }

    fn memory_snapshot(&self, _pid: u32, _dest: &Path) -> Result<(), OsError> {
        Err(OsError::Unsupported("memory snapshot"))
    }

    fn read_registry_value(&self, key: &str, value: &str) -> Result<String, OsError> {
        let key = key.trim_end_matches('\\');
        run(Command::new("reg").args(["query", key, "/v", value]))
    }

    fn registry_value_size(&self, _target_object: &str) -> Result<i64, OsError> {
        Err(OsError::Unsupported("registry value size"))
    }

    #[cfg(windows)]
    fn service_names(&self, pid: u32) -> Result<String, OsError> {
        // "Image Name","PID","Services"
        let out = run(Command::new("tasklist").args([
            "/svc",
            "/fo",
            "csv",
            "/nh",
            "/fi",
            &format!("PID eq {pid}"),
        ]))?;
        let line = out.lines().next().ok_or(OsError::NoSuchProcess(pid))?;
        let services = line
            .rsplit("\",\"")
            .next()
            .map(|s| s.trim_matches('"').trim())
            .unwrap_or_default();
        Ok(if services == "N/A" { String::new() } else { services.to_string() })
    }

    #[cfg(not(windows))]
    fn service_names(&self, _pid: u32) -> Result<String, OsError> {
        Err(OsError::Unsupported("service lookup"))
    }

    fn process_integrity(&self, _pid: u32) -> Result<f64, OsError> {
        Err(OsError::Unsupported("process integrity"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_process_is_running() {
        let os = HostOs::new();
        assert!(os.is_running(std::process::id()));
        assert!(!os.is_running(u32::MAX - 1));
    }

    #[test]
    fn memory_snapshot_is_reported_unsupported() {
        let os = HostOs::new();
        let err = os.memory_snapshot(1, Path::new("/tmp/x.dmp")).unwrap_err();
        assert!(matches!(err, OsError::Unsupported(_)));
    }
}
