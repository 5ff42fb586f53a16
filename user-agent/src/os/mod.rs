//! OS integration layer.
//!
//! Everything the response path needs from the operating system sits behind
//! [`OsApi`]. Calls are synchronous and may be slow; the orchestrator runs
//! the expensive ones on the blocking thread pool.

pub mod host;

pub use host::HostOs;

use parking_lot::RwLock;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OsError {
    #[error("process {0} not found")]
    NoSuchProcess(u32),

    #[error("{op} failed for pid {pid}")]
    Refused { op: &'static str, pid: u32 },

    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),

    #[error("{0}")]
    Command(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Black-box OS primitives.
pub trait OsApi: Send + Sync + 'static {
    fn suspend(&self, pid: u32) -> Result<(), OsError>;

    fn terminate(&self, pid: u32) -> Result<(), OsError>;

    fn is_running(&self, pid: u32) -> bool;

    /// Write a full memory snapshot of `pid` to `dest`.
    fn memory_snapshot(&self, pid: u32, dest: &Path) -> Result<(), OsError>;

    /// Textual content of a registry value, read live.
    fn read_registry_value(&self, key: &str, value: &str) -> Result<String, OsError>;

    /// Size in bytes of the value designated by a full registry path.
    fn registry_value_size(&self, target_object: &str) -> Result<i64, OsError>;

    /// Comma separated names of the services hosted by `pid`.
    fn service_names(&self, pid: u32) -> Result<String, OsError>;

    /// Percentage of the main image of `pid` that differs in memory from
    /// its file on disk.
    fn process_integrity(&self, pid: u32) -> Result<f64, OsError>;
}

/// Who the agent itself is, so that no destructive action ever targets it.
#[derive(Debug)]
pub struct AgentIdentity {
    pub pid:   u32,
    pub image: String,
    guid:      RwLock<Option<String>>,
}

impl AgentIdentity {
    pub fn new(pid: u32, image: impl Into<String>) -> Self {
        Self { pid, image: image.into(), guid: RwLock::new(None) }
    }

    /// Identity of the running executable.
    pub fn current() -> Self {
        let image = std::env::current_exe()
            .and_then(|p| p.canonicalize())
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::new(std::process::id(), image)
    }

    pub fn guid(&self) -> Option<String> {
        self.guid.read().clone()
    }

    pub fn set_guid(&self, guid: &str) {
        *self.guid.write() = Some(guid.to_string());
    }

    pub fn is_self_pid(&self, pid: u32) -> bool {
        pid == self.pid
    }

    pub fn is_self_guid(&self, guid: &str) -> bool {
        self.guid.read().as_deref() == Some(guid)
    }

    pub fn is_self_image(&self, image: &str) -> bool {
        !self.image.is_empty() && image.eq_ignore_ascii_case(&self.image)
    }
}
