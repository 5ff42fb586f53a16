//! Persistent response state with HMAC integrity.
//!
//! The blacklist and the set of already-dumped file hashes survive restarts
//! in a small JSON snapshot signed with HMAC-SHA256. A snapshot whose
//! signature does not verify is ignored and the agent starts empty.
//!
//! Saving writes to a temporary file in the same directory and renames it
//! over the previous snapshot, so a failed write leaves the old one intact.

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::hids_log;
use log::Level;

type HmacSha256 = Hmac<Sha256>;

/// Everything worth keeping across restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    /// Blacklisted command lines.
    pub blacklist: BTreeSet<String>,
    /// SHA-256 of file bodies already present in the dump store.
    pub dumped_hashes: BTreeSet<String>,
}

/// Snapshot data plus its signature.
#[derive(Serialize, Deserialize)]
struct StateWrapper {
    data: PersistedState,
    /// HMAC signature (hex-encoded) for the data field.
    signature: String,
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot replace state file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("invalid state key")]
    Key,
}

/// Computes an HMAC signature (hex-encoded) for the given data.
fn compute_signature(key: &[u8], data: &str) -> Result<String, StateError> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| StateError::Key)?;
    mac.update(data.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Loads the snapshot from disk. Missing, unreadable or tampered snapshots
/// yield an empty state.
pub fn load_state<P: AsRef<Path>>(path: P, key: &[u8]) -> PersistedState {
    let path = path.as_ref();
    let Ok(file) = File::open(path) else {
        return PersistedState::default();
    };
    let wrapper: StateWrapper = match serde_json::from_reader(BufReader::new(file)) {
        Ok(w) => w,
        Err(e) => {
            hids_log!(Level::Warn, "state", "Unreadable state {:?}: {}", path, e);
            return PersistedState::default();
        }
    };
    let verified = serde_json::to_string_pretty(&wrapper.data)
        .map_err(StateError::from)
        .and_then(|json| compute_signature(key, &json))
        .is_ok_and(|sig| sig == wrapper.signature);
    if !verified {
        hids_log!(Level::Warn, "state", "State signature mismatch, starting with an empty state");
        return PersistedState::default();
    }
    wrapper.data
}

/// Saves the snapshot with an HMAC signature, atomically replacing `path`.
pub fn save_state<P: AsRef<Path>>(path: P, key: &[u8], state: &PersistedState) -> Result<(), StateError> {
    let path = path.as_ref();
    let json_data = serde_json::to_string_pretty(state)?;
    let wrapper = StateWrapper { signature: compute_signature(key, &json_data)?, data: state.clone() };
    let serialized = serde_json::to_string_pretty(&wrapper)?;

    let dir = match path.parent() {
        Some(d) if !d.as_os_str().is_empty() => d,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(serialized.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;
    hids_log!(
        Level::Debug,
        "state",
        "Saved state to {:?} ({} blacklisted, {} hashes)",
        path,
        state.blacklist.len(),
        state.dumped_hashes.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> PersistedState {
        PersistedState {
            blacklist: ["evil.exe -x".to_string()].into(),
            dumped_hashes: ["ab".repeat(32)].into(),
        }
    }

    #[test]
    fn signed_snapshot_is_restored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        save_state(&path, b"k", &sample()).unwrap();
        assert_eq!(load_state(&path, b"k"), sample());
    }

    #[test]
    fn wrong_key_or_tampering_yields_empty_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        save_state(&path, b"k", &sample()).unwrap();
        assert_eq!(load_state(&path, b"other"), PersistedState::default());

        let txt = std::fs::read_to_string(&path).unwrap().replace("evil.exe", "good.exe");
        std::fs::write(&path, txt).unwrap();
        assert_eq!(load_state(&path, b"k"), PersistedState::default());
    }

    #[test]
    fn failed_save_keeps_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        save_state(&path, b"k", &sample()).unwrap();

        // target directory vanished: nothing is written, nothing is lost
        let missing = dir.path().join("gone").join("state.json");
        assert!(save_state(&missing, b"k", &PersistedState::default()).is_err());
        assert_eq!(load_state(&path, b"k"), sample());
    }

    #[test]
    fn missing_file_is_empty() {
        assert_eq!(load_state("/nonexistent/state.json", b"k"), PersistedState::default());
    }
}
