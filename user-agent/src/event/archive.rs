// src/event/archive.rs

//! Names of files kept by Sysmon in its archive directory.
//!
//! Sysmon stores deleted files and clipboard content under names derived
//! from the `Hashes` field with the algorithm prefixes and separators
//! removed.

use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

use shared::basename;

static HASH_NAMES: Lazy<Regex> =
    Lazy::new(|| Regex::new("(((SHA1|MD5|SHA256|IMPHASH)=)|,)").expect("static regex"));

/// `SHA1=AA,MD5=BB` → `AABB`
pub fn strip_hash_names(hashes: &str) -> String {
    HASH_NAMES.replace_all(hashes, "").into_owned()
}

/// Extension of the last path component, dot included (`""` when none).
pub fn extension(path: &str) -> &str {
    let base = basename(path);
    base.rfind('.').map_or("", |i| &base[i..])
}

/// Archived copy of a deleted file.
pub fn deleted_file(archive_dir: &Path, hashes: &str, target: &str) -> PathBuf {
    archive_dir.join(format!("{}{}", strip_hash_names(hashes), extension(target)))
}

/// Archived clipboard content.
pub fn clipboard_file(archive_dir: &Path, hashes: &str) -> PathBuf {
    archive_dir.join(format!("CLIP-{}", strip_hash_names(hashes)))
}
