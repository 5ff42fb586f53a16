// tests/layout_listing.rs

use chrono::{Duration, Utc};
use shared::constants::{EVENT_FILE, REPORT_FILE};
use shared::{artifact_dir, list_dumps};
use std::fs;
use tempfile::TempDir;

#[test]
fn lists_event_directories_with_their_files() {
    let root = TempDir::new().unwrap();
    let dir = artifact_dir(root.path(), "{AAAA-1}", "deadbeef");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(EVENT_FILE), b"{}").unwrap();
    fs::write(dir.join(REPORT_FILE), b"{\"x\":1}").unwrap();

    let since = Utc::now() - Duration::hours(1);
    let dumps = list_dumps(root.path(), since).unwrap();

    assert_eq!(dumps.len(), 1);
    let d = &dumps[0];
    assert_eq!(d.process_guid, "AAAA-1");
    assert_eq!(d.event_hash, "deadbeef");
    let names: Vec<_> = d.files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec![EVENT_FILE, REPORT_FILE]);
    assert_eq!(d.files[1].size, 7);
    assert!(d.created <= d.modification);

    let json = serde_json::to_value(d).unwrap();
    assert!(json.get("process-guid").is_some());
    assert!(json.get("event-hash").is_some());
    assert!(json.get("creation").is_some());
}

#[test]
fn older_dumps_and_empty_directories_are_skipped() {
    let root = TempDir::new().unwrap();
    let dir = artifact_dir(root.path(), "G1", "h1");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(EVENT_FILE), b"{}").unwrap();
    fs::create_dir_all(artifact_dir(root.path(), "G2", "empty")).unwrap();
    // stray files at the guid level are ignored
    fs::write(root.path().join("G1").join("stray.txt"), b"x").unwrap();

    let future = Utc::now() + Duration::hours(1);
    assert!(list_dumps(root.path(), future).unwrap().is_empty());

    let past = Utc::now() - Duration::hours(1);
    let dumps = list_dumps(root.path(), past).unwrap();
    assert_eq!(dumps.len(), 1);
    assert_eq!(dumps[0].process_guid, "G1");
}
