// tests/agent_core.rs

mod common;

use std::{fs, sync::Arc, time::Duration};

use tempfile::TempDir;

use agent::event::fields::*;
use shared::artifact_dir;
use shared::constants::{EVENT_FILE, REG_FILE, REPORT_FILE};

use common::*;

const EXPLORER: &str = r"C:\Windows\explorer.exe";
const CMD: &str = r"C:\Windows\System32\cmd.exe";

#[tokio::test(flavor = "multi_thread")]
async fn detection_on_child_writes_event_and_report() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    let root = cfg.dump.dir.clone();
    let os = FakeOs::with_running(&[10, 11]);
    let agent = new_agent(cfg, os.clone());

    let g0 = agent.process(process_create("{G0}", 10, EXPLORER, "{GX}", r"C:\Windows\userinit.exe"));
    assert_eq!(g0.get_str(ANCESTORS).as_deref(), Some(r"C:\Windows\userinit.exe"));

    let g1 = agent.process(process_create("{G1}", 11, CMD, "{G0}", EXPLORER));
    assert_eq!(
        g1.get_str(ANCESTORS).as_deref(),
        Some(r"C:\Windows\userinit.exe|C:\Windows\explorer.exe")
    );
    assert_eq!(g1.get_str(PARENT_USER).as_deref(), Some(r"CORP\alice"));

    let mut hit = detected(connection("{G1}", 1), 7, &["filedump", "report"]);
    let handled = agent.process_with_outcome(&mut hit).expect("detection");
    assert!(handled.queued);
    assert!(!handled.refused);
    agent.shutdown().await;

    let dir = artifact_dir(&root, "{G1}", &hit.content_hash());
    assert!(dir.join(EVENT_FILE).is_file());
    let report: serde_json::Value = serde_json::from_slice(&fs::read(dir.join(REPORT_FILE)).unwrap()).unwrap();
    assert_eq!(report["brief"], false);
    assert!(files_with_suffix(&root, ".dmp").is_empty());
    assert_eq!(os.count("memdump"), 0);

    let track = agent.process_snapshot("{G1}").unwrap();
    assert_eq!(track.ancestors, vec![r"C:\Windows\userinit.exe".to_string(), EXPLORER.to_string()]);
    assert_eq!(track.score.criticality, 7);
    assert_eq!(track.dump_count, 1);

    let listed = agent.artifacts(chrono::Utc::now() - chrono::Duration::hours(1)).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].process_guid, "G1");
}

#[tokio::test(flavor = "multi_thread")]
async fn memory_is_dumped_once_per_process() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    let root = cfg.dump.dir.clone();
    let os = FakeOs::slow(&[100], Duration::from_millis(100));
    let agent = new_agent(cfg, os.clone());

    agent.process(process_create("{G1}", 100, CMD, "{G0}", EXPLORER));
    for n in 0..3 {
        let handled = agent.process_with_outcome(&mut detected(connection("{G1}", n), 10, &["memdump"]));
        assert!(handled.unwrap().queued);
    }
    agent.shutdown().await;

    assert_eq!(os.count("memdump:100"), 1);
    assert_eq!(files_with_suffix(&root, ".dmp").len(), 1);
    // every detection still records its event
    assert_eq!(files_with_suffix(&root, EVENT_FILE).len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn identical_content_is_copied_once() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    let root = cfg.dump.dir.clone();
    let agent = new_agent(cfg, FakeOs::with_running(&[100]));

    let drops = tmp.path().join("drops");
    fs::create_dir_all(&drops).unwrap();
    let a = drops.join("a.exe");
    let b = drops.join("b.exe");
    fs::write(&a, b"MZ same payload").unwrap();
    fs::write(&b, b"MZ same payload").unwrap();

    agent.process(process_create("{G1}", 100, CMD, "{G0}", EXPLORER));
    for target in [&a, &b] {
        let ev = agent::Event::new(SYSMON_CHANNEL, sysmon::FILE_CREATE)
            .with(PROCESS_GUID, "{G1}")
            .with(IMAGE, CMD)
            .with(TARGET_FILENAME, target.to_string_lossy().into_owned());
        agent.process(detected(ev, 8, &["filedump"]));
    }
    agent.shutdown().await;

    assert_eq!(files_with_suffix(&root, ".bin").len(), 1);
    let sidecars = files_with_suffix(&root, ".sha256");
    assert_eq!(sidecars.len(), 2);
    let digests: Vec<_> = sidecars.iter().map(|p| fs::read_to_string(p).unwrap()).collect();
    assert_eq!(digests[0], digests[1]);
    assert_eq!(digests[0].len(), 64);
}

#[tokio::test(flavor = "multi_thread")]
async fn dump_budget_is_enforced_per_process() {
    let tmp = TempDir::new().unwrap();
    let mut cfg = test_config(&tmp);
    cfg.dump.max_dumps = 2;
    let root = cfg.dump.dir.clone();
    let agent = new_agent(cfg, FakeOs::with_running(&[100]));

    agent.process(process_create("{G1}", 100, CMD, "{G0}", EXPLORER));
    let outcomes: Vec<_> = (0..3)
        .map(|n| agent.process_with_outcome(&mut detected(connection("{G1}", n), 6, &["brief"])).unwrap())
        .collect();
    agent.shutdown().await;

    assert!(outcomes[0].queued && outcomes[1].queued);
    assert!(outcomes[2].refused);
    assert!(!outcomes[2].queued);
    assert_eq!(files_with_suffix(&root, REPORT_FILE).len(), 2);
    assert_eq!(agent.process_snapshot("{G1}").unwrap().dump_count, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn untracked_process_only_dumped_when_allowed() {
    let tmp = TempDir::new().unwrap();
    let agent = new_agent(test_config(&tmp), FakeOs::with_running(&[]));
    let handled = agent.process_with_outcome(&mut detected(connection("{NOPE}", 0), 9, &["report"])).unwrap();
    agent.shutdown().await;
    assert!(handled.refused);

    let tmp = TempDir::new().unwrap();
    let mut cfg = test_config(&tmp);
    cfg.dump.dump_untracked = true;
    let root = cfg.dump.dir.clone();
    let agent = new_agent(cfg, FakeOs::with_running(&[]));
    let handled = agent.process_with_outcome(&mut detected(connection("{NOPE}", 0), 9, &["report"])).unwrap();
    agent.shutdown().await;
    assert!(handled.queued);
    assert_eq!(files_with_suffix(&root, REPORT_FILE).len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn kill_waits_for_memory_dump() {
    let tmp = TempDir::new().unwrap();
    let os = FakeOs::slow(&[100], Duration::from_millis(300));
    let agent = new_agent(test_config(&tmp), os.clone());

    agent.process(process_create("{G1}", 100, CMD, "{G0}", EXPLORER));
    let handled = agent
        .process_with_outcome(&mut detected(connection("{G1}", 0), 10, &["memdump", "kill"]))
        .unwrap();
    assert!(handled.suspended);
    // suspended synchronously, terminated only after the dump
    assert_eq!(os.position("suspend:100"), Some(0));
    assert_eq!(os.count("terminate"), 0);

    agent.shutdown().await;
    let dumped = os.position("memdump:100").expect("memory dumped");
    let killed = os.position("terminate:100").expect("terminated");
    assert!(dumped < killed, "calls: {:?}", os.calls());
}

#[tokio::test(flavor = "multi_thread")]
async fn kill_proceeds_when_dump_overruns() {
    let tmp = TempDir::new().unwrap();
    let mut cfg = test_config(&tmp);
    cfg.dump.kill_wait = Duration::from_millis(100);
    let os = FakeOs::slow(&[100], Duration::from_millis(1_000));
    let agent = new_agent(cfg, os.clone());

    agent.process(process_create("{G1}", 100, CMD, "{G0}", EXPLORER));
    agent.process(detected(connection("{G1}", 0), 10, &["memdump", "kill"]));
    agent.shutdown().await;

    let killed = os.position("terminate:100").expect("terminated");
    let dumped = os.position("memdump:100").expect("dump still completes");
    assert!(killed < dumped, "calls: {:?}", os.calls());
}

#[tokio::test(flavor = "multi_thread")]
async fn kill_without_memdump_is_immediate() {
    let tmp = TempDir::new().unwrap();
    let os = FakeOs::with_running(&[100]);
    let agent = new_agent(test_config(&tmp), os.clone());

    agent.process(process_create("{G1}", 100, CMD, "{G0}", EXPLORER));
    agent.process(detected(connection("{G1}", 0), 10, &["kill"]));
    assert_eq!(os.calls(), vec!["suspend:100".to_string(), "terminate:100".to_string()]);
    agent.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn kill_waits_for_dump_of_earlier_detection() {
    let tmp = TempDir::new().unwrap();
    let os = FakeOs::slow(&[100], Duration::from_millis(300));
    let agent = new_agent(test_config(&tmp), os.clone());

    agent.process(process_create("{G1}", 100, CMD, "{G0}", EXPLORER));
    agent.process(detected(connection("{G1}", 0), 8, &["memdump"]));
    agent.process(detected(connection("{G1}", 1), 10, &["kill"]));
    assert_eq!(os.count("terminate"), 0, "calls: {:?}", os.calls());

    agent.shutdown().await;
    let dumped = os.position("memdump:100").expect("memory dumped");
    let killed = os.position("terminate:100").expect("terminated");
    assert!(dumped < killed, "calls: {:?}", os.calls());
}

#[tokio::test(flavor = "multi_thread")]
async fn agent_never_acts_on_itself() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    let root = cfg.dump.dir.clone();
    let os = FakeOs::with_running(&[SELF_PID]);
    let agent = new_agent(cfg, os.clone());

    agent.process(process_create("{SELF}", SELF_PID, SELF_IMAGE, "{SVC}", r"C:\Windows\System32\services.exe"));
    assert!(agent.context().identity.is_self_guid("{SELF}"));

    let actions = ["kill", "blacklist", "memdump", "filedump", "report"];
    let handled = agent.process_with_outcome(&mut detected(connection("{SELF}", 0), 10, &actions));
    agent.shutdown().await;

    let handled = handled.unwrap();
    assert!(handled.actions.is_empty());
    assert!(os.calls().is_empty());
    assert!(!root.exists() || files_with_suffix(&root, "").is_empty());
    // self detections do not feed the score either
    assert_eq!(agent.process_snapshot("{SELF}").unwrap().score.criticality, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn blacklisted_command_line_is_killed_on_start() {
    let tmp = TempDir::new().unwrap();
    let os = FakeOs::with_running(&[100, 200]);
    let agent = new_agent(test_config(&tmp), os.clone());
    let evil = r"C:\Temp\evil.exe --beacon 10.0.0.5";

    agent.process(process_create("{G1}", 100, CMD, "{G0}", EXPLORER).with(COMMAND_LINE, evil));
    let handled = agent
        .process_with_outcome(&mut detected(connection("{G1}", 0), 9, &["blacklist"]))
        .unwrap();
    assert!(handled.blacklisted);
    assert!(agent.process_snapshot("{G1}").unwrap().blacklisted);
    assert!(os.calls().is_empty());

    agent.process(process_create("{G2}", 200, CMD, "{G0}", EXPLORER).with(COMMAND_LINE, evil));
    assert_eq!(os.calls(), vec!["terminate:200".to_string()]);
    agent.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn low_criticality_gets_no_response() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    let root = cfg.dump.dir.clone();
    let os = FakeOs::with_running(&[100]);
    let agent = new_agent(cfg, os.clone());

    agent.process(process_create("{G1}", 100, CMD, "{G0}", EXPLORER));
    let ev = agent.process(detected(connection("{G1}", 0), 2, &["kill", "memdump"]));
    agent.shutdown().await;

    assert!(ev.detection().unwrap().actions.is_empty());
    assert!(os.calls().is_empty());
    assert!(!root.exists());
    // the score still moves
    assert_eq!(agent.process_snapshot("{G1}").unwrap().score.criticality, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn untracked_events_get_unknown_markers() {
    let tmp = TempDir::new().unwrap();
    let agent = new_agent(test_config(&tmp), FakeOs::with_running(&[]));

    let ev = agent.process(connection("{GHOST}", 0));
    for key in [COMMAND_LINE, USER, INTEGRITY_LEVEL, CURRENT_DIRECTORY, IMAGE_HASHES, CONNECTION_COUNT] {
        assert_eq!(ev.get_str(key).as_deref(), Some(UNKNOWN), "{key}");
    }
    assert_eq!(ev.get_str(PROCESS_SCORE).as_deref(), Some(UNKNOWN_NUMBER));
    assert!(ev.detection().is_none());
    agent.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn tracked_events_are_backfilled() {
    let tmp = TempDir::new().unwrap();
    let agent = new_agent(test_config(&tmp), FakeOs::with_running(&[100]));

    agent.process(process_create("{G1}", 100, CMD, "{G0}", EXPLORER));
    let first = agent.process(connection("{G1}", 0).with(PROCESS_ID, "100"));
    let again = agent.process(connection("{G1}", 0).with(UTC_TIME, "2024-01-01 00:00:05.000"));
    let second = agent.process(connection("{G1}", 1));
    agent.shutdown().await;

    assert_eq!(first.get_str(USER).as_deref(), Some(r"CORP\alice"));
    assert_eq!(first.get_str(IMAGE_HASHES).as_deref(), Some("SHA256=00AA"));
    assert_eq!(first.get_str(CONNECTION_COUNT).as_deref(), Some("1"));
    // counted per distinct endpoint
    assert_eq!(again.get_str(CONNECTION_COUNT).as_deref(), Some("1"));
    assert_eq!(second.get_str(CONNECTION_COUNT).as_deref(), Some("2"));
    assert_eq!(first.get_str(SERVICES).as_deref(), Some("FakeSvc"));
}

#[tokio::test(flavor = "multi_thread")]
async fn terminated_process_releases_its_track() {
    let tmp = TempDir::new().unwrap();
    let agent = new_agent(test_config(&tmp), FakeOs::with_running(&[100]));

    agent.process(process_create("{G1}", 100, CMD, "{G0}", EXPLORER));
    assert!(agent.process_snapshot("{G1}").is_some());
    agent.process(
        agent::Event::new(SYSMON_CHANNEL, sysmon::PROCESS_TERMINATE)
            .with(PROCESS_GUID, "{G1}")
            .with(PROCESS_ID, "100"),
    );
    assert!(agent.process_snapshot("{G1}").is_none());
    agent.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn blacklist_survives_restart() {
    let tmp = TempDir::new().unwrap();
    let mut cfg = test_config(&tmp);
    cfg.state.path = Some(tmp.path().join("state.json"));
    let evil = r"C:\Temp\evil.exe /persist";

    let first = new_agent(cfg.clone(), FakeOs::with_running(&[100]));
    first.process(process_create("{G1}", 100, CMD, "{G0}", EXPLORER).with(COMMAND_LINE, evil));
    first.process(detected(connection("{G1}", 0), 9, &["blacklist"]));
    first.shutdown().await;
    assert!(tmp.path().join("state.json").is_file());

    let os = FakeOs::with_running(&[200]);
    let second = new_agent(cfg, os.clone());
    assert!(second.context().store.is_blacklisted(evil));
    second.process(process_create("{G2}", 200, CMD, "{G0}", EXPLORER).with(COMMAND_LINE, evil));
    assert_eq!(os.calls(), vec!["terminate:200".to_string()]);
    second.shutdown().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_service_answer_is_cached() {
    let tmp = TempDir::new().unwrap();
    let os = Arc::new(FakeOs { services: Some(String::new()), ..FakeOs::new(&[100]) });
    let agent = new_agent(test_config(&tmp), os.clone());

    agent.process(process_create("{G1}", 100, CMD, "{G0}", EXPLORER));
    for n in 0..50 {
        let ev = agent.process(connection("{G1}", n).with(PROCESS_ID, "100"));
        assert_eq!(ev.get_str(SERVICES).as_deref(), Some(UNKNOWN));
    }
    agent.shutdown().await;

    assert_eq!(os.service_lookups(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn event_markers_are_released_with_the_process() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    let root = cfg.dump.dir.clone();
    let agent = new_agent(cfg, FakeOs::with_running(&[100]));

    agent.process(process_create("{G1}", 100, CMD, "{G0}", EXPLORER));
    agent.process(detected(connection("{G1}", 0), 6, &["brief"]));
    agent.shutdown().await;
    assert_eq!(files_with_suffix(&root, EVENT_FILE).len(), 1);
    assert_eq!(agent.context().guard.event_markers("{G1}"), 1);

    agent.process(
        agent::Event::new(SYSMON_CHANNEL, sysmon::PROCESS_TERMINATE)
            .with(PROCESS_GUID, "{G1}")
            .with(PROCESS_ID, "100"),
    );
    assert_eq!(agent.context().guard.event_markers("{G1}"), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn binary_registry_value_is_dumped() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    let root = cfg.dump.dir.clone();
    let agent = new_agent(cfg, FakeOs::with_running(&[100]));

    agent.process(process_create("{G1}", 100, CMD, "{G0}", EXPLORER));
    let hit = agent.process(detected(
        registry_set("{G1}", r"HKLM\Software\Microsoft\Windows\CurrentVersion\Run\evil", BINARY_DATA),
        9,
        &["regdump"],
    ));
    agent.shutdown().await;

    let reg = artifact_dir(&root, "{G1}", &hit.content_hash()).join(REG_FILE);
    let content = fs::read_to_string(reg).unwrap();
    assert_eq!(content, "evil    REG_BINARY    DEADBEEF");
}

#[tokio::test(flavor = "multi_thread")]
async fn textual_registry_value_is_not_dumped() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    let root = cfg.dump.dir.clone();
    let agent = new_agent(cfg, FakeOs::with_running(&[100]));

    agent.process(process_create("{G1}", 100, CMD, "{G0}", EXPLORER));
    agent.process(detected(
        registry_set("{G1}", r"HKLM\Software\Microsoft\Windows\CurrentVersion\Run\evil", r"C:\Temp\evil.exe"),
        9,
        &["regdump"],
    ));
    agent.shutdown().await;

    assert_eq!(files_with_suffix(&root, EVENT_FILE).len(), 1);
    assert!(files_with_suffix(&root, REG_FILE).is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_registry_read_is_written_to_artifact() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp);
    let root = cfg.dump.dir.clone();
    let os = Arc::new(FakeOs { registry_fails: true, ..FakeOs::new(&[100]) });
    let agent = new_agent(cfg, os);

    agent.process(process_create("{G1}", 100, CMD, "{G0}", EXPLORER));
    agent.process(detected(registry_set("{G1}", r"HKCU\Environment\blob", BINARY_DATA), 9, &["regdump"]));
    agent.shutdown().await;

    let found = files_with_suffix(&root, REG_FILE);
    assert_eq!(found.len(), 1);
    let content = fs::read_to_string(&found[0]).unwrap();
    assert!(content.starts_with(r"Error Dumping HKCU\Environment\blob"), "{content}");
}

#[tokio::test(flavor = "multi_thread")]
async fn tampered_process_integrity_is_measured() {
    let tmp = TempDir::new().unwrap();
    let os = Arc::new(FakeOs { integrity: 12.3456, ..FakeOs::new(&[SELF_PID, 100]) });
    let agent = new_agent(test_config(&tmp), os.clone());
    let tampering = |pid: u32| {
        agent::Event::new(SYSMON_CHANNEL, sysmon::PROCESS_TAMPERING)
            .with(PROCESS_GUID, "{T}")
            .with(PROCESS_ID, pid.to_string())
            .with(EVENT_TYPE, "Image is replaced")
    };

    let ev = agent.process(tampering(100));
    assert_eq!(ev.get_str(PROCESS_INTEGRITY).as_deref(), Some("12.35"));

    // gone already
    let ev = agent.process(tampering(555));
    assert_eq!(ev.get_str(PROCESS_INTEGRITY).as_deref(), Some(UNKNOWN_NUMBER));

    let ev = agent.process(tampering(SELF_PID));
    assert_eq!(ev.get_str(PROCESS_INTEGRITY).as_deref(), Some(UNKNOWN_NUMBER));

    let ev = agent.process(connection("{T}", 0).with(PROCESS_ID, "100"));
    assert!(!ev.has(PROCESS_INTEGRITY));
    agent.shutdown().await;

    assert_eq!(os.count("integrity"), 1);
}
