// src/enrich/crossref.rs

//! Cross-referencing of arbitrary events with the process table.

use super::{EnrichError, Enricher, Stage};
use crate::context::Context;
use crate::event::{Event, fields::*};
use crate::tracker::TrackRef;

/// Source and target GUID keys of a cross-process event. Remote thread
/// creation spells them differently from process access.
pub(crate) fn cross_process_keys(event_id: i64) -> (&'static str, &'static str) {
    if event_id == sysmon::CREATE_REMOTE_THREAD {
        (CRT_SOURCE_PROCESS_GUID, CRT_TARGET_PROCESS_GUID)
    } else {
        (SOURCE_PROCESS_GUID, TARGET_PROCESS_GUID)
    }
}

pub(crate) fn is_cross_process(event_id: i64) -> bool {
    matches!(event_id, sysmon::CREATE_REMOTE_THREAD | sysmon::ACCESS_PROCESS)
}

/// Backfills the standard process fields on any Sysmon event from the
/// emitting process's track.
pub struct CrossReference;

impl CrossReference {
    fn cross_process(ev: &mut Event, ctx: &Context) {
        for key in [
            SOURCE_USER,
            SOURCE_INTEGRITY_LEVEL,
            TARGET_USER,
            TARGET_INTEGRITY_LEVEL,
            TARGET_PARENT_PROCESS_GUID,
            SOURCE_HASHES,
            TARGET_HASHES,
        ] {
            ev.set(key, UNKNOWN);
        }
        ev.set(SOURCE_PROCESS_SCORE, UNKNOWN_NUMBER);
        ev.set(TARGET_PROCESS_SCORE, UNKNOWN_NUMBER);

        let (skey, tkey) = cross_process_keys(ev.event_id());
        let lookup = |key: &str| ev.get_str(key).and_then(|g| ctx.store.get_by_guid(&g));
        let (source, target) = (lookup(skey), lookup(tkey));

        if let Some(s) = source {
            let s = s.read();
            ev.set_or_unknown(SOURCE_USER, &s.user);
            ev.set_or_unknown(SOURCE_INTEGRITY_LEVEL, &s.integrity_level);
            ev.set_or_unknown(SOURCE_HASHES, &s.hashes);
            ev.set(SOURCE_PROCESS_SCORE, s.score.score.to_string());
        }
        if let Some(t) = target {
            let t = t.read();
            ev.set_or_unknown(TARGET_USER, &t.user);
            ev.set_or_unknown(TARGET_INTEGRITY_LEVEL, &t.integrity_level);
            ev.set_or_unknown(TARGET_PARENT_PROCESS_GUID, &t.parent_guid);
            ev.set_or_unknown(TARGET_HASHES, &t.hashes);
            ev.set(TARGET_PROCESS_SCORE, t.score.score.to_string());
        }
    }

    fn single_process(ev: &mut Event, ctx: &Context) {
        let Some(guid) = ev.get_str(PROCESS_GUID) else { return };
        let track = ctx.store.get_by_guid(&guid);
        ev.set(PROCESS_SCORE, UNKNOWN_NUMBER);
        for key in [IMAGE_HASHES, IMAGE_SIGNED, IMAGE_SIGNATURE, IMAGE_SIGNATURE_STATUS] {
            ev.set(key, UNKNOWN);
        }

        let Some(track) = track else {
            for key in [COMMAND_LINE, USER, INTEGRITY_LEVEL, CURRENT_DIRECTORY] {
                if !ev.has(key) {
                    ev.set(key, UNKNOWN);
                }
            }
            return;
        };
        backfill(ev, &track);
    }
}

fn backfill(ev: &mut Event, track: &TrackRef) {
    let t = track.read();
    let missing = [
        (COMMAND_LINE, &t.command_line),
        (USER, &t.user),
        (INTEGRITY_LEVEL, &t.integrity_level),
        (CURRENT_DIRECTORY, &t.current_directory),
    ];
    for (key, value) in missing {
        if !ev.has(key) {
            ev.set_or_unknown(key, value);
        }
    }
    ev.set_or_unknown(IMAGE_HASHES, &t.hashes);
    ev.set(IMAGE_SIGNED, t.signed.to_string());
    ev.set_or_unknown(IMAGE_SIGNATURE, &t.signature);
    ev.set_or_unknown(IMAGE_SIGNATURE_STATUS, &t.signature_status);
    ev.set(PROCESS_SCORE, t.score.score.to_string());
}

impl Enricher for CrossReference {
    fn name(&self) -> &'static str {
        "cross-reference"
    }

    fn stage(&self) -> Stage {
        Stage::CrossRef
    }

    fn applies(&self, ev: &Event) -> bool {
        // process creation is handled by tracking, driver loads carry no GUID
        ev.is_sysmon() && !matches!(ev.event_id(), sysmon::PROCESS_CREATE | sysmon::DRIVER_LOAD)
    }

    fn enrich(&self, ev: &mut Event, ctx: &Context) -> Result<(), EnrichError> {
        if is_cross_process(ev.event_id()) {
            Self::cross_process(ev, ctx);
        } else {
            Self::single_process(ev, ctx);
        }
        Ok(())
    }
}

/// Object access auditing events only carry a PID. The PID is resolved to a
/// track, which is good enough for the short window between the access and
/// the event.
pub struct FileSystemAudit;

impl Enricher for FileSystemAudit {
    fn name(&self) -> &'static str {
        "fs-audit"
    }

    fn stage(&self) -> Stage {
        Stage::CrossRef
    }

    fn applies(&self, ev: &Event) -> bool {
        ev.channel() == SECURITY_CHANNEL && ev.event_id() == FS_AUDIT_OBJECT_ACCESS
    }

    fn enrich(&self, ev: &mut Event, ctx: &Context) -> Result<(), EnrichError> {
        ev.set(COMMAND_LINE, UNKNOWN);
        ev.set(PROCESS_GUID, shared::constants::NULL_GUID);
        ev.set(IMAGE_HASHES, UNKNOWN);

        let pid = ev.get_int(PROCESS_ID).and_then(|p| u32::try_from(p).ok());
        let Some(track) = pid.and_then(|p| ctx.store.get_by_pid(p)) else {
            return Ok(());
        };

        let object = ev.get_str(OBJECT_NAME).filter(|o| std::path::Path::new(o).is_file());
        let mut t = track.write();
        ev.set_or_unknown(COMMAND_LINE, &t.command_line);
        ev.set_or_unknown(IMAGE_HASHES, &t.hashes);
        if !t.guid.is_empty() {
            ev.set(PROCESS_GUID, t.guid.as_str());
        }
        if let Some(object) = object {
            t.stats.files.last_accessed.insert(object);
        }
        Ok(())
    }
}
