// src/enrich/tracking.rs

//! Process table maintenance: creation, termination and driver loads.

use log::Level;

use super::{EnrichError, Enricher, Stage};
use crate::context::Context;
use crate::event::{Event, fields::*};
use crate::hids_log;
use crate::tracker::{DriverInfo, ProcessFacts};

/// Builds a track from a process creation event and copies the computed
/// lineage back onto the event.
pub struct TrackProcess;

impl Enricher for TrackProcess {
    fn name(&self) -> &'static str {
        "track-process"
    }

    fn stage(&self) -> Stage {
        Stage::Track
    }

    fn applies(&self, ev: &Event) -> bool {
        ev.is_sysmon() && ev.event_id() == sysmon::PROCESS_CREATE
    }

    fn enrich(&self, ev: &mut Event, ctx: &Context) -> Result<(), EnrichError> {
        for key in [ANCESTORS, PARENT_USER, PARENT_INTEGRITY_LEVEL, PARENT_SERVICES] {
            ev.set(key, UNKNOWN);
        }
        if !ctx.tracking_enabled() {
            return Ok(());
        }

        let guid = ev.get_str(PROCESS_GUID);
        let pid = ev.get_int(PROCESS_ID).and_then(|p| u32::try_from(p).ok());
        let image = ev.get_str(IMAGE);
        let (Some(guid), Some(pid), Some(image)) = (guid, pid, image) else {
            hids_log!(Level::Debug, "enrich", "Process creation without guid/pid/image, not tracked");
            return Ok(());
        };

        let text = |key| ev.get_str(key).unwrap_or_default();
        let parent_guid = text(PARENT_PROCESS_GUID);
        let facts = ProcessFacts {
            pid,
            image,
            command_line:        text(COMMAND_LINE),
            parent_image:        text(PARENT_IMAGE),
            parent_command_line: text(PARENT_COMMAND_LINE),
            current_directory:   text(CURRENT_DIRECTORY),
            user:                text(USER),
            integrity_level:     text(INTEGRITY_LEVEL),
            hashes:              text(HASHES),
        };

        let track = ctx
            .store
            .create(&guid, &parent_guid, facts)
            .or_else(|| ctx.store.get_by_guid(&guid));
        if let Some(track) = track {
            let t = track.read();
            ev.set_or_unknown(ANCESTORS, &t.ancestors.join("|"));
            ev.set_or_unknown(PARENT_USER, &t.parent_user);
            ev.set_or_unknown(PARENT_INTEGRITY_LEVEL, &t.parent_integrity_level);
            ev.set_or_unknown(PARENT_SERVICES, &t.parent_services);
        }
        Ok(())
    }
}

/// Retires tracks on process termination. The first termination event also
/// tells the store that termination telemetry is enabled.
pub struct ProcessTermination;

impl Enricher for ProcessTermination {
    fn name(&self) -> &'static str {
        "process-termination"
    }

    fn stage(&self) -> Stage {
        Stage::Track
    }

    fn applies(&self, ev: &Event) -> bool {
        ev.is_sysmon() && ev.event_id() == sysmon::PROCESS_TERMINATE
    }

    fn enrich(&self, ev: &mut Event, ctx: &Context) -> Result<(), EnrichError> {
        ctx.store.mark_termination_seen();
        if let Some(guid) = ev.get_str(PROCESS_GUID) {
            ctx.retire_process(&guid);
        }
        Ok(())
    }
}

/// Keeps an inventory of loaded drivers for incident reports.
pub struct DriverInventory;

impl Enricher for DriverInventory {
    fn name(&self) -> &'static str {
        "driver-inventory"
    }

    fn stage(&self) -> Stage {
        Stage::Track
    }

    fn applies(&self, ev: &Event) -> bool {
        ev.is_sysmon() && ev.event_id() == sysmon::DRIVER_LOAD
    }

    fn enrich(&self, ev: &mut Event, ctx: &Context) -> Result<(), EnrichError> {
        let mut d = DriverInfo::default();
        if let Some(v) = ev.get_str(HASHES) {
            d.hashes = v;
        }
        if let Some(v) = ev.get_str(IMAGE_LOADED) {
            d.image = v;
        }
        if let Some(v) = ev.get_str(SIGNATURE) {
            d.signature = v;
        }
        if let Some(v) = ev.get_str(SIGNATURE_STATUS) {
            d.signature_status = v;
        }
        if let Some(v) = ev.get_bool(SIGNED) {
            d.signed = v;
        }
        ctx.store.add_driver(d);
        Ok(())
    }
}
