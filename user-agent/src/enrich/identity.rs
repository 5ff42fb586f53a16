// src/enrich/identity.rs

use log::Level;

use super::{EnrichError, Enricher, Stage};
use crate::context::Context;
use crate::event::{
    Event,
    fields::{IMAGE, PARENT_IMAGE, PARENT_PROCESS_GUID, PROCESS_GUID, sysmon},
};
use crate::hids_log;

/// Learns the agent's own process GUID from its creation event.
///
/// The parent image is checked first: the agent spawns short-lived copies
/// of itself, and those would otherwise be mistaken for the agent.
pub struct SelfIdentify;

impl Enricher for SelfIdentify {
    fn name(&self) -> &'static str {
        "self-identify"
    }

    fn stage(&self) -> Stage {
        Stage::SelfId
    }

    fn applies(&self, ev: &Event) -> bool {
        ev.is_sysmon() && ev.event_id() == sysmon::PROCESS_CREATE
    }

    fn enrich(&self, ev: &mut Event, ctx: &Context) -> Result<(), EnrichError> {
        if ctx.identity.guid().is_some() {
            return Ok(());
        }
        let candidates = [(PARENT_IMAGE, PARENT_PROCESS_GUID), (IMAGE, PROCESS_GUID)];
        for (image_key, guid_key) in candidates {
            let Some(image) = ev.get_str(image_key) else { continue };
            if !ctx.identity.is_self_image(&image) {
                continue;
            }
            if let Some(guid) = ev.get_str(guid_key) {
                ctx.identity.set_guid(&guid);
                hids_log!(Level::Info, "enrich", "Found self GUID from {}: {}", guid_key, guid);
                return Ok(());
            }
        }
        Ok(())
    }
}
