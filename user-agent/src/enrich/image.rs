// src/enrich/image.rs

use super::{EnrichError, Enricher, Stage};
use crate::context::Context;
use crate::event::{Event, fields::*};

/// Image load context.
///
/// Adds the parent image and command line of the loading process. When the
/// loaded image is the process's own executable (and not one of its
/// modules), its signature fields are recorded on the track.
pub struct ImageLoadContext;

impl Enricher for ImageLoadContext {
    fn name(&self) -> &'static str {
        "image-load"
    }

    fn stage(&self) -> Stage {
        Stage::ImageLoad
    }

    fn applies(&self, ev: &Event) -> bool {
        ev.is_sysmon() && ev.event_id() == sysmon::IMAGE_LOAD
    }

    fn enrich(&self, ev: &mut Event, ctx: &Context) -> Result<(), EnrichError> {
        ev.set(PARENT_IMAGE, UNKNOWN);
        ev.set(PARENT_COMMAND_LINE, UNKNOWN);

        let Some(track) = ev.get_str(PROCESS_GUID).and_then(|g| ctx.store.get_by_guid(&g)) else {
            return Ok(());
        };

        let loaded = ev.get_str(IMAGE_LOADED).unwrap_or_default();
        let mut t = track.write();
        if !loaded.is_empty() && loaded.eq_ignore_ascii_case(&t.image) {
            if let Some(signed) = ev.get_bool(SIGNED) {
                t.signed = signed;
            }
            if let Some(signature) = ev.get_str(SIGNATURE) {
                t.signature = signature;
            }
            if let Some(status) = ev.get_str(SIGNATURE_STATUS) {
                t.signature_status = status;
            }
        }
        ev.set_or_unknown(PARENT_IMAGE, &t.parent_image);
        ev.set_or_unknown(PARENT_COMMAND_LINE, &t.parent_command_line);
        Ok(())
    }
}
