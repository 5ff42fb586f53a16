// src/enrich/extras.rs

//! Best-effort enrichments that read something outside the process table.
//! Each one leaves its field at the placeholder when the read fails.

use std::fs;
use std::path::Path;

use super::{EnrichError, Enricher, Stage};
use crate::context::Context;
use crate::event::{Event, archive::clipboard_file, fields::*};

/// Clipboard captures larger than this are not inlined into the event.
const CLIPBOARD_MAX: u64 = 1024 * 1024;

/// Size of the value written by a registry set event.
pub struct RegistryValueSize;

impl Enricher for RegistryValueSize {
    fn name(&self) -> &'static str {
        "registry-value-size"
    }

    fn stage(&self) -> Stage {
        Stage::Extras
    }

    fn applies(&self, ev: &Event) -> bool {
        ev.is_sysmon() && ev.event_id() == sysmon::REG_SET_VALUE
    }

    fn enrich(&self, ev: &mut Event, ctx: &Context) -> Result<(), EnrichError> {
        ev.set(VALUE_SIZE, UNKNOWN_NUMBER);
        let Some(target) = ev.get_str(TARGET_OBJECT) else { return Ok(()) };
        let size = ctx.os.registry_value_size(&target)?;
        ev.set(VALUE_SIZE, size.to_string());
        Ok(())
    }
}

/// Inlines the clipboard content archived by Sysmon so rules can match on
/// it.
pub struct ClipboardContent;

impl Enricher for ClipboardContent {
    fn name(&self) -> &'static str {
        "clipboard-content"
    }

    fn stage(&self) -> Stage {
        Stage::Extras
    }

    fn applies(&self, ev: &Event) -> bool {
        ev.is_sysmon() && ev.event_id() == sysmon::CLIPBOARD_CHANGE
    }

    fn enrich(&self, ev: &mut Event, ctx: &Context) -> Result<(), EnrichError> {
        ev.set(CLIPBOARD_DATA, UNKNOWN);
        let Some(hashes) = ev.get_str(HASHES) else { return Ok(()) };

        let path = clipboard_file(&ctx.config.sysmon.archive_directory, &hashes);
        let meta = fs::metadata(&path)?;
        if !meta.is_file() || meta.len() >= CLIPBOARD_MAX {
            return Ok(());
        }
        let data = fs::read(&path)?;
        ev.set(CLIPBOARD_DATA, decode_clipboard(&data));
        Ok(())
    }
}

/// Clipboard text is UTF-16LE. Anything that does not decode is kept as an
/// escaped byte string.
pub fn decode_clipboard(data: &[u8]) -> String {
    if data.len() % 2 == 0 {
        let units: Vec<u16> = data
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        if let Ok(text) = String::from_utf16(&units) {
            return text.trim_end_matches('\0').to_string();
        }
    }
    format!("{:?}", String::from_utf8_lossy(data))
}

/// On-disk size of the process image or of the loaded module.
pub struct ImageSize;

impl Enricher for ImageSize {
    fn name(&self) -> &'static str {
        "image-size"
    }

    fn stage(&self) -> Stage {
        Stage::Extras
    }

    fn applies(&self, ev: &Event) -> bool {
        ev.is_sysmon() && matches!(ev.event_id(), sysmon::PROCESS_CREATE | sysmon::IMAGE_LOAD)
    }

    fn enrich(&self, ev: &mut Event, _ctx: &Context) -> Result<(), EnrichError> {
        let (source, out) = match ev.event_id() {
            sysmon::PROCESS_CREATE => (IMAGE, IMAGE_SIZE),
            _ => (IMAGE_LOADED, IMAGE_LOADED_SIZE),
        };
        ev.set(out, UNKNOWN);
        let Some(image) = ev.get_str(source) else { return Ok(()) };

        // images that no longer exist are expected
        if let Ok(meta) = fs::metadata(Path::new(&image)) {
            if meta.is_file() {
                ev.set(out, meta.len().to_string());
            }
        }
        Ok(())
    }
}

/// How much of a tampered process image still matches its file, as a
/// percentage of differing bytes rounded to two decimals.
pub struct ProcessIntegrity;

impl Enricher for ProcessIntegrity {
    fn name(&self) -> &'static str {
        "process-integrity"
    }

    fn stage(&self) -> Stage {
        Stage::Extras
    }

    fn applies(&self, ev: &Event) -> bool {
        ev.is_sysmon() && ev.event_id() == sysmon::PROCESS_TAMPERING
    }

    fn enrich(&self, ev: &mut Event, ctx: &Context) -> Result<(), EnrichError> {
        ev.set(PROCESS_INTEGRITY, UNKNOWN_NUMBER);
        let Some(pid) = ev.get_int(PROCESS_ID).and_then(|p| u32::try_from(p).ok()) else {
            return Ok(());
        };
        if ctx.identity.is_self_pid(pid) || !ctx.os.is_running(pid) {
            return Ok(());
        }
        let diff = ctx.os.process_integrity(pid)?;
        ev.set(PROCESS_INTEGRITY, round2(diff).to_string());
        Ok(())
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
