// src/enrich/services.rs

use log::Level;

use super::crossref::{cross_process_keys, is_cross_process};
use super::{EnrichError, Enricher, Stage};
use crate::context::Context;
use crate::event::{Event, fields::*};
use crate::hids_log;
use crate::tracker::TrackRef;

/// Resolves the Windows services hosted by the processes an event refers
/// to. Tracked processes cache the first answer, including an empty one and
/// the failure sentinel; anything else goes to the OS on every event.
pub struct ServiceNames;

impl ServiceNames {
    fn resolve(ctx: &Context, pid: u32) -> String {
        match ctx.os.service_names(pid) {
            Ok(names) => names,
            Err(e) => {
                hids_log!(Level::Error, "enrich", "Failed to resolve service from PID={}: {}", pid, e);
                SERVICE_RESOLUTION_ERROR.to_string()
            }
        }
    }

    /// Cached answer of a tracked process, resolving it on first use.
    fn cached(ctx: &Context, track: &TrackRef, pid: Option<u32>) -> Option<String> {
        if let Some(cached) = track.read().services.clone() {
            return Some(cached);
        }
        let resolved = Self::resolve(ctx, pid?);
        track.write().services = Some(resolved.clone());
        Some(resolved)
    }

    fn pid_of(ev: &Event, key: &str) -> Option<u32> {
        ev.get_int(key).and_then(|p| u32::try_from(p).ok())
    }

    fn cross_process(ev: &mut Event, ctx: &Context) {
        ev.set(SOURCE_SERVICES, UNKNOWN);
        ev.set(TARGET_SERVICES, UNKNOWN);

        let (skey, tkey) = cross_process_keys(ev.event_id());
        let sides = [
            (skey, SOURCE_PROCESS_ID, SOURCE_SERVICES),
            (tkey, TARGET_PROCESS_ID, TARGET_SERVICES),
        ];
        for (guid_key, pid_key, out) in sides {
            let Some(guid) = ev.get_str(guid_key) else { continue };
            let pid = Self::pid_of(ev, pid_key);
            let services = match ctx.store.get_by_guid(&guid) {
                Some(track) => Self::cached(ctx, &track, pid),
                None => pid.map(|pid| Self::resolve(ctx, pid)),
            };
            if let Some(services) = services {
                ev.set_or_unknown(out, &services);
            }
        }
    }

    fn single_process(ev: &mut Event, ctx: &Context) {
        ev.set(SERVICES, UNKNOWN);
        let (Some(guid), Some(pid)) = (ev.get_str(PROCESS_GUID), Self::pid_of(ev, PROCESS_ID)) else {
            return;
        };

        let services = match ctx.store.get_by_guid(&guid) {
            Some(track) => Self::cached(ctx, &track, Some(pid)).unwrap_or_default(),
            None => Self::resolve(ctx, pid),
        };
        ev.set_or_unknown(SERVICES, &services);
    }
}

impl Enricher for ServiceNames {
    fn name(&self) -> &'static str {
        "service-names"
    }

    fn stage(&self) -> Stage {
        Stage::Services
    }

    fn applies(&self, ev: &Event) -> bool {
        ev.is_sysmon()
            && !matches!(
                ev.event_id(),
                sysmon::DRIVER_LOAD | sysmon::WMI_FILTER | sysmon::WMI_CONSUMER | sysmon::WMI_BINDING
            )
    }

    fn enrich(&self, ev: &mut Event, ctx: &Context) -> Result<(), EnrichError> {
        // cached names are only released when termination is observed
        if !ctx.tracking_enabled() {
            return Ok(());
        }
        if is_cross_process(ev.event_id()) {
            Self::cross_process(ev, ctx);
        } else {
            Self::single_process(ev, ctx);
        }
        Ok(())
    }
}
