// src/enrich/stats.rs

//! Per-process activity counters, injected back into the events that
//! update them.

use chrono::Utc;
use std::net::IpAddr;

use super::{EnrichError, Enricher, Stage};
use crate::context::Context;
use crate::event::{Event, archive::extension, fields::*};
use crate::tracker::track::FileOp;

pub struct ProcessStats;

impl ProcessStats {
    fn file_event(op: FileOp, ev: &mut Event, ctx: &Context) {
        for key in [FILE_COUNT, FILE_COUNT_BY_EXT, FILE_EXTENSION, FILE_FREQUENCY] {
            ev.set(key, UNKNOWN);
        }
        if !ctx.tracking_enabled() {
            return;
        }
        let Some(track) = ctx.track_of(ev) else { return };
        let Some(target) = ev.get_str(TARGET_FILENAME) else { return };

        let counters = track.write().stats.files.record(op, extension(&target), Utc::now());
        ev.set(FILE_COUNT, counters.total.to_string());
        ev.set(FILE_COUNT_BY_EXT, counters.by_ext.to_string());
        ev.set(FILE_EXTENSION, counters.extension);
        ev.set(FILE_FREQUENCY, counters.frequency.to_string());
    }

    fn process_create(ev: &mut Event, ctx: &Context) {
        ev.set(CREATE_PROCESS_COUNT, UNKNOWN);
        if !ctx.tracking_enabled() {
            return;
        }
        let Some(parent) = ev.get_str(PARENT_PROCESS_GUID).and_then(|g| ctx.store.get_by_guid(&g)) else {
            return;
        };
        let count = {
            let mut p = parent.write();
            p.stats.create_process_count += 1;
            p.stats.create_process_count
        };
        ev.set(CREATE_PROCESS_COUNT, count.to_string());
    }

    fn network_connect(ev: &mut Event, ctx: &Context) {
        ev.set(CONNECTION_COUNT, UNKNOWN);
        if !ctx.tracking_enabled() {
            return;
        }
        let Some(track) = ctx.track_of(ev) else { return };
        let ip = ev.get_str(DESTINATION_IP);
        let port = ev.get_int(DESTINATION_PORT).and_then(|p| u16::try_from(p).ok());
        let (Some(ip), Some(port)) = (ip, port) else { return };
        let ts = ev.get_str(UTC_TIME).unwrap_or_default();

        let count = {
            let mut t = track.write();
            t.stats.update_connection(&ts, &ip, port);
            t.stats.connections.len()
        };
        ev.set(CONNECTION_COUNT, count.to_string());
    }

    fn dns_query(ev: &mut Event, ctx: &Context) {
        ev.set(RESOLUTION_COUNT, UNKNOWN);
        if !ctx.tracking_enabled() {
            return;
        }
        let Some(track) = ctx.track_of(ev) else { return };
        let (Some(name), Some(results)) = (ev.get_str(QUERY_NAME), ev.get_str(QUERY_RESULTS)) else {
            return;
        };
        if results.is_empty() || results == "-" {
            return;
        }

        let count = {
            let mut t = track.write();
            results
                .split(';')
                .map(str::trim)
                .filter(|r| r.parse::<IpAddr>().is_ok())
                .for_each(|ip| t.stats.update_resolution(ip, &name));
            t.stats.resolutions.len()
        };
        ev.set(RESOLUTION_COUNT, count.to_string());
    }
}

impl Enricher for ProcessStats {
    fn name(&self) -> &'static str {
        "process-stats"
    }

    fn stage(&self) -> Stage {
        Stage::Stats
    }

    fn applies(&self, ev: &Event) -> bool {
        ev.is_sysmon()
            && matches!(
                ev.event_id(),
                sysmon::PROCESS_CREATE
                    | sysmon::NETWORK_CONNECT
                    | sysmon::DNS_QUERY
                    | sysmon::FILE_CREATE
                    | sysmon::FILE_DELETE
                    | sysmon::FILE_DELETE_DETECTED
            )
    }

    fn enrich(&self, ev: &mut Event, ctx: &Context) -> Result<(), EnrichError> {
        match ev.event_id() {
            sysmon::PROCESS_CREATE => Self::process_create(ev, ctx),
            sysmon::NETWORK_CONNECT => Self::network_connect(ev, ctx),
            sysmon::DNS_QUERY => Self::dns_query(ev, ctx),
            sysmon::FILE_CREATE => Self::file_event(FileOp::Created, ev, ctx),
            _ => Self::file_event(FileOp::Deleted, ev, ctx),
        }
        Ok(())
    }
}
