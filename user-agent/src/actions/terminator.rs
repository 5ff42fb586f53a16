// src/actions/terminator.rs

use log::Level;

use crate::context::Context;
use crate::event::{Event, fields::*};
use crate::hids_log;

/// Kills new processes whose command line was blacklisted by an earlier
/// detection. Runs on every process creation event, independently of the
/// detection outcome.
#[derive(Debug, Default)]
pub struct Terminator;

impl Terminator {
    pub fn new() -> Self {
        Self
    }

    /// Returns `true` when the process was terminated.
    pub fn check(&self, ev: &Event, ctx: &Context) -> bool {
        if !ev.is_sysmon() || ev.event_id() != sysmon::PROCESS_CREATE {
            return false;
        }
        let Some(cmd) = ev.get_str(COMMAND_LINE) else { return false };
        if !ctx.store.is_blacklisted(&cmd) {
            return false;
        }
        let Some(pid) = ev.get_int(PROCESS_ID).and_then(|p| u32::try_from(p).ok()) else {
            return false;
        };
        if ctx.identity.is_self_pid(pid) {
            return false;
        }

        hids_log!(Level::Warn, "actions", "Terminating blacklisted process PID={} CommandLine=\"{}\"", pid, cmd);
        match ctx.os.terminate(pid) {
            Ok(()) => {
                metrics::counter!("hids_blacklist_terminations_total").increment(1);
                true
            }
            Err(e) => {
                hids_log!(Level::Error, "actions", "Failed to terminate process PID={}: {}", pid, e);
                false
            }
        }
    }
}
