// src/actions/report.rs

//! Incident report: a point-in-time view of the process table, loaded
//! drivers and blacklist, plus the output of the configured external
//! commands. The brief variant leaves the commands out.

use chrono::{DateTime, Utc};
use log::Level;
use serde::Serialize;
use serde_json::Value;
use std::{
    io::Read,
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use crate::config::model::ReportCommand;
use crate::context::Context;
use crate::hids_log;
use crate::tracker::{DriverInfo, ProcessTrack};

const POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Serialize)]
pub struct CommandOutput {
    pub description: String,
    pub name:        String,
    pub args:        Vec<String>,
    /// Parsed JSON when the command declares JSON output, raw text otherwise.
    pub stdout:      Value,
    pub error:       Option<String>,
    pub start:       DateTime<Utc>,
    pub stop:        DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub timestamp: DateTime<Utc>,
    pub brief:     bool,
    pub processes: Vec<ProcessTrack>,
    pub drivers:   Vec<DriverInfo>,
    pub blacklist: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub commands:  Vec<CommandOutput>,
}

pub fn build(ctx: &Context, brief: bool) -> Report {
    let commands = if brief {
        Vec::new()
    } else {
        let timeout = ctx.config.report.command_timeout;
        ctx.config.report.commands.iter().map(|c| run_command(c, timeout)).collect()
    };
    Report {
        timestamp: Utc::now(),
        brief,
        processes: ctx.store.snapshot(),
        drivers: ctx.store.drivers(),
        blacklist: ctx.store.blacklisted(),
        commands,
    }
}

/// Run one report command, killing it once `timeout` elapsed. Blocking.
pub fn run_command(cmd: &ReportCommand, timeout: Duration) -> CommandOutput {
    let start = Utc::now();
    let mut out = CommandOutput {
        description: cmd.description.clone(),
        name:        cmd.name.clone(),
        args:        cmd.args.clone(),
        stdout:      Value::Null,
        error:       None,
        start,
        stop:        start,
    };

    match capture(cmd, timeout) {
        Ok(text) if cmd.expect_json => match serde_json::from_str(&text) {
            Ok(v) => out.stdout = v,
            Err(e) => {
                out.error = Some(format!("invalid JSON output: {e}"));
                out.stdout = Value::String(text);
            }
        },
        Ok(text) => out.stdout = Value::String(text),
        Err(e) => {
            hids_log!(Level::Error, "actions", "Report command {} failed: {}", cmd.name, e);
            out.error = Some(e);
        }
    }
    out.stop = Utc::now();
    out
}

fn capture(cmd: &ReportCommand, timeout: Duration) -> Result<String, String> {
    let mut child = Command::new(&cmd.name)
        .args(&cmd.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| e.to_string())?;

    // drain stdout concurrently so a chatty child never blocks on a full pipe
    let mut stdout = child.stdout.take();
    let reader = thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(s) = stdout.as_mut() {
            let _ = s.read_to_end(&mut buf);
        }
        buf
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break Ok(status),
            Ok(None) if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                break Err(format!("timed out after {}", humantime::format_duration(timeout)));
            }
            Ok(None) => thread::sleep(POLL),
            Err(e) => break Err(e.to_string()),
        }
    };
    let buf = reader.join().unwrap_or_default();
    let status = status?;
    if !status.success() {
        return Err(format!("exited with {status}"));
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(name: &str, args: &[&str], expect_json: bool) -> ReportCommand {
        ReportCommand {
            description: "test".into(),
            name:        name.into(),
            args:        args.iter().map(|s| s.to_string()).collect(),
            expect_json,
        }
    }

    #[test]
    fn missing_command_reports_error() {
        let out = run_command(&command("definitely-not-a-real-binary-xyz", &[], false), Duration::from_secs(1));
        assert!(out.error.is_some());
        assert_eq!(out.stdout, Value::Null);
    }

    #[cfg(unix)]
    #[test]
    fn json_output_is_embedded() {
        let out = run_command(&command("echo", &["{\"rows\":[1,2]}"], true), Duration::from_secs(5));
        assert!(out.error.is_none(), "{:?}", out.error);
        assert_eq!(out.stdout["rows"][1], 2);
    }

    #[cfg(unix)]
    #[test]
    fn slow_command_is_killed() {
        let out = run_command(&command("sleep", &["5"], false), Duration::from_millis(200));
        assert!(out.error.as_deref().is_some_and(|e| e.starts_with("timed out")));
    }
}
