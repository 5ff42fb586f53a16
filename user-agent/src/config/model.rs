// src/config/model.rs

use serde::Deserialize;
use std::{path::PathBuf, time::Duration};
use thiserror::Error;

use crate::actions::Action;

/// Top-level runtime config
#[derive(Debug, Clone)]
pub struct Config {
    pub logging:  LoggingConfig,
    pub database: DatabaseConfig,
    pub dump:     DumpConfig,
    pub report:   ReportConfig,
    pub sysmon:   SysmonConfig,
    pub actions:  ActionsConfig,
    pub tracking: TrackingConfig,
    pub state:    StateConfig,
    pub input:    InputConfig,
}

/// The whole file as written on disk. Every table is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawConfig {
    pub logging:  LoggingConfig,
    pub database: DatabaseConfig,
    pub dump:     RawDumpConfig,
    pub report:   RawReportConfig,
    pub sysmon:   SysmonConfig,
    pub actions:  RawActionsConfig,
    pub tracking: TrackingConfig,
    pub state:    StateConfig,
    pub input:    InputConfig,
}

/// Mirror of the `[logging]` table
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]            pub enable: bool,
    #[serde(default)]            pub file:   Option<String>,
    #[serde(default = "default_level")] pub level: String,
}
fn default_level() -> String { "INFO".into() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { enable: false, file: None, level: default_level() }
    }
}

/// Mirror of the `[database]` table (detection log)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub enable:             bool,
    pub path:               String,
    pub purge_on_restart:   bool,
    pub synchronous:        String,
    pub journal_size_limit: u64,
    pub checkpoint_seconds: u64,
    pub ttl_seconds:        u64,
    pub flush_interval_ms:  u64,
    pub batch_size:         usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            enable:             true,
            path:               "detections.db".into(),
            purge_on_restart:   false,
            synchronous:        "NORMAL".into(),
            journal_size_limit: 50_000_000,
            checkpoint_seconds: 300,
            ttl_seconds:        7 * 24 * 3600,
            flush_interval_ms:  250,
            batch_size:         1_000,
        }
    }
}

/// Raw `[dump]` table; durations are humantime strings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RawDumpConfig {
    pub dir:                  String,
    pub compression:          bool,
    pub max_dumps:            u32,
    pub dump_untracked:       bool,
    pub workers:              usize,
    pub kill_wait:            String,
    pub compression_interval: String,
}

impl Default for RawDumpConfig {
    fn default() -> Self {
        Self {
            dir:                  "dumps".into(),
            compression:          true,
            max_dumps:            4,
            dump_untracked:       false,
            workers:              2,
            kill_wait:            "60s".into(),
            compression_interval: "1s".into(),
        }
    }
}

/// Fully-typed `[dump]` table
#[derive(Debug, Clone)]
pub struct DumpConfig {
    pub dir:                  PathBuf,
    pub compression:          bool,
    pub max_dumps:            u32,
    pub dump_untracked:       bool,
    pub workers:              usize,
    pub kill_wait:            Duration,
    pub compression_interval: Duration,
}

/// External command whose output is embedded in full reports.
#[derive(Debug, Clone, Deserialize)]
pub struct ReportCommand {
    #[serde(default)]
    pub description: String,
    pub name:        String,
    #[serde(default)]
    pub args:        Vec<String>,
    #[serde(default)]
    pub expect_json: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RawReportConfig {
    pub enable:          bool,
    pub command_timeout: String,
    pub commands:        Vec<ReportCommand>,
}

impl Default for RawReportConfig {
    fn default() -> Self {
        Self { enable: true, command_timeout: "60s".into(), commands: Vec::new() }
    }
}

#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub enable:          bool,
    pub command_timeout: Duration,
    pub commands:        Vec<ReportCommand>,
}

/// Mirror of the `[sysmon]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SysmonConfig {
    pub archive_directory: PathBuf,
}

impl Default for SysmonConfig {
    fn default() -> Self {
        Self { archive_directory: PathBuf::from("C:\\Sysmon\\") }
    }
}

/// Raw `[actions]` table: action names as strings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RawActionsConfig {
    pub threshold: i64,
    pub low:       Vec<String>,
    pub medium:    Vec<String>,
    pub high:      Vec<String>,
    pub critical:  Vec<String>,
}

impl Default for RawActionsConfig {
    fn default() -> Self {
        let s = |v: &[&str]| v.iter().map(|a| a.to_string()).collect();
        Self {
            threshold: 5,
            low:       Vec::new(),
            medium:    s(&["brief", "filedump", "regdump"]),
            high:      s(&["report", "filedump", "regdump"]),
            critical:  s(&["report", "filedump", "regdump", "memdump"]),
        }
    }
}

/// Default response per criticality tier
#[derive(Debug, Clone)]
pub struct ActionsConfig {
    pub threshold: i64,
    pub low:       Vec<Action>,
    pub medium:    Vec<Action>,
    pub high:      Vec<Action>,
    pub critical:  Vec<Action>,
}

/// Mirror of the `[tracking]` table
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Only build tracks once process termination telemetry has been seen,
    /// so that tracks are guaranteed to be freed.
    pub require_termination_events: bool,
}

/// Mirror of the `[state]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub path: Option<PathBuf>,
    pub key:  String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self { path: Some(PathBuf::from("state.json")), key: "hids-state-key".into() }
    }
}

/// Mirror of the `[input]` table
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// JSON-lines telemetry file; `-` reads standard input.
    pub path: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self { path: "-".into() }
    }
}

/// All the ways config loading can go wrong
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid action '{0}'")]
    InvalidAction(String),

    #[error("invalid duration '{0}': {1}")]
    InvalidDuration(String, #[source] humantime::DurationError),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Default for Config {
    fn default() -> Self {
        // the built-in defaults are always valid
        match RawConfig::default().into_typed() {
            Ok(cfg) => cfg,
            Err(e) => unreachable!("built-in defaults rejected: {e}"),
        }
    }
}
