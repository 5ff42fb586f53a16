// src/config/loader.rs

//! # Configuration Loader
//!
//! Reads the agent TOML file, deserializes it into `RawConfig`, and converts
//! the raw tables (humantime strings, action names) into the typed `Config`.

use crate::actions::Action;
use crate::config::model::{
    ActionsConfig, Config, ConfigError, DumpConfig, RawActionsConfig, RawConfig, RawDumpConfig,
    RawReportConfig, ReportConfig,
};
use crate::hids_log;
use log::Level;
use std::{fs, path::Path, path::PathBuf, time::Duration};

/// Load and parse the agent configuration from `path`.
/// Logs at DEBUG before reading and INFO on success.
pub fn load(path: &Path) -> Result<Config, ConfigError> {
    hids_log!(Level::Debug, "config", "Reading config from {:?}", path);
    let txt = fs::read_to_string(path)?;
    let cfg = from_toml_str(&txt)?;
    hids_log!(Level::Info, "config", "Loaded config from {:?}", path);
    Ok(cfg)
}

/// Parse a configuration held in memory.
pub fn from_toml_str(txt: &str) -> Result<Config, ConfigError> {
    let raw: RawConfig = toml::from_str(txt)?;
    raw.into_typed()
}

impl RawConfig {
    /// Validate and convert into the runtime representation.
    pub fn into_typed(self) -> Result<Config, ConfigError> {
        Ok(Config {
            logging:  self.logging,
            database: self.database,
            dump:     convert_dump(self.dump)?,
            report:   convert_report(self.report)?,
            sysmon:   self.sysmon,
            actions:  convert_actions(self.actions)?,
            tracking: self.tracking,
            state:    self.state,
            input:    self.input,
        })
    }
}

fn parse_duration(s: &str) -> Result<Duration, ConfigError> {
    humantime::parse_duration(s).map_err(|e| ConfigError::InvalidDuration(s.to_string(), e))
}

fn parse_actions(names: &[String]) -> Result<Vec<Action>, ConfigError> {
    names.iter().map(|n| n.parse::<Action>()).collect()
}

fn convert_dump(raw: RawDumpConfig) -> Result<DumpConfig, ConfigError> {
    if raw.workers == 0 {
        return Err(ConfigError::InvalidValue("dump.workers", "must be at least 1".into()));
    }
    let cfg = DumpConfig {
        dir:                  PathBuf::from(raw.dir),
        compression:          raw.compression,
        max_dumps:            raw.max_dumps,
        dump_untracked:       raw.dump_untracked,
        workers:              raw.workers,
        kill_wait:            parse_duration(&raw.kill_wait)?,
        compression_interval: parse_duration(&raw.compression_interval)?,
    };
    hids_log!(
        Level::Debug,
        "config",
        "Dump root {:?}: max_dumps={}, workers={}, kill_wait={:?}",
        cfg.dir,
        cfg.max_dumps,
        cfg.workers,
        cfg.kill_wait
    );
    Ok(cfg)
}

fn convert_report(raw: RawReportConfig) -> Result<ReportConfig, ConfigError> {
    Ok(ReportConfig {
        enable:          raw.enable,
        command_timeout: parse_duration(&raw.command_timeout)?,
        commands:        raw.commands,
    })
}

fn convert_actions(raw: RawActionsConfig) -> Result<ActionsConfig, ConfigError> {
    Ok(ActionsConfig {
        threshold: raw.threshold,
        low:       parse_actions(&raw.low)?,
        medium:    parse_actions(&raw.medium)?,
        high:      parse_actions(&raw.high)?,
        critical:  parse_actions(&raw.critical)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let cfg = from_toml_str("").unwrap();
        assert_eq!(cfg.dump.max_dumps, 4);
        assert_eq!(cfg.dump.workers, 2);
        assert!(!cfg.dump.dump_untracked);
        assert_eq!(cfg.dump.kill_wait, Duration::from_secs(60));
        assert_eq!(cfg.actions.threshold, 5);
        assert_eq!(
            cfg.actions.critical,
            vec![Action::Report, Action::Filedump, Action::Regdump, Action::Memdump]
        );
        assert!(cfg.actions.low.is_empty());
    }

    #[test]
    fn tables_override_defaults() {
        let cfg = from_toml_str(
            r#"
            [dump]
            dir = "/var/lib/hids/dumps"
            max_dumps = 1
            kill_wait = "250ms"

            [actions]
            high = ["kill", "memdump"]

            [[report.commands]]
            name = "netstat"
            args = ["-ano"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.dump.dir, PathBuf::from("/var/lib/hids/dumps"));
        assert_eq!(cfg.dump.max_dumps, 1);
        assert_eq!(cfg.dump.kill_wait, Duration::from_millis(250));
        assert_eq!(cfg.actions.high, vec![Action::Kill, Action::Memdump]);
        assert_eq!(cfg.report.commands[0].args, vec!["-ano".to_string()]);
        assert!(!cfg.report.commands[0].expect_json);
    }

    #[test]
    fn unknown_action_is_rejected() {
        let err = from_toml_str("[actions]\nlow = [\"nuke\"]").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAction(ref a) if a == "nuke"));
    }

    #[test]
    fn bad_duration_is_rejected() {
        let err = from_toml_str("[dump]\nkill_wait = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDuration(..)));
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(from_toml_str("[dump]\nworkers = 0").is_err());
    }
}
