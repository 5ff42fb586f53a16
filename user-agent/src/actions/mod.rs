//! # Action Orchestrator
//!
//! Turns a detection's action list into response side effects.
//!
//! Cheap and order-critical actions (`blacklist`, suspend for `kill`, the
//! dump budget check) run synchronously on the detection path. Dump-class
//! actions are queued as one [`DumpJob`] per detection and executed by a
//! bounded pool. Termination for `kill` happens once the detection's memory
//! dump settled, or after `dump.kill_wait`.

pub mod cmdline;
pub mod dump;
pub mod handler;
pub mod report;
pub mod terminator;

pub use dump::DumpJob;
pub use handler::ActionHandler;
pub use terminator::Terminator;

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::config::ConfigError;

/// Response vocabulary understood by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Kill,
    Blacklist,
    Memdump,
    Filedump,
    Regdump,
    Report,
    Brief,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::Kill,
        Action::Blacklist,
        Action::Memdump,
        Action::Filedump,
        Action::Regdump,
        Action::Report,
        Action::Brief,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Kill      => "kill",
            Action::Blacklist => "blacklist",
            Action::Memdump   => "memdump",
            Action::Filedump  => "filedump",
            Action::Regdump   => "regdump",
            Action::Report    => "report",
            Action::Brief     => "brief",
        }
    }

    /// Actions that write artifacts and run on the dump pool.
    pub fn is_dump(self) -> bool {
        !matches!(self, Action::Kill | Action::Blacklist)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allow `"memdump"` → `Action::Memdump`
impl FromStr for Action {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == lower)
            .ok_or_else(|| ConfigError::InvalidAction(s.to_string()))
    }
}
