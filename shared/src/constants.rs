// shared/src/constants.rs

/// Serialized copy of the event that triggered a dump.
pub const EVENT_FILE: &str = "event.json";
/// Incident report (full or brief).
pub const REPORT_FILE: &str = "report.json";
/// Live registry value captured by `regdump`.
pub const REG_FILE: &str = "reg.txt";

/// Extension of the hash sidecar written next to every binary dump.
pub const SHA256_EXT: &str = "sha256";
/// Extension of binary (file) dumps.
pub const BIN_EXT: &str = "bin";
/// Extension of process memory dumps.
pub const DMP_EXT: &str = "dmp";
/// Extension appended by the compression worker.
pub const GZ_EXT: &str = "gz";

/// Replacement for `:` in alternate-data-stream file names.
pub const ADS_SEPARATOR: &str = "_ADS_";

/// GUID used by the telemetry source when no process is attached.
pub const NULL_GUID: &str = "{00000000-0000-0000-0000-000000000000}";
