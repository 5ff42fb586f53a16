//! Definitions shared between the agent and the management plane.
//!
//! The agent writes response artifacts under a fixed directory layout and the
//! management plane parses that layout directly, so both sides take the names
//! and the directory walk from here.

pub mod constants;
pub mod layout;

pub use layout::{
    artifact_dir, basename, bin_dump_name, list_dumps, memdump_name, sha256_sidecar, DumpFile,
    EndpointDumps,
};
