// src/lib.rs
// ────────────────────────────────────────────────────────────────────────────
// Public library entry point.  Re-export everything for both `main.rs` and
// integration tests.

pub mod macros;

pub mod actions;
pub mod agent;
pub mod comms;
pub mod compress;
pub mod config;
pub mod context;
pub mod db;
pub mod engine;
pub mod enrich;
pub mod event;
pub mod guard;
pub mod os;
pub mod tracker;

pub use agent::Agent;
pub use context::Context;
pub use event::{Detection, Event};
