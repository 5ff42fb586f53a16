//! Telemetry intake.
//!
//! A listener pulls raw events from one source and pushes them into the
//! bounded channel consumed by the agent loop.

pub mod listeners;

pub use listeners::{ChannelListener, JsonLinesListener, Listener};
