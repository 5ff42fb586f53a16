//! Process tracking: the live process table and its records.

pub mod store;
pub mod track;

pub use store::{ProcessStore, TrackRef};
pub use track::{DriverInfo, GeneScore, ProcessFacts, ProcessTrack};
