//! # Event Enrichment Pipeline
//!
//! A fixed, ordered chain of [`Enricher`] steps run on every incoming event
//! before it reaches the detection engine. Each step declares the [`Stage`]
//! it belongs to and the pipeline refuses a step registered out of stage
//! order, which makes the dependency between steps explicit: self
//! identification runs before tracking, tracking before anything that reads
//! a track.
//!
//! Steps are best effort. A step whose preconditions are not met is
//! skipped, and a failing step is logged without affecting the others. Every
//! field a step declares is set on every event it applies to, either to a
//! resolved value or to the `"?"` / `"-1"` placeholders.

pub mod crossref;
pub mod extras;
pub mod identity;
pub mod image;
pub mod services;
pub mod stats;
pub mod tracking;

use log::Level;
use thiserror::Error;

use crate::context::Context;
use crate::event::Event;
use crate::hids_log;
use crate::os::OsError;

/// Relative position of a step in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    SelfId,
    Track,
    ImageLoad,
    Stats,
    CrossRef,
    Services,
    Extras,
}

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("OS lookup failed: {0}")]
    Os(#[from] OsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("step '{step}' ({stage:?}) registered after stage {last:?}")]
    OutOfOrder { step: &'static str, stage: Stage, last: Stage },
}

pub trait Enricher: Send + Sync {
    fn name(&self) -> &'static str;

    fn stage(&self) -> Stage;

    /// Cheap precondition on the event kind.
    fn applies(&self, ev: &Event) -> bool;

    fn enrich(&self, ev: &mut Event, ctx: &Context) -> Result<(), EnrichError>;
}

#[derive(Default)]
pub struct Pipeline {
    steps: Vec<Box<dyn Enricher>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in step, in order.
    pub fn standard() -> Self {
        let steps: Vec<Box<dyn Enricher>> = vec![
            Box::new(identity::SelfIdentify),
            Box::new(tracking::ProcessTermination),
            Box::new(tracking::TrackProcess),
            Box::new(tracking::DriverInventory),
            Box::new(image::ImageLoadContext),
            Box::new(stats::ProcessStats),
            Box::new(crossref::CrossReference),
            Box::new(crossref::FileSystemAudit),
            Box::new(services::ServiceNames),
            Box::new(extras::RegistryValueSize),
            Box::new(extras::ClipboardContent),
            Box::new(extras::ImageSize),
            Box::new(extras::ProcessIntegrity),
        ];
        let mut pipeline = Self::new();
        for step in steps {
            if let Err(e) = pipeline.push(step) {
                unreachable!("built-in pipeline misordered: {e}");
            }
        }
        pipeline
    }

    pub fn push(&mut self, step: Box<dyn Enricher>) -> Result<(), PipelineError> {
        if let Some(last) = self.steps.last().map(|s| s.stage()) {
            if step.stage() < last {
                return Err(PipelineError::OutOfOrder { step: step.name(), stage: step.stage(), last });
            }
        }
        self.steps.push(step);
        Ok(())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    /// Run every applicable step on `ev`, in order.
    pub fn run(&self, ev: &mut Event, ctx: &Context) {
        for step in &self.steps {
            if !step.applies(ev) {
                continue;
            }
            if let Err(e) = step.enrich(ev, ctx) {
                hids_log!(
                    Level::Warn,
                    "enrich",
                    "{} failed on event {}/{}: {}",
                    step.name(),
                    ev.channel(),
                    ev.event_id(),
                    e
                );
            }
        }
    }
}
