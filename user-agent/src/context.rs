// src/context.rs

//! State shared by the enrichment pipeline and the action orchestrator.
//!
//! One `Context` is built per agent instance and handed around as
//! `Arc<Context>`; there is no process-wide singleton, so tests can run
//! several independent agents side by side.

use std::sync::Arc;

use crate::config::Config;
use crate::event::Event;
use crate::guard::{DedupGuard, DumpBarrier};
use crate::os::{AgentIdentity, OsApi};
use crate::tracker::{ProcessStore, TrackRef};

pub struct Context {
    pub config:   Config,
    pub store:    ProcessStore,
    pub guard:    DedupGuard,
    pub barrier:  Arc<DumpBarrier>,
    pub os:       Arc<dyn OsApi>,
    pub identity: AgentIdentity,
}

impl Context {
    pub fn new(config: Config, os: Arc<dyn OsApi>, identity: AgentIdentity) -> Arc<Self> {
        Arc::new(Self {
            config,
            store: ProcessStore::new(),
            guard: DedupGuard::new(),
            barrier: DumpBarrier::new(),
            os,
            identity,
        })
    }

    /// Whether per-process state may be built. When termination telemetry
    /// is required, nothing is tracked until it has been observed.
    pub fn tracking_enabled(&self) -> bool {
        !self.config.tracking.require_termination_events || self.store.termination_seen()
    }

    /// Track of the process that emitted `ev`.
    pub fn track_of(&self, ev: &Event) -> Option<TrackRef> {
        self.store.get_by_guid(&ev.source_guid())
    }

    /// Events emitted by the agent itself are never acted upon.
    pub fn is_self_event(&self, ev: &Event) -> bool {
        if self.identity.is_self_guid(&ev.source_guid()) {
            return true;
        }
        self.track_of(ev).is_some_and(|t| self.identity.is_self_pid(t.read().pid))
    }

    /// Release every piece of state tied to a finished process.
    pub fn retire_process(&self, guid: &str) {
        self.store.terminate(guid);
        self.guard.forget_process(guid);
        self.barrier.forget(guid);
    }
}
