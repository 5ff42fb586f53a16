// src/agent.rs

//! The agent core: every event goes through enrichment, the blacklist
//! terminator and the classifier; detections then update the process score
//! and are handed to the action orchestrator and the detection log.

use chrono::{DateTime, Utc};
use log::Level;
use std::{io, sync::Arc};
use tokio::sync::{mpsc, watch};

use shared::{EndpointDumps, list_dumps};

use crate::actions::{ActionHandler, Terminator, handler::Handled};
use crate::compress::CompressionWorker;
use crate::config::Config;
use crate::context::Context;
use crate::db::DetectionRecord;
use crate::engine::{ActionPolicy, Classifier, EmbeddedDetection};
use crate::enrich::Pipeline;
use crate::event::Event;
use crate::guard::state::{PersistedState, load_state, save_state};
use crate::hids_log;
use crate::os::{AgentIdentity, OsApi};
use crate::tracker::ProcessTrack;

pub struct Agent {
    ctx:         Arc<Context>,
    pipeline:    Pipeline,
    classifier:  Box<dyn Classifier>,
    policy:      ActionPolicy,
    handler:     ActionHandler,
    terminator:  Terminator,
    compression: Arc<CompressionWorker>,
    db_tx:       Option<mpsc::Sender<DetectionRecord>>,
}

impl Agent {
    /// Build an agent and restore persisted state. Must be called from
    /// within a tokio runtime; the compression loop is not started, see
    /// [`Agent::compression`].
    pub fn new(config: Config, os: Arc<dyn OsApi>, identity: AgentIdentity) -> Self {
        let policy = ActionPolicy::from(&config.actions);
        let compression = CompressionWorker::new(&config.dump);
        let ctx = Context::new(config, os, identity);
        let handler = ActionHandler::new(Arc::clone(&ctx), Arc::clone(&compression));

        let agent = Self {
            ctx,
            pipeline: Pipeline::standard(),
            classifier: Box::new(EmbeddedDetection),
            policy,
            handler,
            terminator: Terminator::new(),
            compression,
            db_tx: None,
        };
        agent.restore_state();
        agent
    }

    pub fn with_classifier(mut self, classifier: Box<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_detection_log(mut self, tx: mpsc::Sender<DetectionRecord>) -> Self {
        self.db_tx = Some(tx);
        self
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    pub fn compression(&self) -> &Arc<CompressionWorker> {
        &self.compression
    }

    /// Run one event through the whole core and return it enriched and
    /// annotated.
    pub fn process(&self, mut ev: Event) -> Event {
        self.process_with_outcome(&mut ev);
        ev
    }

    /// Like [`Agent::process`], also reporting what the orchestrator did.
    pub fn process_with_outcome(&self, ev: &mut Event) -> Option<Handled> {
        self.pipeline.run(ev, &self.ctx);
        self.terminator.check(ev, &self.ctx);

        let mut detection = self.classifier.classify(ev)?;
        self.policy.apply(&mut detection);
        ev.set_detection(detection.clone());

        if !self.ctx.is_self_event(ev) {
            if let Some(track) = self.ctx.track_of(ev) {
                let mut t = track.write();
                t.score.update_criticality(detection.criticality);
                t.score.update_signature(detection.signatures.iter().cloned());
            }
        }

        let handled = self.handler.handle(ev);

        if let Some(tx) = &self.db_tx {
            if let Some(rec) = DetectionRecord::from_event(ev) {
                if tx.try_send(rec).is_err() {
                    metrics::counter!("hids_db_records_dropped_total").increment(1);
                }
            }
        }
        Some(handled)
    }

    /// Consume events until the source closes or shutdown is signalled.
    pub async fn run(&self, mut rx: mpsc::Receiver<Event>, mut shutdown: watch::Receiver<bool>) {
        hids_log!(Level::Info, "agent", "Agent loop started");
        loop {
            tokio::select! {
                maybe = rx.recv() => match maybe {
                    Some(ev) => {
                        self.process(ev);
                    }
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        hids_log!(Level::Info, "agent", "Agent loop stopped");
    }

    /// Let queued dumps and pending kills finish, then persist state.
    pub async fn shutdown(&self) {
        self.handler.shutdown().await;
        self.save_state();
    }

    /// Enriched state and accumulated score of a tracked process.
    pub fn process_snapshot(&self, guid: &str) -> Option<ProcessTrack> {
        self.ctx.store.get_by_guid(guid).map(|t| t.read().clone())
    }

    /// Artifact directories modified after `since`.
    pub fn artifacts(&self, since: DateTime<Utc>) -> io::Result<Vec<EndpointDumps>> {
        let root = &self.ctx.config.dump.dir;
        if !root.exists() {
            return Ok(Vec::new());
        }
        list_dumps(root, since)
    }

    fn restore_state(&self) {
        let Some(path) = &self.ctx.config.state.path else { return };
        let state = load_state(path, self.ctx.config.state.key.as_bytes());
        for cmd in &state.blacklist {
            self.ctx.store.blacklist(cmd);
        }
        for hash in &state.dumped_hashes {
            self.ctx.guard.dumped.add(hash);
        }
        hids_log!(
            Level::Info,
            "agent",
            "Restored {} blacklisted command line(s), {} dumped hash(es)",
            state.blacklist.len(),
            state.dumped_hashes.len()
        );
    }

    fn save_state(&self) {
        let Some(path) = &self.ctx.config.state.path else { return };
        let state = PersistedState {
            blacklist: self.ctx.store.blacklisted().into_iter().collect(),
            dumped_hashes: self.ctx.guard.dumped.items().into_iter().collect(),
        };
        if let Err(e) = save_state(path, self.ctx.config.state.key.as_bytes(), &state) {
            hids_log!(Level::Error, "agent", "Failed to save state to {}: {}", path.display(), e);
        }
    }
}
