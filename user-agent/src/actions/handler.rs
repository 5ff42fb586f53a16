// src/actions/handler.rs

use log::Level;
use parking_lot::Mutex;
use std::{collections::BTreeSet, sync::Arc};
use tokio::{
    runtime::Handle,
    sync::{Semaphore, mpsc},
    task::{JoinHandle, JoinSet},
};

use shared::constants::NULL_GUID;

use super::Action;
use super::dump::{self, DumpJob};
use crate::compress::CompressionWorker;
use crate::context::Context;
use crate::event::Event;
use crate::hids_log;

/// What the synchronous part of action handling did with a detection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Handled {
    pub actions:     BTreeSet<Action>,
    pub suspended:   bool,
    pub blacklisted: bool,
    /// Dump-class work was refused by the per-process budget.
    pub refused:     bool,
    pub queued:      bool,
}

/// Executes the actions attached to detections.
pub struct ActionHandler {
    ctx:        Arc<Context>,
    compressor: Arc<CompressionWorker>,
    runtime:    Handle,
    tx:         Mutex<Option<mpsc::UnboundedSender<DumpJob>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    killers:    Mutex<Vec<JoinHandle<()>>>,
}

impl ActionHandler {
    /// Start the dump dispatcher. Must be called from within a tokio runtime.
    pub fn new(ctx: Arc<Context>, compressor: Arc<CompressionWorker>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let runtime = Handle::current();
        let dispatcher = runtime.spawn(dispatch(
            Arc::clone(&ctx),
            Arc::clone(&compressor),
            rx,
            ctx.config.dump.workers,
        ));
        Self {
            ctx,
            compressor,
            runtime,
            tx: Mutex::new(Some(tx)),
            dispatcher: Mutex::new(Some(dispatcher)),
            killers: Mutex::new(Vec::new()),
        }
    }

    pub fn compressor(&self) -> &Arc<CompressionWorker> {
        &self.compressor
    }

    /// Handle one detected event.
    ///
    /// Blacklisting and suspension happen before this returns. Dump-class
    /// actions are queued as one job; termination follows once the job's
    /// memory dump settled.
    pub fn handle(&self, ev: &Event) -> Handled {
        let mut handled = Handled::default();
        let Some(detection) = ev.detection() else { return handled };
        if self.ctx.is_self_event(ev) {
            return handled;
        }
        let guid = ev.source_guid();
        if guid == NULL_GUID {
            hids_log!(
                Level::Error,
                "actions",
                "Failed to handle actions for event (channel: {}, id: {}): no process GUID available",
                ev.channel(),
                ev.event_id()
            );
            return handled;
        }

        for name in &detection.actions {
            match name.parse::<Action>() {
                Ok(a) => {
                    handled.actions.insert(a);
                }
                Err(_) => hids_log!(Level::Error, "actions", "Cannot handle {} action as it is unknown", name),
            }
        }
        if handled.actions.is_empty() {
            return handled;
        }

        let track = self.ctx.store.get_by_guid(&guid);
        let target = track
            .as_ref()
            .map(|t| t.read().pid)
            .filter(|pid| !self.ctx.identity.is_self_pid(*pid));

        if handled.actions.contains(&Action::Blacklist) {
            if let (Some(t), Some(_)) = (&track, target) {
                let cmd = {
                    let mut t = t.write();
                    t.blacklisted = true;
                    t.command_line.clone()
                };
                self.ctx.store.blacklist(&cmd);
                handled.blacklisted = true;
            }
        }

        let kill = handled.actions.contains(&Action::Kill);
        if kill {
            if let Some(pid) = target {
                match self.ctx.os.suspend(pid) {
                    Ok(()) => handled.suspended = true,
                    Err(e) => hids_log!(Level::Error, "actions", "Failed to suspend PID={} GUID={}: {}", pid, guid, e),
                }
            }
        }

        let mut memdump_pending = false;
        if handled.actions.iter().any(|a| a.is_dump()) {
            let dump = &self.ctx.config.dump;
            if self.ctx.store.check_dump_count_or_inc(&guid, dump.max_dumps, dump.dump_untracked) {
                let ticket = handled
                    .actions
                    .contains(&Action::Memdump)
                    .then(|| self.ctx.barrier.begin(&guid));
                memdump_pending = ticket.is_some();
                let job = DumpJob {
                    event: ev.clone(),
                    guid: guid.clone(),
                    hash: ev.content_hash(),
                    actions: handled.actions.clone(),
                    track: track.clone(),
                    ticket,
                };
                handled.queued = self.enqueue(job);
                memdump_pending &= handled.queued;
            } else {
                handled.refused = true;
                metrics::counter!("hids_dumps_refused_total").increment(1);
                hids_log!(Level::Warn, "actions", "Not dumping, reached maximum dumps count for guid {}", guid);
            }
        }

        if kill {
            if let Some(pid) = target {
                // a memory dump queued by an earlier detection also holds the kill
                let wait = memdump_pending || self.ctx.barrier.outstanding(&guid) > 0;
                self.kill(pid, &guid, wait);
            }
        }
        handled
    }

    fn enqueue(&self, job: DumpJob) -> bool {
        let tx = self.tx.lock();
        match tx.as_ref() {
            Some(tx) => tx.send(job).is_ok(),
            None => {
                hids_log!(Level::Warn, "actions", "Shutting down, dump for {} not accepted", job.guid);
                false
            }
        }
    }

    fn kill(&self, pid: u32, guid: &str, after_memdump: bool) {
        if !after_memdump {
            terminate(&self.ctx, pid, guid);
            return;
        }
        let ctx = Arc::clone(&self.ctx);
        let guid = guid.to_string();
        let waiter = self.runtime.spawn(async move {
            let wait = ctx.config.dump.kill_wait;
            if !ctx.barrier.settled(&guid, wait).await {
                hids_log!(
                    Level::Error,
                    "actions",
                    "Memory dump of {} not done after {}, killing anyway",
                    guid,
                    humantime::format_duration(wait)
                );
            }
            let _ = tokio::task::spawn_blocking(move || terminate(&ctx, pid, &guid)).await;
        });
        let mut killers = self.killers.lock();
        killers.retain(|k| !k.is_finished());
        killers.push(waiter);
    }

    /// Stop accepting work, then wait for queued dumps and pending kills.
    pub async fn shutdown(&self) {
        drop(self.tx.lock().take());
        let dispatcher = self.dispatcher.lock().take();
        if let Some(d) = dispatcher {
            if let Err(e) = d.await {
                hids_log!(Level::Error, "actions", "Dump dispatcher failed: {}", e);
            }
        }
        let killers: Vec<_> = self.killers.lock().drain(..).collect();
        for k in killers {
            let _ = k.await;
        }
        hids_log!(Level::Info, "actions", "Action handler stopped");
    }
}

fn terminate(ctx: &Context, pid: u32, guid: &str) {
    match ctx.os.terminate(pid) {
        Ok(()) => {
            metrics::counter!("hids_kills_total").increment(1);
            hids_log!(Level::Info, "actions", "Terminated process PID={} GUID={}", pid, guid);
        }
        Err(e) => hids_log!(Level::Error, "actions", "Failed to terminate process PID={} GUID={}: {}", pid, guid, e),
    }
}

/// Single consumer of the dump queue. Each job runs on the blocking pool
/// once a worker slot is free, so a full pool holds the queue back instead
/// of dropping work.
async fn dispatch(
    ctx: Arc<Context>,
    compressor: Arc<CompressionWorker>,
    mut rx: mpsc::UnboundedReceiver<DumpJob>,
    workers: usize,
) {
    let slots = Arc::new(Semaphore::new(workers.max(1)));
    let mut running = JoinSet::new();

    while let Some(job) = rx.recv().await {
        let Ok(permit) = Arc::clone(&slots).acquire_owned().await else { break };
        let ctx = Arc::clone(&ctx);
        let compressor = Arc::clone(&compressor);
        running.spawn_blocking(move || {
            let _slot = permit;
            dump::execute(&ctx, &compressor, job);
        });
        while let Some(done) = running.try_join_next() {
            if let Err(e) = done {
                hids_log!(Level::Error, "actions", "Dump worker panicked: {}", e);
            }
        }
    }
    while let Some(done) = running.join_next().await {
        if let Err(e) = done {
            hids_log!(Level::Error, "actions", "Dump worker panicked: {}", e);
        }
    }
}
