//! Listener abstraction + concrete sources (JSON lines, in-process channel).
//! -----------------------------------------------------------------------------
//! A **listener** ingests raw telemetry from one source and hands it to a
//! small **triage** task that forwards it to the agent:
//!   • `ingest` runs the source-specific I/O loop;
//!   • `triage` drops records the agent cannot use;
//!   • the forward side uses `send().await`, so a slow agent pushes back on
//!     the source instead of losing events.

use anyhow::Context as _;
use async_trait::async_trait;
use crossbeam::channel::Receiver as CbReceiver;
use std::{path::PathBuf, sync::Arc};
use tokio::{
    fs::File,
    io::{AsyncBufRead, AsyncBufReadExt, BufReader},
    sync::{mpsc, watch},
    task::{self, JoinHandle},
};

use crate::event::Event;

// ============================================================================
// 1 ▸ Listener trait – uniform way to spawn them
// ============================================================================

#[async_trait]
pub trait Listener: Send + Sync + 'static {
    /// Display name for logs.
    fn name(&self) -> &'static str;

    /// Capacity of the per-listener raw queue.
    fn capacity(&self) -> usize {
        16_384
    }

    /// Pull events from the external source into `tx` until the source is
    /// exhausted, `tx` is closed or shutdown is signalled.
    async fn ingest(self: Arc<Self>, tx: mpsc::Sender<Event>, shutdown: watch::Receiver<bool>) -> anyhow::Result<()>;

    /// Optional triage step – default drops events without a channel.
    fn triage(&self, ev: Event) -> Option<Event> {
        (!ev.channel().is_empty()).then_some(ev)
    }

    /// Launch *ingest* + *triage*; the returned handle completes once both
    /// are done.
    fn spawn(self: Arc<Self>, out: mpsc::Sender<Event>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let name = self.name();
        let (raw_tx, mut raw_rx) = mpsc::channel::<Event>(self.capacity());
        let ingest_self = Arc::clone(&self);

        // ── Task 1: ingest (source-specific) ─────────────────────────────
        let ingest = task::spawn(async move {
            log::info!("listener '{name}' started");
            if let Err(e) = ingest_self.ingest(raw_tx, shutdown).await {
                log::error!("listener '{name}' failed: {e:#}");
            }
            log::info!("listener '{name}' exited");
        });

        // ── Task 2: triage & forward ─────────────────────────────────────
        task::spawn(async move {
            while let Some(ev) = raw_rx.recv().await {
                if let Some(ev) = self.triage(ev) {
                    if out.send(ev).await.is_err() {
                        break;
                    }
                }
            }
            let _ = ingest.await;
            log::info!("triage for '{name}' terminated – chan closed");
        })
    }
}

// ============================================================================
// 2 ▸ JSON lines (file or stdin)
// ============================================================================

/// One event per line, in the event log JSON form. `-` reads stdin.
pub struct JsonLinesListener {
    path: String,
}

impl JsonLinesListener {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    async fn pump<R>(reader: R, tx: mpsc::Sender<Event>, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin + Send,
    {
        let mut lines = reader.lines();
        let mut bad = 0u64;
        loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = shutdown.changed() => break,
            };
            let Some(line) = line else { break };
            if line.trim().is_empty() {
                continue;
            }
            match Event::from_json(&line) {
                Ok(ev) => {
                    if tx.send(ev).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    bad += 1;
                    log::warn!("skipping malformed event line: {e}");
                }
            }
        }
        if bad > 0 {
            log::warn!("{bad} malformed event line(s) skipped");
        }
        Ok(())
    }
}

#[async_trait]
impl Listener for JsonLinesListener {
    fn name(&self) -> &'static str {
        "json_lines"
    }

    async fn ingest(self: Arc<Self>, tx: mpsc::Sender<Event>, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        if self.path == "-" {
            Self::pump(BufReader::new(tokio::io::stdin()), tx, shutdown).await
        } else {
            let path = PathBuf::from(&self.path);
            let file = File::open(&path)
                .await
                .with_context(|| format!("opening telemetry file {}", path.display()))?;
            Self::pump(BufReader::new(file), tx, shutdown).await
        }
    }
}

// ============================================================================
// 3 ▸ In-process channel (embedding hosts, tests)
// ============================================================================

/// Pulls events from a crossbeam channel fed by an embedding host.
pub struct ChannelListener {
    rx: CbReceiver<Event>,
}

impl ChannelListener {
    pub fn new(rx: CbReceiver<Event>) -> Self {
        Self { rx }
    }
}

#[async_trait]
impl Listener for ChannelListener {
    fn name(&self) -> &'static str {
        "channel"
    }

    async fn ingest(self: Arc<Self>, tx: mpsc::Sender<Event>, _shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        // Offload the blocking recv loop to a dedicated OS thread; it ends
        // when the host drops its sender.
        let rx = self.rx.clone();
        task::spawn_blocking(move || {
            while let Ok(ev) = rx.recv() {
                // blocking_send() will block _this_ thread only, never a Tokio worker
                if tx.blocking_send(ev).is_err() {
                    break;
                }
            }
        })
        .await
        .context("channel ingest task panicked")
    }
}
