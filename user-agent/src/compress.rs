// src/compress.rs

//! # Compression Worker
//!
//! Artifacts are written uncompressed by the action workers and queued
//! here. A single loop drains the queue every `dump.compression_interval`
//! and gzips each artifact in place (`name` → `name.gz`). Failures are
//! logged and the plain artifact is left where it is.

use crossbeam::queue::SegQueue;
use flate2::{Compression, write::GzEncoder};
use log::Level;
use std::{
    fs::{self, File},
    io::{self, BufReader},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tempfile::NamedTempFile;
use tokio::sync::watch;

use crate::config::model::DumpConfig;
use crate::hids_log;

#[derive(Debug)]
pub struct CompressionWorker {
    queue:    SegQueue<PathBuf>,
    enabled:  bool,
    interval: Duration,
}

impl CompressionWorker {
    pub fn new(cfg: &DumpConfig) -> Arc<Self> {
        Arc::new(Self {
            queue:    SegQueue::new(),
            enabled:  cfg.compression,
            interval: cfg.compression_interval,
        })
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Queue a finished artifact. No-op when compression is disabled.
    pub fn enqueue(&self, path: PathBuf) {
        if self.enabled {
            self.queue.push(path);
        }
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Compress everything queued so far. Returns the number of artifacts
    /// compressed.
    pub fn drain_now(&self) -> usize {
        let mut done = 0;
        while let Some(path) = self.queue.pop() {
            match compress_in_place(&path) {
                Ok(gz) => {
                    done += 1;
                    hids_log!(Level::Debug, "compress", "{} -> {}", path.display(), gz.display());
                }
                Err(e) => {
                    metrics::counter!("hids_compression_failures_total").increment(1);
                    hids_log!(Level::Error, "compress", "Failed to compress {}: {}", path.display(), e);
                }
            }
        }
        done
    }

    /// Poll loop; call inside `tokio::spawn`. Whatever is still queued when
    /// shutdown is signalled gets compressed before returning.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if self.queue.is_empty() {
                        continue;
                    }
                    let me = Arc::clone(&self);
                    if let Err(e) = tokio::task::spawn_blocking(move || me.drain_now()).await {
                        hids_log!(Level::Error, "compress", "Compression task panicked: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        let me = Arc::clone(&self);
        let _ = tokio::task::spawn_blocking(move || me.drain_now()).await;
        hids_log!(Level::Info, "compress", "Compression worker stopped");
    }
}

/// Gzip `path` into `path.gz` and remove the original.
pub fn compress_in_place(path: &Path) -> io::Result<PathBuf> {
    let mut dst = path.as_os_str().to_owned();
    dst.push(".");
    dst.push(shared::constants::GZ_EXT);
    let dst = PathBuf::from(dst);

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp = NamedTempFile::new_in(dir)?;
    let mut src = BufReader::new(File::open(path)?);
    let mut enc = GzEncoder::new(tmp, Compression::fast());
    io::copy(&mut src, &mut enc)?;
    let tmp = enc.finish()?;
    tmp.persist(&dst).map_err(|e| e.error)?;
    fs::remove_file(path)?;
    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    fn worker(enabled: bool) -> Arc<CompressionWorker> {
        let cfg = DumpConfig { compression: enabled, ..crate::config::Config::default().dump };
        CompressionWorker::new(&cfg)
    }

    #[test]
    fn compresses_in_place() {
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("event.json");
        fs::write(&plain, b"{\"a\":1}").unwrap();

        let w = worker(true);
        w.enqueue(plain.clone());
        assert_eq!(w.drain_now(), 1);
        assert!(!plain.exists());

        let mut out = String::new();
        GzDecoder::new(File::open(dir.path().join("event.json.gz")).unwrap())
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "{\"a\":1}");
    }

    #[test]
    fn missing_file_is_logged_not_fatal() {
        let dir = TempDir::new().unwrap();
        let w = worker(true);
        w.enqueue(dir.path().join("gone.bin"));
        assert_eq!(w.drain_now(), 0);
        assert_eq!(w.pending(), 0);
    }

    #[test]
    fn disabled_worker_ignores_queue() {
        let w = worker(false);
        w.enqueue(PathBuf::from("whatever"));
        assert_eq!(w.pending(), 0);
    }

    #[tokio::test]
    async fn shutdown_drains_queue() {
        let dir = TempDir::new().unwrap();
        let plain = dir.path().join("report.json");
        fs::write(&plain, b"{}").unwrap();

        let w = worker(true);
        w.enqueue(plain.clone());
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(Arc::clone(&w).run(rx));
        tx.send(true).unwrap();
        task.await.unwrap();
        assert!(dir.path().join("report.json.gz").exists());
    }
}
