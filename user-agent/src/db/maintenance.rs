// src/db/maintenance.rs
//! Periodic TTL cleanup & WAL checkpoints.

use std::{path::{Path, PathBuf}, time::Duration};
use rusqlite::Connection;
use tokio::{sync::watch, task::JoinHandle};
use crate::config::model::DatabaseConfig;

/// Delete detections older than `ttl`. Returns the number of rows removed.
pub fn purge_expired(db_path: &Path, ttl: Duration) -> rusqlite::Result<usize> {
    let conn = Connection::open(db_path)?;
    let cutoff = chrono::Utc::now().timestamp_micros() - ttl.as_micros() as i64;
    let removed = conn.execute("DELETE FROM detections WHERE ts < ?1", [cutoff])?;
    checkpoint(&conn)?;
    Ok(removed)
}

/// The pragma reports (busy, log, checkpointed) as a row.
fn checkpoint(conn: &Connection) -> rusqlite::Result<()> {
    conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
}

pub fn spawn_ttl_cleanup(db_path: PathBuf, cfg: &DatabaseConfig, mut shutdown: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
    if cfg.ttl_seconds == 0 { return None; }          // disabled
    let ttl = Duration::from_secs(cfg.ttl_seconds);
    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(60)); // every minute
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            let path = db_path.clone();
            match tokio::task::spawn_blocking(move || purge_expired(&path, ttl)).await {
                Ok(Ok(n)) => log::debug!("TTL cleanup removed {} detection(s)", n),
                Ok(Err(e)) => log::warn!("TTL cleanup failed: {}", e),
                Err(e) => log::warn!("TTL cleanup task failed: {}", e),
            }
        }
    }))
}

pub fn spawn_wal_maintenance(db_path: PathBuf, cfg: &DatabaseConfig, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    let period = Duration::from_secs(cfg.checkpoint_seconds.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            if let Ok(conn) = Connection::open(&db_path) {
                if let Err(e) = checkpoint(&conn) {
                    log::warn!("WAL checkpoint failed: {}", e);
                }
            }
        }
    })
}
