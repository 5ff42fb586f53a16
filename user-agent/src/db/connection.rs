// src/db/connection.rs
//! Opening and initialising SQLite with runtime parameters.

use std::{fs, path::{Path, PathBuf}, time::Duration};
use rusqlite::Connection;
use crate::config::model::DatabaseConfig;

pub fn db_path(base_dir: &Path, cfg: &DatabaseConfig) -> PathBuf {
    base_dir.join(&cfg.path)
}

pub fn open_db_connection(path: &Path, cfg: &DatabaseConfig) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(Duration::from_millis(1_000))?;
    let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    log::debug!("SQLite journal_mode={}", mode);
    conn.pragma_update(None, "synchronous", cfg.synchronous.as_str())?;
    Ok(conn)
}

pub fn init_database(base_dir: &Path, cfg: &DatabaseConfig) -> rusqlite::Result<Connection> {
    let path = db_path(base_dir, cfg);

    if cfg.purge_on_restart && path.exists() {
        let _ = fs::remove_file(&path);
    }

    let conn = open_db_connection(&path, cfg)?;
    conn.pragma_update(None, "journal_size_limit", cfg.journal_size_limit as i64)?;

    // idempotent: every statement is IF NOT EXISTS
    let schema = include_str!("../../resources/schema.sql");
    conn.execute_batch(schema)?;
    log::info!("Database ready at {}", path.display());
    Ok(conn)
}
