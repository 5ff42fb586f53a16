// src/db/mod.rs
//! Public façade for the detection log (re-exports plus spawn_writer).

pub mod connection;
pub mod maintenance;
pub mod db_writer;
pub mod batch_inserts;

use rusqlite::Connection;
use tokio::{sync::mpsc as async_mpsc, task::JoinHandle};
use crate::config::model::DatabaseConfig;
pub use db_writer::{DbError, DbWriter};
pub use batch_inserts::{BatchInsert, DetectionRecord};

/// Spawn a dedicated writer task for records of type `E`.
pub fn spawn_writer<E>(
    conn: Connection,
    rx: async_mpsc::Receiver<E>,
    cfg: &DatabaseConfig,
) -> JoinHandle<()>
where
    E: BatchInsert<E> + Send + 'static,
{
    // Copy what we need so nothing borrowed lives in the async task
    let flush_ms  = cfg.flush_interval_ms;
    let batch_sz  = cfg.batch_size.max(1);

    tokio::spawn(async move {
        DbWriter::<E> {
            conn,
            rx,
            flush_interval_ms: flush_ms,
            batch_size:        batch_sz,
        }
            .run()
            .await;
    })
}
