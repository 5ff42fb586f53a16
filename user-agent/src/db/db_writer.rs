// src/db/db_writer.rs

use rusqlite::Connection;
use std::{thread::sleep, time::Duration};
use thiserror::Error;

use super::BatchInsert;

/// A batched writer for SQLite.
/// Performs all DB work synchronously to avoid holding &Connection across .await.
pub struct DbWriter<T> {
    pub conn: Connection,
    pub rx: tokio::sync::mpsc::Receiver<T>,
    pub flush_interval_ms: u64,
    pub batch_size: usize,
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),
}

impl<T> DbWriter<T>
where
    T: BatchInsert<T> + Send + 'static,
{
    /// Start the writer loop; call inside tokio::spawn. Returns once every
    /// sender is dropped and the last batch is flushed.
    pub async fn run(mut self) {
        let mut buffer = Vec::with_capacity(self.batch_size);
        let mut interval = tokio::time::interval(Duration::from_millis(self.flush_interval_ms.max(1)));

        loop {
            tokio::select! {
                maybe = self.rx.recv() => match maybe {
                    Some(rec) => {
                        buffer.push(rec);
                        if buffer.len() >= self.batch_size {
                            self.flush_logged(&mut buffer);
                        }
                    }
                    None => {
                        self.flush_logged(&mut buffer);
                        break;
                    }
                },
                _ = interval.tick() => {
                    self.flush_logged(&mut buffer);
                }
            }
        }
    }

    fn flush_logged(&mut self, buffer: &mut Vec<T>) {
        let n = buffer.len();
        if n == 0 {
            return;
        }
        match self.flush_sync(buffer) {
            Ok(()) => metrics::counter!("hids_db_rows_total").increment(n as u64),
            Err(e) => {
                log::error!("dropping {} detection record(s): {}", n, e);
                buffer.clear();
            }
        }
    }

    /// Synchronous flush with retry + backoff.
    pub fn flush_sync(&mut self, buffer: &mut Vec<T>) -> Result<(), DbError> {
        let mut attempts = 0;

        while !buffer.is_empty() {
            match self.conn.transaction() {
                Ok(tx) => {
                    {
                        let mut stmt = tx.prepare_cached(T::insert_sql())?;
                        for rec in buffer.drain(..) {
                            T::bind_and_execute(&mut stmt, &rec)?;
                        }
                    }
                    tx.commit()?;
                }
                Err(e) if e.to_string().contains("database is locked") && attempts < 5 => {
                    attempts += 1;
                    sleep(Duration::from_millis(50 * attempts));
                }
                Err(e) => return Err(DbError::Sql(e)),
            }
        }
        Ok(())
    }
}
