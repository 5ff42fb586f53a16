// src/db/batch_inserts.rs

use chrono::{DateTime, Utc};
use rusqlite::{params, Result as SqlResult, Statement};

use crate::event::{Event, fields::IMAGE};

pub trait BatchInsert<T> {
    fn insert_sql() -> &'static str;
    fn bind_and_execute(stmt: &mut Statement<'_>, record: &T) -> SqlResult<()>;
}

/// One row of the detection log.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRecord {
    pub ts:           DateTime<Utc>,
    pub process_guid: String,
    pub event_hash:   String,
    pub channel:      String,
    pub event_id:     i64,
    pub criticality:  i64,
    pub signatures:   Vec<String>,
    pub actions:      Vec<String>,
    pub image:        String,
    pub event_json:   String,
}

impl DetectionRecord {
    /// `None` when the event carries no detection.
    pub fn from_event(ev: &Event) -> Option<Self> {
        let det = ev.detection()?;
        let event_json = ev
            .to_json()
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .unwrap_or_default();
        Some(Self {
            ts: Utc::now(),
            process_guid: ev.source_guid(),
            event_hash: ev.content_hash(),
            channel: ev.channel().to_string(),
            event_id: ev.event_id(),
            criticality: det.criticality,
            signatures: det.signatures.clone(),
            actions: det.actions.clone(),
            image: ev.get_str(IMAGE).unwrap_or_default(),
            event_json,
        })
    }
}

/// DETECTIONS
impl BatchInsert<DetectionRecord> for DetectionRecord {
    fn insert_sql() -> &'static str {
        "INSERT INTO detections \
           (ts, process_guid, event_hash, channel, event_id, criticality, \
            signatures, actions, image, event_json) \
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)"
    }

    fn bind_and_execute(stmt: &mut Statement<'_>, rec: &DetectionRecord) -> SqlResult<()> {
        stmt.execute(params![
            rec.ts.timestamp_micros(),
            rec.process_guid,
            rec.event_hash,
            rec.channel,
            rec.event_id,
            rec.criticality,
            rec.signatures.join(","),
            rec.actions.join(","),
            rec.image,
            rec.event_json,
        ])?;
        Ok(())
    }
}
