//! Telemetry event model.
//!
//! An [`Event`] is a Windows event log record in its JSON form:
//!
//! ```json
//! {"Event": {"System": {"Channel": "...", "EventID": 1, ...},
//!            "EventData": {"ProcessGuid": "{...}", ...},
//!            "Detection": {"Criticality": 7, "Actions": ["report"], ...}}}
//! ```
//!
//! `EventData` is a flat key → value map. Enrichment only adds or replaces
//! keys in it; the `Detection` annotation is attached afterwards by the rule
//! engine. The content hash covers `System` and `EventData` only, so the
//! annotation never changes the artifact directory of an event. Members the
//! agent does not model are carried through untouched.

pub mod archive;
pub mod fields;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use twox_hash::XxHash64;

use self::fields::{SYSMON_CHANNEL, UNKNOWN};
use shared::constants::NULL_GUID;

/// Verdict attached by the detection engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "Criticality")]
    pub criticality: i64,
    /// Action names as produced by the engine; unknown names are ignored
    /// (and logged) by the orchestrator.
    #[serde(rename = "Actions", default)]
    pub actions: Vec<String>,
    /// Names of the rules that matched.
    #[serde(rename = "Signature", default)]
    pub signatures: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeCreated {
    #[serde(rename = "SystemTime", default)]
    pub system_time: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct System {
    #[serde(rename = "Channel")]
    pub channel: String,
    #[serde(rename = "EventID")]
    pub event_id: i64,
    #[serde(rename = "Computer", default, skip_serializing_if = "String::is_empty")]
    pub computer: String,
    #[serde(rename = "TimeCreated", default, skip_serializing_if = "Option::is_none")]
    pub time_created: Option<TimeCreated>,
    /// Remaining `System` members (`Provider`, `EventRecordID`, ...), kept
    /// as received.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Body {
    #[serde(rename = "System")]
    system: System,
    #[serde(rename = "EventData", default)]
    data: BTreeMap<String, Value>,
    #[serde(rename = "Detection", default, skip_serializing_if = "Option::is_none")]
    detection: Option<Detection>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// One telemetry record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "Event")]
    body: Body,
}

/// Borrowed view hashed by [`Event::content_hash`].
#[derive(Serialize)]
struct HashedContent<'a> {
    system: &'a System,
    data: &'a BTreeMap<String, Value>,
}

impl Event {
    pub fn new(channel: impl Into<String>, event_id: i64) -> Self {
        Self {
            body: Body {
                system: System {
                    channel: channel.into(),
                    event_id,
                    time_created: Some(TimeCreated {
                        system_time: chrono::Utc::now().to_rfc3339(),
                    }),
                    ..Default::default()
                },
                ..Default::default()
            },
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn from_json(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn channel(&self) -> &str {
        &self.body.system.channel
    }

    pub fn event_id(&self) -> i64 {
        self.body.system.event_id
    }

    pub fn system(&self) -> &System {
        &self.body.system
    }

    pub fn is_sysmon(&self) -> bool {
        self.channel() == SYSMON_CHANNEL
    }

    pub fn data(&self) -> &BTreeMap<String, Value> {
        &self.body.data
    }

    pub fn has(&self, key: &str) -> bool {
        self.body.data.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.body.data.get(key)
    }

    /// String value of a field. Numbers and booleans are rendered.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.body.data.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Integer value of a field, accepting decimal strings and the `0x`
    /// hexadecimal form used by the Security log.
    pub fn get_int(&self, key: &str) -> Option<i64> {
        match self.body.data.get(key)? {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => parse_int(s),
            _ => None,
        }
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.body.data.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.body.data.insert(key.to_string(), value.into());
    }

    /// Set `key` to `value` unless `value` is empty, in which case the
    /// field is set to the unknown marker.
    pub fn set_or_unknown(&mut self, key: &str, value: &str) {
        if value.is_empty() {
            self.set(key, UNKNOWN);
        } else {
            self.set(key, value);
        }
    }

    pub fn detection(&self) -> Option<&Detection> {
        self.body.detection.as_ref()
    }

    pub fn set_detection(&mut self, detection: Detection) {
        self.body.detection = Some(detection);
    }

    /// GUID of the process that emitted the event: `ProcessGuid`, else the
    /// source GUID of cross-process events, else the null GUID.
    pub fn source_guid(&self) -> String {
        [
            fields::PROCESS_GUID,
            fields::SOURCE_PROCESS_GUID,
            fields::CRT_SOURCE_PROCESS_GUID,
        ]
        .iter()
        .find_map(|k| self.get_str(k))
        .unwrap_or_else(|| NULL_GUID.to_string())
    }

    /// Deterministic hash of the event content, hex encoded.
    pub fn content_hash(&self) -> String {
        let content = HashedContent { system: &self.body.system, data: &self.body.data };
        // BTreeMap keys and fixed struct order keep the encoding canonical
        let bytes = serde_json::to_vec(&content).unwrap_or_default();
        format!("{:016x}", XxHash64::oneshot(0, &bytes))
    }
}

fn parse_int(s: &str) -> Option<i64> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => i64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}
