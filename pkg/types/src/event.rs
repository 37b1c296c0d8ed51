use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::meta::{ObjectMeta, ResourceKind};
use crate::stats::StatsSample;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Normal => write!(f, "Normal"),
            EventType::Warning => write!(f, "Warning"),
        }
    }
}

/// The object an event is about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectReference {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub uid: String,
}

impl ObjectReference {
    pub fn from_meta(kind: ResourceKind, meta: &ObjectMeta) -> Self {
        Self {
            kind,
            namespace: meta.namespace.clone(),
            name: meta.name.clone(),
            uid: meta.uid.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Position in the log; strictly increasing.
    pub seq: u64,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
    pub involved_object: ObjectReference,
    /// When the event (or its latest repetition) happened.
    pub timestamp: DateTime<Utc>,
    pub first_timestamp: DateTime<Utc>,
    /// Repetitions folded into this entry.
    pub count: u32,
}

/// Everything a subscriber can receive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "object")]
pub enum Notification {
    Event(Event),
    Stats(StatsSample),
}
