//! Live-update payloads for EMA record changes.

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::domain::diff::diff;
use crate::domain::ema_record::EmaRecord;
use crate::domain::watch::internal_to_external;
use crate::ports::notify_port::NotifyPort;

pub const DEFAULT_GROUP: &str = "ema_record_updates";

const UPDATED_AT: &str = "updated_at";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordEvent {
    Created,
    Updated,
}

/// Message delivered to every subscriber of a group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub event: RecordEvent,
    pub data: Map<String, Value>,
}

impl Notification {
    /// Full record, with display key names.
    pub fn created(record: &EmaRecord) -> Self {
        Self {
            event: RecordEvent::Created,
            data: internal_to_external(&record.representation()),
        }
    }

    /// Changed fields plus the record id, with display key names. `None` when
    /// nothing changed. The `updated_at` stamp alone is not a change and is
    /// never part of the payload.
    pub fn updated(before: &EmaRecord, after: &EmaRecord) -> Option<Self> {
        let mut changes = diff(&before.representation(), &after.representation());
        changes.shift_remove(UPDATED_AT);
        if changes.is_empty() {
            return None;
        }
        let mut data = Map::new();
        data.insert("id".to_string(), Value::String(after.id.to_string()));
        for (key, value) in changes {
            if key != "id" {
                data.insert(key, value);
            }
        }
        Some(Self {
            event: RecordEvent::Updated,
            data: internal_to_external(&data),
        })
    }

    pub fn to_json(&self) -> String {
        json!({ "event": self.event, "data": self.data }).to_string()
    }
}

/// Publish a record change without letting delivery problems reach the caller.
///
/// Returns the number of subscribers reached, or zero when delivery failed.
pub fn publish_record_event(
    notifier: &dyn NotifyPort,
    group: &str,
    notification: &Notification,
) -> usize {
    match notifier.publish(group, notification) {
        Ok(receivers) => {
            tracing::debug!(group, event = ?notification.event, receivers, "record event published");
            receivers
        }
        Err(e) => {
            tracing::warn!(group, event = ?notification.event, error = %e, "failed to publish record event");
            0
        }
    }
}
