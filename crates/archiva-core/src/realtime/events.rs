//! Push event envelopes and their payloads.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::RecordId;

/// Raw event as delivered by the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RealtimeEnvelope {
    pub event: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl RealtimeEnvelope {
    pub fn new(event: RealtimeEvent, payload: serde_json::Value) -> Self {
        Self {
            event: event.name().to_string(),
            payload,
        }
    }

    /// Parse one JSON line.
    pub fn parse(line: &str) -> serde_json::Result<Self> {
        serde_json::from_str(line)
    }

    pub fn kind(&self) -> Option<RealtimeEvent> {
        RealtimeEvent::from_name(&self.event)
    }

    pub fn decode_payload(&self) -> serde_json::Result<EventPayload> {
        if self.payload.is_null() {
            return Ok(EventPayload::default());
        }
        EventPayload::deserialize(&self.payload)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RealtimeEvent {
    Created,
    Updated,
    Deleted,
    BulkImported,
    DeleteProgress,
    EditProgress,
}

impl RealtimeEvent {
    pub const ALL: [Self; 6] = [
        Self::Created,
        Self::Updated,
        Self::Deleted,
        Self::BulkImported,
        Self::DeleteProgress,
        Self::EditProgress,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Created => "history:created",
            Self::Updated => "history:updated",
            Self::Deleted => "history:deleted",
            Self::BulkImported => "history:bulk-imported",
            Self::DeleteProgress => "history:delete-progress",
            Self::EditProgress => "history:edit-progress",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.name() == name)
    }

    /// Progress kind for advisory events.
    pub const fn progress_kind(self) -> Option<ProgressKind> {
        match self {
            Self::DeleteProgress => Some(ProgressKind::Delete),
            Self::EditProgress => Some(ProgressKind::Edit),
            _ => None,
        }
    }
}

impl fmt::Display for RealtimeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Event payload. Only the fields the bridge reads are modelled; anything
/// else the server sends is ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    #[serde(default)]
    pub id: Option<RecordId>,
    /// Older servers name the target `recordId`. Some send both keys.
    #[serde(default)]
    pub record_id: Option<RecordId>,
    /// Server emit time (Unix ms)
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// Completion percentage for progress events
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub done: bool,
}

impl EventPayload {
    /// Target record, preferring `id` over `recordId`.
    pub fn target(&self) -> Option<&RecordId> {
        self.id.as_ref().or(self.record_id.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    Delete,
    Edit,
}

/// In-memory progress of a long-running single-record operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationProgress {
    pub kind: ProgressKind,
    pub percent: Option<u8>,
    pub message: Option<String>,
    /// Emit time of the event that produced this entry (Unix ms)
    pub updated_at: i64,
}

impl OperationProgress {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_payload(kind: ProgressKind, payload: &EventPayload, received_at: i64) -> Self {
        Self {
            kind,
            percent: payload
                .progress
                .filter(|value| value.is_finite())
                .map(|value| value.clamp(0.0, 100.0).round() as u8),
            message: payload.message.clone(),
            updated_at: payload.timestamp.unwrap_or(received_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn event_names_round_trip() {
        for event in RealtimeEvent::ALL {
            assert_eq!(RealtimeEvent::from_name(event.name()), Some(event));
        }
        assert_eq!(RealtimeEvent::from_name("history:archived"), None);
    }

    #[test]
    fn parses_envelope_and_payload() {
        let envelope = RealtimeEnvelope::parse(
            r#"{"event":"history:deleted","payload":{"recordId":"rec-7","timestamp":1760000000000,"userId":"u-1"}}"#,
        )
        .unwrap();

        assert_eq!(envelope.kind(), Some(RealtimeEvent::Deleted));
        let payload = envelope.decode_payload().unwrap();
        assert_eq!(payload.target(), Some(&RecordId::from("rec-7")));
        assert_eq!(payload.timestamp, Some(1_760_000_000_000));
    }

    #[test]
    fn payload_with_both_id_keys_prefers_id() {
        let envelope = RealtimeEnvelope::parse(
            r#"{"event":"history:updated","payload":{"id":"rec-8","recordId":"rec-legacy"}}"#,
        )
        .unwrap();

        let payload = envelope.decode_payload().unwrap();
        assert_eq!(payload.target(), Some(&RecordId::from("rec-8")));
    }

    #[test]
    fn missing_payload_decodes_to_default() {
        let envelope = RealtimeEnvelope::parse(r#"{"event":"history:bulk-imported"}"#).unwrap();
        assert_eq!(envelope.decode_payload().unwrap(), EventPayload::default());
    }

    #[test]
    fn progress_percent_is_clamped() {
        let payload = EventPayload {
            progress: Some(142.4),
            ..EventPayload::default()
        };
        let progress = OperationProgress::from_payload(ProgressKind::Edit, &payload, 5);
        assert_eq!(progress.percent, Some(100));
        assert_eq!(progress.updated_at, 5);
    }
}
