//! Session payload adapter
//!
//! Parses session JSON produced by the feed tracker into a [`Session`]. The
//! payload itself must be a JSON object with an id and a start time; anything
//! below that is recovered where possible. Interactions that cannot be read are
//! dropped with a warning, and metadata fields of the wrong type are ignored.

use crate::error::ComputeError;
use crate::types::{Interaction, InteractionAction, InteractionMetadata, ScrollDirection, Session};
use chrono::{DateTime, Utc};
use log::warn;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Parse a tracker session payload.
///
/// Running totals (`videoCount`, `totalDwellTime`) are recomputed from the
/// interactions that were kept, so they always agree with the event log.
pub fn parse_session(json: &str) -> Result<Session, ComputeError> {
    let value: Value = serde_json::from_str(json)
        .map_err(|e| ComputeError::ParseError(format!("Failed to parse session: {}", e)))?;
    session_from_value(&value)
}

/// Build a session from an already-decoded JSON value
pub fn session_from_value(value: &Value) -> Result<Session, ComputeError> {
    let object = value
        .as_object()
        .ok_or_else(|| ComputeError::ParseError("Session payload must be an object".to_string()))?;

    let id = object
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ComputeError::ParseError("Session is missing an id".to_string()))?;
    let start_time = object
        .get("startTime")
        .and_then(parse_timestamp)
        .ok_or_else(|| {
            ComputeError::ParseError(format!("Session {} has no valid startTime", id))
        })?;
    let utc_offset_minutes = object
        .get("utcOffsetMinutes")
        .and_then(Value::as_i64)
        .and_then(|m| i32::try_from(m).ok())
        .unwrap_or(0);

    let mut session = Session::start(id, start_time, utc_offset_minutes);

    match object.get("interactions") {
        Some(Value::Array(items)) => {
            for (index, item) in items.iter().enumerate() {
                match parse_interaction(item, id) {
                    Some(interaction) => {
                        session.record(interaction);
                    }
                    None => warn!("session {}: skipping malformed interaction #{}", id, index),
                }
            }
        }
        None | Some(Value::Null) => {}
        Some(_) => warn!("session {}: interactions is not an array, ignoring", id),
    }

    let end_time = object.get("endTime").and_then(parse_timestamp);
    let is_active = object
        .get("isActive")
        .and_then(Value::as_bool)
        .unwrap_or(end_time.is_none());
    if !is_active {
        let end = end_time.unwrap_or_else(|| session.effective_end());
        session.finish(end);
    }

    Ok(session)
}

fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        // Epoch milliseconds
        Value::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
        _ => None,
    }
}

fn parse_action(value: &Value) -> Option<InteractionAction> {
    serde_json::from_value(value.clone()).ok()
}

fn parse_interaction(value: &Value, session_id: &str) -> Option<Interaction> {
    let object = value.as_object()?;
    let video_id = object.get("videoId").and_then(Value::as_str)?;
    let timestamp = object.get("timestamp").and_then(parse_timestamp)?;
    let action = object.get("action").and_then(parse_action)?;

    let id = object
        .get("id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let metadata = object
        .get("metadata")
        .and_then(Value::as_object)
        .map(parse_metadata)
        .unwrap_or_default();

    Some(Interaction {
        id,
        video_id: video_id.to_string(),
        session_id: session_id.to_string(),
        timestamp,
        action,
        metadata,
    })
}

fn finite(object: &Map<String, Value>, key: &str) -> Option<f64> {
    object
        .get(key)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
}

fn parse_metadata(object: &Map<String, Value>) -> InteractionMetadata {
    InteractionMetadata {
        dwell_time_ms: finite(object, "dwellTimeMs").or_else(|| finite(object, "dwellTime")),
        scroll_speed: finite(object, "scrollSpeed"),
        video_order: object
            .get("videoOrder")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok()),
        scroll_direction: object
            .get("scrollDirection")
            .and_then(|v| serde_json::from_value::<ScrollDirection>(v.clone()).ok()),
        scroll_distance: finite(object, "scrollDistance"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn sample_json() -> &'static str {
        r#"{
            "id": "sess-1",
            "startTime": "2024-01-15T14:00:00Z",
            "endTime": "2024-01-15T14:01:00Z",
            "isActive": false,
            "utcOffsetMinutes": -300,
            "videoCount": 99,
            "interactions": [
                {"id": "i1", "videoId": "v1", "sessionId": "sess-1", "timestamp": "2024-01-15T14:00:00Z", "action": "enter", "metadata": {"videoOrder": 0}},
                {"id": "i2", "videoId": "v1", "sessionId": "sess-1", "timestamp": "2024-01-15T14:00:12Z", "action": "leave", "metadata": {"dwellTimeMs": 12000}},
                {"id": "i3", "videoId": "v2", "timestamp": 1705327213000, "action": "enter"},
                {"id": "i4", "videoId": "v2", "timestamp": "2024-01-15T14:00:20Z", "action": "leave", "metadata": {"dwellTimeMs": 7000}}
            ]
        }"#
    }

    #[test]
    fn test_parse_session() {
        let session = parse_session(sample_json()).unwrap();

        assert_eq!(session.id, "sess-1");
        assert_eq!(session.utc_offset_minutes, -300);
        assert!(!session.is_active);
        assert_eq!(
            session.end_time,
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 14, 1, 0).unwrap())
        );
        assert_eq!(session.interactions.len(), 4);
        assert_eq!(session.video_count, 2);
        assert_eq!(session.total_dwell_time, 19_000.0);
        assert_eq!(session.interactions[0].metadata.video_order, Some(0));
        assert_eq!(
            session.interactions[2].timestamp,
            Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 13).unwrap()
        );
        assert_eq!(session.interactions[2].session_id, "sess-1");
    }

    #[test]
    fn test_malformed_interactions_are_skipped() {
        let json = r#"{
            "id": "s",
            "startTime": "2024-01-15T14:00:00Z",
            "interactions": [
                {"videoId": "v1", "timestamp": "2024-01-15T14:00:00Z", "action": "enter"},
                {"videoId": "v1", "timestamp": "not a time", "action": "leave"},
                {"videoId": "v1", "timestamp": "2024-01-15T14:00:05Z", "action": "teleport"},
                "garbage",
                {"timestamp": "2024-01-15T14:00:05Z", "action": "leave"},
                {"videoId": "v1", "timestamp": "2024-01-15T14:00:05Z", "action": "leave", "metadata": {"dwellTimeMs": "five", "scrollSpeed": 3.5}}
            ]
        }"#;
        let session = parse_session(json).unwrap();

        assert_eq!(session.interactions.len(), 2);
        assert!(session.is_active);
        let leave = &session.interactions[1];
        assert_eq!(leave.metadata.dwell_time_ms, None);
        assert_eq!(leave.metadata.scroll_speed, Some(3.5));
        assert!(!leave.id.is_empty());
    }

    #[test]
    fn test_non_array_interactions() {
        let json = r#"{"id": "s", "startTime": "2024-01-15T14:00:00Z", "interactions": {"a": 1}}"#;
        let session = parse_session(json).unwrap();
        assert!(session.interactions.is_empty());
        assert_eq!(session.video_count, 0);
    }

    #[test]
    fn test_finished_without_end_time_uses_last_interaction() {
        let json = r#"{
            "id": "s",
            "startTime": "2024-01-15T14:00:00Z",
            "isActive": false,
            "interactions": [
                {"videoId": "v1", "timestamp": "2024-01-15T14:00:00Z", "action": "enter"},
                {"videoId": "v1", "timestamp": "2024-01-15T14:00:30Z", "action": "leave"}
            ]
        }"#;
        let session = parse_session(json).unwrap();
        assert_eq!(
            session.end_time,
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 30).unwrap())
        );
    }

    #[test]
    fn test_rejects_unusable_payloads() {
        for json in [
            "not json",
            "[1, 2]",
            r#"{"startTime": "2024-01-15T14:00:00Z"}"#,
            r#"{"id": "s"}"#,
            r#"{"id": "", "startTime": "2024-01-15T14:00:00Z"}"#,
        ] {
            assert!(
                matches!(parse_session(json), Err(ComputeError::ParseError(_))),
                "{json}"
            );
        }
    }
}
