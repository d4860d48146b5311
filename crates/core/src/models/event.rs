//! Event model - one entry of a hub's append-only log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Event types the projector understands; everything else is sensor data
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    MeetingStarted,
    HubJoined,
    HubLeft,
    MemberJoined,
    MemberLeft,
    MeetingEnded,
    /// Sensor or application data; logged only
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::MeetingStarted => "meeting started",
            EventKind::HubJoined => "hub joined",
            EventKind::HubLeft => "hub left",
            EventKind::MemberJoined => "member joined",
            EventKind::MemberLeft => "member left",
            EventKind::MeetingEnded => "meeting ended",
            EventKind::Other(kind) => kind,
        }
    }

    /// Member events must name a badge in their payload
    pub fn is_member_event(&self) -> bool {
        matches!(self, EventKind::MemberJoined | EventKind::MemberLeft)
    }

    /// Events that bring a meeting into existence when it is not known yet
    pub fn opens_meeting(&self) -> bool {
        matches!(self, EventKind::MeetingStarted | EventKind::HubJoined)
    }
}

impl From<&str> for EventKind {
    fn from(value: &str) -> Self {
        match value {
            "meeting started" => EventKind::MeetingStarted,
            "hub joined" => EventKind::HubJoined,
            "hub left" => EventKind::HubLeft,
            "member joined" => EventKind::MemberJoined,
            "member left" => EventKind::MemberLeft,
            "meeting ended" => EventKind::MeetingEnded,
            other => EventKind::Other(other.to_string()),
        }
    }
}

impl From<String> for EventKind {
    fn from(value: String) -> Self {
        EventKind::from(value.as_str())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event as submitted by a hub, before validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventInput {
    #[serde(rename = "type")]
    pub kind: String,
    pub log_index: i64,
    pub log_timestamp: f64,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl EventInput {
    pub fn new(kind: impl Into<String>, log_index: i64, log_timestamp: f64) -> Self {
        Self {
            kind: kind.into(),
            log_index,
            log_timestamp,
            data: serde_json::Value::Null,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }
}

/// A validated event bound to its (hub, meeting) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub hub_uuid: String,
    pub meeting_uuid: String,
    pub kind: EventKind,
    pub log_index: i64,
    pub log_timestamp: f64,
    pub data: serde_json::Value,
    pub recorded_at: DateTime<Utc>,
}

impl Event {
    /// Badge named by a member event's payload
    pub fn badge(&self) -> Option<&str> {
        self.data.get("badge").and_then(|b| b.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_names_roundtrip() {
        for name in [
            "meeting started",
            "hub joined",
            "hub left",
            "member joined",
            "member left",
            "meeting ended",
            "proximity",
        ] {
            assert_eq!(EventKind::from(name).as_str(), name);
        }
        assert!(EventKind::HubJoined.opens_meeting());
        assert!(!EventKind::HubLeft.opens_meeting());
        assert!(EventKind::MemberLeft.is_member_event());
    }

    #[test]
    fn test_input_accepts_missing_data() {
        let input: EventInput =
            serde_json::from_value(json!({"type": "hub left", "log_index": 4, "log_timestamp": 9.5}))
                .unwrap();
        assert_eq!(input, EventInput::new("hub left", 4, 9.5));
    }
}
