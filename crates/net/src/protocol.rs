//! Request/response messages exchanged with hubs
//!
//! Both directions are JSON documents tagged by a `type` field.

use badgesync_core::sync::{BatchReceipt, HubView, MeetingView, ProjectView};
use badgesync_core::{Error as CoreError, EventInput, Hub, MemberRef, Project, ProjectStats};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hub to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    Ping,
    SubmitBatch {
        hub_uuid: String,
        meeting_uuid: String,
        events: Vec<EventInput>,
    },
    CreateMeeting {
        hub_uuid: String,
        project_id: Uuid,
        log_version: f64,
        meeting_uuid: String,
    },
    ProjectSnapshot {
        hub_uuid: String,
    },
    HubSnapshot {
        hub_uuid: String,
        /// Epoch seconds; members updated after this are returned
        #[serde(default)]
        since: f64,
    },
    MeetingSnapshot {
        hub_uuid: String,
        meeting_uuid: String,
        #[serde(default)]
        include_events: bool,
    },
    RegisterMember {
        project_id: Uuid,
        badge: String,
        name: String,
        #[serde(default)]
        email: Option<String>,
    },
    CreateProject {
        name: String,
    },
    RegisterHub {
        hub_uuid: String,
    },
    RenameHub {
        hub_uuid: String,
        name: String,
    },
    ProjectStats {
        project_id: Uuid,
    },
}

impl Request {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Request::Ping => "ping",
            Request::SubmitBatch { .. } => "submit_batch",
            Request::CreateMeeting { .. } => "create_meeting",
            Request::ProjectSnapshot { .. } => "project_snapshot",
            Request::HubSnapshot { .. } => "hub_snapshot",
            Request::MeetingSnapshot { .. } => "meeting_snapshot",
            Request::RegisterMember { .. } => "register_member",
            Request::CreateProject { .. } => "create_project",
            Request::RegisterHub { .. } => "register_hub",
            Request::RenameHub { .. } => "rename_hub",
            Request::ProjectStats { .. } => "project_stats",
        }
    }
}

/// Category of a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    MalformedEvent,
    InvalidOperation,
    /// Server is at its connection limit
    Unavailable,
    Internal,
}

impl From<&CoreError> for ErrorKind {
    fn from(err: &CoreError) -> Self {
        match err {
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::MalformedEvent { .. } => ErrorKind::MalformedEvent,
            CoreError::InvalidOperation(_) => ErrorKind::InvalidOperation,
            CoreError::KeyExhausted { .. }
            | CoreError::Database(_)
            | CoreError::Io(_)
            | CoreError::Serialization(_) => ErrorKind::Internal,
        }
    }
}

/// Server to hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Pong,
    Batch(BatchReceipt),
    MeetingCreated { meeting_uuid: String },
    Project(ProjectView),
    Hub(HubView),
    Meeting(MeetingView),
    Member(MemberRef),
    ProjectCreated(Project),
    HubInfo(Hub),
    Stats(ProjectStats),
    Error { kind: ErrorKind, message: String },
}

impl Response {
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Response::Error {
            kind,
            message: message.into(),
        }
    }

    /// Storage and I/O details stay in the server log
    pub fn from_core_error(err: &CoreError) -> Self {
        let kind = ErrorKind::from(err);
        let message = match kind {
            ErrorKind::Internal => "internal server error".to_string(),
            _ => err.to_string(),
        };
        Response::error(kind, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_submit_batch_wire_shape() {
        let raw = json!({
            "type": "submit_batch",
            "hub_uuid": "H",
            "meeting_uuid": "LAB|1",
            "events": [
                {"type": "hub joined", "log_index": 0, "log_timestamp": 100.0},
                {"type": "member joined", "log_index": 1, "log_timestamp": 105.0,
                 "data": {"badge": "badge123"}}
            ]
        });
        let request: Request = serde_json::from_value(raw).unwrap();
        match request {
            Request::SubmitBatch { events, .. } => {
                assert_eq!(events.len(), 2);
                assert_eq!(events[0].kind, "hub joined");
                assert_eq!(events[1].data["badge"], "badge123");
            }
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn test_optional_fields_default() {
        let request: Request =
            serde_json::from_value(json!({"type": "hub_snapshot", "hub_uuid": "H"})).unwrap();
        assert_eq!(
            request,
            Request::HubSnapshot {
                hub_uuid: "H".into(),
                since: 0.0
            }
        );
    }

    #[test]
    fn test_error_kinds_from_core() {
        let response = Response::from_core_error(&CoreError::malformed(2, "no badge"));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["kind"], "malformed_event");

        let internal = Response::from_core_error(&CoreError::KeyExhausted { attempts: 10 });
        assert_eq!(
            internal,
            Response::error(ErrorKind::Internal, "internal server error")
        );
    }

    #[test]
    fn test_batch_response_flattens_receipt() {
        let bytes = serde_json::to_vec(&Response::Batch(BatchReceipt::missing_events(5))).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "batch");
        assert_eq!(value["status"], "missing events");
        assert_eq!(value["last_update_index"], 5);
        assert_eq!(
            serde_json::from_slice::<Response>(&bytes).unwrap(),
            Response::Batch(BatchReceipt::missing_events(5))
        );
    }
}
