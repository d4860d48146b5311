//! Hub model - a mobile gateway relaying badge events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A Hub is owned by a Project and identified by a device-generated uuid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hub {
    pub uuid: String,
    pub name: String,
    pub project_id: Uuid,
    /// Super-user hubs may see every project's data
    pub is_super_user: bool,
    /// Meeting this hub is currently attached to
    pub current_meeting: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Server time of the last batch submission (heartbeat)
    pub last_seen_at: Option<DateTime<Utc>>,
}

impl Hub {
    pub fn new(uuid: String, name: String, project_id: Uuid) -> Self {
        Self {
            uuid,
            name,
            project_id,
            is_super_user: false,
            current_meeting: None,
            created_at: Utc::now(),
            last_seen_at: None,
        }
    }

    pub fn is_in_meeting(&self, meeting_uuid: &str) -> bool {
        self.current_meeting.as_deref() == Some(meeting_uuid)
    }
}
