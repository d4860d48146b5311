//! Meeting model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle phase, derived from the meeting's time fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeetingPhase {
    Unstarted,
    Active,
    Ended,
}

/// A Meeting is a bounded session owned by a Project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meeting {
    /// Hub-supplied identifier, usually `{project_key}|{start_time_ms}`
    pub uuid: String,
    pub key: String,
    pub project_id: Uuid,
    /// Log format version the hub writes
    pub log_version: f64,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub is_active: bool,
    /// Timestamp of the latest event applied by any hub
    pub last_update_timestamp: Option<f64>,
    /// Index of the latest event applied by any hub
    pub last_update_index: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Meeting {
    pub fn new(uuid: String, key: String, project_id: Uuid, log_version: f64) -> Self {
        Self {
            uuid,
            key,
            project_id,
            log_version,
            start_time: None,
            end_time: None,
            is_active: false,
            last_update_timestamp: None,
            last_update_index: None,
            created_at: Utc::now(),
        }
    }

    /// Recommended uuid shape for hubs creating a meeting
    pub fn suggested_uuid(project_key: &str, start_time_ms: i64) -> String {
        format!("{}|{}", project_key, start_time_ms)
    }

    pub fn phase(&self) -> MeetingPhase {
        if self.end_time.is_some() {
            MeetingPhase::Ended
        } else if self.start_time.is_some() {
            MeetingPhase::Active
        } else {
            MeetingPhase::Unstarted
        }
    }

    /// Duration from start to the last recorded update, for ended meetings
    pub fn recorded_duration(&self) -> Option<f64> {
        match (self.phase(), self.start_time, self.last_update_timestamp) {
            (MeetingPhase::Ended, Some(start), Some(last)) if last >= start => Some(last - start),
            _ => None,
        }
    }
}
