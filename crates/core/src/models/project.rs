//! Project model - the organization-level owner of hubs, members and meetings

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A Project groups hubs, badges and meetings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    /// Short generated key hubs use to address the project
    pub key: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(name: String, key: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            name,
            created_at: Utc::now(),
        }
    }
}

/// Aggregate counters for administrative reporting
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProjectStats {
    pub member_count: u64,
    pub meeting_count: u64,
    /// Sum over ended meetings of last update time minus start time
    pub total_meeting_seconds: f64,
}
