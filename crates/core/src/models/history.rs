//! Current-state projection for one (meeting, hub) pair

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Log index meaning "nothing applied yet"
pub const NO_INDEX: i64 = -1;

/// Presence of one member as seen through a hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberPresence {
    pub is_active: bool,
    /// Log index of the event that last set `is_active`
    pub last_activity_update: i64,
}

/// Derived state of a hub within a meeting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentState {
    pub meeting_uuid: String,
    pub hub_uuid: String,
    pub is_active: bool,
    /// Log index of the event that last set `is_active`
    pub last_activity_update: i64,
    /// Highest log index applied, read by the gap detector
    pub last_log_index: i64,
    /// Badge to presence
    pub members: BTreeMap<String, MemberPresence>,
}

impl CurrentState {
    pub fn new(meeting_uuid: String, hub_uuid: String) -> Self {
        Self {
            meeting_uuid,
            hub_uuid,
            is_active: false,
            last_activity_update: NO_INDEX,
            last_log_index: NO_INDEX,
            members: BTreeMap::new(),
        }
    }

    pub fn active_members(&self) -> impl Iterator<Item = &str> {
        self.members
            .iter()
            .filter(|(_, presence)| presence.is_active)
            .map(|(badge, _)| badge.as_str())
    }
}
