//! Read-only views assembled from committed state
//!
//! Builders only read through the repository traits; callers run them inside
//! one read transaction so a view never mixes two batches.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{CurrentState, Event, Hub, Meeting, MeetingPhase, Member, MemberPresence, Project};
use crate::storage::Storage;

use super::event_log::EventLog;

/// Name and key of the member wearing a badge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeEntry {
    pub name: String,
    pub key: String,
}

/// Badge and key of a member, indexed by display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedMember {
    pub key: String,
    pub badge: String,
}

/// One hub's view of a meeting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub is_active: bool,
    pub last_activity_update: i64,
    pub last_log_index: i64,
    pub members: BTreeMap<String, MemberPresence>,
}

impl From<CurrentState> for HistorySummary {
    fn from(state: CurrentState) -> Self {
        Self {
            is_active: state.is_active,
            last_activity_update: state.last_activity_update,
            last_log_index: state.last_log_index,
            members: state.members,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingView {
    pub uuid: String,
    pub key: String,
    pub log_version: f64,
    pub phase: MeetingPhase,
    pub start_time: Option<f64>,
    pub end_time: Option<f64>,
    pub is_active: bool,
    pub last_update_timestamp: Option<f64>,
    pub last_update_index: Option<i64>,
    /// Events logged so far across all hubs
    pub event_count: u64,
    /// Per-hub history keyed by hub uuid
    pub hubs: BTreeMap<String, HistorySummary>,
    /// Full event log in display order, only when asked for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub events: Option<Vec<Event>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectView {
    pub project_id: Uuid,
    pub key: String,
    pub name: String,
    pub badge_map: BTreeMap<String, BadgeEntry>,
    pub members: BTreeMap<String, NamedMember>,
    /// Active meetings keyed by meeting uuid
    pub meetings: BTreeMap<String, MeetingView>,
}

/// The meeting a hub is attached to, with that hub's progress in it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentMeeting {
    pub uuid: String,
    pub start_time: Option<f64>,
    pub is_active: bool,
    pub last_log_index: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubView {
    pub name: String,
    pub is_super_user: bool,
    pub current_meeting: Option<CurrentMeeting>,
    /// Members changed after the requested time, keyed by badge
    pub badge_map: BTreeMap<String, BadgeEntry>,
    /// Meeting uuid -> this hub's last applied log index
    pub last_updates: BTreeMap<String, i64>,
}

fn badge_entry(member: &Member) -> BadgeEntry {
    BadgeEntry {
        name: member.name.clone(),
        key: member.key.clone(),
    }
}

/// Meeting metadata with every hub's history, optionally with the event log
pub fn build_meeting_view<S: Storage + ?Sized>(
    store: &S,
    meeting: &Meeting,
    include_events: bool,
) -> Result<MeetingView> {
    let hubs = store
        .list_meeting_histories(&meeting.uuid)?
        .into_iter()
        .map(|state| (state.hub_uuid.clone(), HistorySummary::from(state)))
        .collect();
    let log = EventLog::new(store);
    let events = if include_events {
        Some(log.meeting_log(&meeting.uuid)?)
    } else {
        None
    };

    Ok(MeetingView {
        uuid: meeting.uuid.clone(),
        key: meeting.key.clone(),
        log_version: meeting.log_version,
        phase: meeting.phase(),
        start_time: meeting.start_time,
        end_time: meeting.end_time,
        is_active: meeting.is_active,
        last_update_timestamp: meeting.last_update_timestamp,
        last_update_index: meeting.last_update_index,
        event_count: log.count(&meeting.uuid)?,
        hubs,
        events,
    })
}

/// Project members and its active meetings
pub fn build_project_view<S: Storage + ?Sized>(store: &S, project: &Project) -> Result<ProjectView> {
    let members = store.list_members(project.id)?;
    let badge_map = members
        .iter()
        .map(|m| (m.badge.clone(), badge_entry(m)))
        .collect();
    let by_name = members
        .iter()
        .map(|m| {
            (
                m.name.clone(),
                NamedMember {
                    key: m.key.clone(),
                    badge: m.badge.clone(),
                },
            )
        })
        .collect();

    let mut meetings = BTreeMap::new();
    for meeting in store.list_meetings(project.id, true)? {
        let view = build_meeting_view(store, &meeting, false)?;
        meetings.insert(meeting.uuid, view);
    }

    Ok(ProjectView {
        project_id: project.id,
        key: project.key.clone(),
        name: project.name.clone(),
        badge_map,
        members: by_name,
        meetings,
    })
}

/// What a reconnecting hub needs: its meeting, its progress and the member delta.
/// `since = None` returns every member.
pub fn build_hub_view<S: Storage + ?Sized>(
    store: &S,
    hub: &Hub,
    since: Option<DateTime<Utc>>,
) -> Result<HubView> {
    let members = match since {
        Some(since) => store.list_members_updated_since(hub.project_id, since)?,
        None => store.list_members(hub.project_id)?,
    };
    let badge_map = members
        .iter()
        .map(|m| (m.badge.clone(), badge_entry(m)))
        .collect();

    let histories = store.list_hub_histories(&hub.uuid)?;
    let last_updates: BTreeMap<String, i64> = histories
        .iter()
        .map(|state| (state.meeting_uuid.clone(), state.last_log_index))
        .collect();

    let current_meeting = match hub.current_meeting.as_deref() {
        Some(uuid) => store.find_meeting(uuid)?.map(|meeting| CurrentMeeting {
            last_log_index: last_updates.get(uuid).copied().unwrap_or(crate::models::NO_INDEX),
            uuid: meeting.uuid,
            start_time: meeting.start_time,
            is_active: meeting.is_active,
        }),
        None => None,
    };

    Ok(HubView {
        name: hub.name.clone(),
        is_super_user: hub.is_super_user,
        current_meeting,
        badge_map,
        last_updates,
    })
}

/// Last second of year 9999; stored timestamps past it no longer sort as text
const LATEST_WATERMARK_SECS: i64 = 253_402_300_799;

/// Convert an epoch-seconds watermark; zero, negative or NaN means "everything".
/// Watermarks beyond the representable range clamp to the latest sortable instant.
pub fn since_from_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if seconds.is_nan() || seconds <= 0.0 {
        return None;
    }
    if seconds >= LATEST_WATERMARK_SECS as f64 {
        return DateTime::from_timestamp(LATEST_WATERMARK_SECS, 999_999_000);
    }
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Project;
    use crate::storage::{
        Database, HistoryRepository, HubRepository, MeetingRepository, MemberRepository,
        ProjectRepository,
    };
    use chrono::Duration;

    fn seed() -> (Database, Project, Hub) {
        let db = Database::open_in_memory().unwrap();
        let project = Project::new("Lab".into(), "LAB0000001".into());
        db.create_project(&project).unwrap();
        let hub = Hub::new("H".into(), "Front".into(), project.id);
        db.create_hub(&hub).unwrap();
        (db, project, hub)
    }

    #[test]
    fn test_since_from_seconds() {
        assert_eq!(since_from_seconds(0.0), None);
        assert_eq!(since_from_seconds(-5.0), None);
        assert_eq!(since_from_seconds(f64::NAN), None);
        let at = since_from_seconds(1_700_000_000.5).unwrap();
        assert_eq!(at.timestamp(), 1_700_000_000);
        assert_eq!(at.timestamp_subsec_millis(), 500);
    }

    #[test]
    fn test_far_future_watermark_clamps() {
        let ceiling = since_from_seconds(1e20).unwrap();
        assert_eq!(ceiling.timestamp(), LATEST_WATERMARK_SECS);
        assert_eq!(since_from_seconds(f64::INFINITY), Some(ceiling));
        assert_eq!(since_from_seconds(1e12), Some(ceiling));
    }

    #[test]
    fn test_far_future_watermark_returns_no_members() {
        let (db, project, hub) = seed();
        db.upsert_member(&Member::new(project.id, "B1".into(), "Ada".into(), "KA".into()))
            .unwrap();

        let view = build_hub_view(&db, &hub, since_from_seconds(1e20)).unwrap();
        assert!(view.badge_map.is_empty());
        let view = build_hub_view(&db, &hub, since_from_seconds(1e12)).unwrap();
        assert!(view.badge_map.is_empty());
    }

    #[test]
    fn test_project_view_lists_only_active_meetings() {
        let (db, project, hub) = seed();
        db.upsert_member(&Member::new(project.id, "B1".into(), "Ada".into(), "KA".into()))
            .unwrap();

        let mut live = Meeting::new("LAB|1".into(), "M1".into(), project.id, 1.0);
        live.start_time = Some(10.0);
        live.is_active = true;
        db.create_meeting(&live).unwrap();
        let mut over = Meeting::new("LAB|2".into(), "M2".into(), project.id, 1.0);
        over.start_time = Some(1.0);
        over.end_time = Some(2.0);
        db.create_meeting(&over).unwrap();

        let mut state = CurrentState::new(live.uuid.clone(), hub.uuid.clone());
        state.is_active = true;
        state.last_activity_update = 0;
        state.last_log_index = 0;
        db.save_history(&state).unwrap();

        let view = build_project_view(&db, &project).unwrap();
        assert_eq!(view.key, "LAB0000001");
        assert_eq!(view.badge_map["B1"].name, "Ada");
        assert_eq!(view.members["Ada"].badge, "B1");
        assert_eq!(view.meetings.len(), 1);
        let meeting = &view.meetings["LAB|1"];
        assert_eq!(meeting.phase, MeetingPhase::Active);
        assert!(meeting.hubs["H"].is_active);
        assert!(meeting.events.is_none());
        assert_eq!(meeting.event_count, 0);
    }

    #[test]
    fn test_hub_view_delta_and_last_updates() {
        let (db, project, mut hub) = seed();
        let old = db
            .upsert_member(&Member::new(project.id, "B1".into(), "Ada".into(), "KA".into()))
            .unwrap();
        let mut fresh = Member::new(project.id, "B2".into(), "Bo".into(), "KB".into());
        fresh.updated_at = old.updated_at + Duration::seconds(10);
        db.upsert_member(&fresh).unwrap();

        let meeting = Meeting::new("LAB|1".into(), "M1".into(), project.id, 1.0);
        db.create_meeting(&meeting).unwrap();
        let mut state = CurrentState::new(meeting.uuid.clone(), hub.uuid.clone());
        state.last_log_index = 7;
        db.save_history(&state).unwrap();
        hub.current_meeting = Some(meeting.uuid.clone());
        db.update_hub(&hub).unwrap();

        let full = build_hub_view(&db, &hub, None).unwrap();
        assert_eq!(full.badge_map.len(), 2);
        assert_eq!(full.name, "Front");

        let delta = build_hub_view(&db, &hub, Some(old.updated_at)).unwrap();
        assert_eq!(delta.badge_map.keys().collect::<Vec<_>>(), vec!["B2"]);
        assert_eq!(delta.last_updates["LAB|1"], 7);
        assert_eq!(delta.current_meeting.unwrap().last_log_index, 7);
    }
}
