//! Storage repository traits
//!
//! The sync engine talks to the durable store only through these traits.
//! SQLite handles (a plain connection or an open transaction) implement them
//! through [`StoreAccess`]; other backends can implement them directly.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use super::{EventStore, HistoryStore, HubStore, MeetingStore, MemberStore, ProjectStore};
use crate::error::Result;
use crate::models::{CurrentState, Event, Hub, Meeting, Member, Project, ProjectStats};

/// Project repository operations
pub trait ProjectRepository {
    fn create_project(&self, project: &Project) -> Result<()>;

    fn find_project(&self, id: Uuid) -> Result<Option<Project>>;

    fn find_project_by_key(&self, key: &str) -> Result<Option<Project>>;

    fn find_project_by_name(&self, name: &str) -> Result<Option<Project>>;

    fn project_key_exists(&self, key: &str) -> Result<bool>;

    fn project_stats(&self, id: Uuid) -> Result<ProjectStats>;
}

/// Hub repository operations
pub trait HubRepository {
    fn create_hub(&self, hub: &Hub) -> Result<()>;

    fn find_hub(&self, uuid: &str) -> Result<Option<Hub>>;

    fn update_hub(&self, hub: &Hub) -> Result<()>;

    /// Record a heartbeat without touching other fields
    fn touch_hub(&self, uuid: &str, at: DateTime<Utc>) -> Result<()>;

    fn list_hubs(&self, project_id: Uuid) -> Result<Vec<Hub>>;
}

/// Member repository operations
pub trait MemberRepository {
    /// Insert or update by (badge, project); returns the stored row
    fn upsert_member(&self, member: &Member) -> Result<Member>;

    fn find_member_by_badge(&self, project_id: Uuid, badge: &str) -> Result<Option<Member>>;

    fn list_members(&self, project_id: Uuid) -> Result<Vec<Member>>;

    fn list_members_updated_since(
        &self,
        project_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<Member>>;

    fn member_key_exists(&self, key: &str) -> Result<bool>;
}

/// Meeting repository operations
pub trait MeetingRepository {
    fn create_meeting(&self, meeting: &Meeting) -> Result<()>;

    fn find_meeting(&self, uuid: &str) -> Result<Option<Meeting>>;

    fn update_meeting(&self, meeting: &Meeting) -> Result<()>;

    fn list_meetings(&self, project_id: Uuid, active_only: bool) -> Result<Vec<Meeting>>;

    fn meeting_key_exists(&self, key: &str) -> Result<bool>;
}

/// Event log operations
pub trait EventRepository {
    /// Append unless (hub, meeting, log_index) exists; true when a row was written
    fn append_event(&self, event: &Event) -> Result<bool>;

    fn list_events(&self, meeting_uuid: &str) -> Result<Vec<Event>>;

    fn count_events(&self, meeting_uuid: &str) -> Result<u64>;
}

/// Current-state operations
pub trait HistoryRepository {
    fn find_history(&self, meeting_uuid: &str, hub_uuid: &str) -> Result<Option<CurrentState>>;

    fn save_history(&self, state: &CurrentState) -> Result<()>;

    fn list_meeting_histories(&self, meeting_uuid: &str) -> Result<Vec<CurrentState>>;

    fn list_hub_histories(&self, hub_uuid: &str) -> Result<Vec<CurrentState>>;
}

/// Combined storage interface
pub trait Storage:
    ProjectRepository
    + HubRepository
    + MemberRepository
    + MeetingRepository
    + EventRepository
    + HistoryRepository
{
}

impl<T> Storage for T where
    T: ProjectRepository
        + HubRepository
        + MemberRepository
        + MeetingRepository
        + EventRepository
        + HistoryRepository
{
}

/// Anything that can hand out a SQLite connection gets the SQLite repositories
pub trait StoreAccess {
    fn connection(&self) -> &Connection;
}

impl<T: StoreAccess> ProjectRepository for T {
    fn create_project(&self, project: &Project) -> Result<()> {
        ProjectStore::new(self.connection()).create(project)
    }

    fn find_project(&self, id: Uuid) -> Result<Option<Project>> {
        ProjectStore::new(self.connection()).find_by_id(id)
    }

    fn find_project_by_key(&self, key: &str) -> Result<Option<Project>> {
        ProjectStore::new(self.connection()).find_by_key(key)
    }

    fn find_project_by_name(&self, name: &str) -> Result<Option<Project>> {
        ProjectStore::new(self.connection()).find_by_name(name)
    }

    fn project_key_exists(&self, key: &str) -> Result<bool> {
        ProjectStore::new(self.connection()).key_exists(key)
    }

    fn project_stats(&self, id: Uuid) -> Result<ProjectStats> {
        ProjectStore::new(self.connection()).stats(id)
    }
}

impl<T: StoreAccess> HubRepository for T {
    fn create_hub(&self, hub: &Hub) -> Result<()> {
        HubStore::new(self.connection()).create(hub)
    }

    fn find_hub(&self, uuid: &str) -> Result<Option<Hub>> {
        HubStore::new(self.connection()).find(uuid)
    }

    fn update_hub(&self, hub: &Hub) -> Result<()> {
        HubStore::new(self.connection()).update(hub)
    }

    fn touch_hub(&self, uuid: &str, at: DateTime<Utc>) -> Result<()> {
        HubStore::new(self.connection()).touch(uuid, at)
    }

    fn list_hubs(&self, project_id: Uuid) -> Result<Vec<Hub>> {
        HubStore::new(self.connection()).list_for_project(project_id)
    }
}

impl<T: StoreAccess> MemberRepository for T {
    fn upsert_member(&self, member: &Member) -> Result<Member> {
        MemberStore::new(self.connection()).upsert(member)
    }

    fn find_member_by_badge(&self, project_id: Uuid, badge: &str) -> Result<Option<Member>> {
        MemberStore::new(self.connection()).find_by_badge(project_id, badge)
    }

    fn list_members(&self, project_id: Uuid) -> Result<Vec<Member>> {
        MemberStore::new(self.connection()).list_for_project(project_id)
    }

    fn list_members_updated_since(
        &self,
        project_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<Member>> {
        MemberStore::new(self.connection()).list_updated_since(project_id, since)
    }

    fn member_key_exists(&self, key: &str) -> Result<bool> {
        MemberStore::new(self.connection()).key_exists(key)
    }
}

impl<T: StoreAccess> MeetingRepository for T {
    fn create_meeting(&self, meeting: &Meeting) -> Result<()> {
        MeetingStore::new(self.connection()).create(meeting)
    }

    fn find_meeting(&self, uuid: &str) -> Result<Option<Meeting>> {
        MeetingStore::new(self.connection()).find(uuid)
    }

    fn update_meeting(&self, meeting: &Meeting) -> Result<()> {
        MeetingStore::new(self.connection()).update(meeting)
    }

    fn list_meetings(&self, project_id: Uuid, active_only: bool) -> Result<Vec<Meeting>> {
        MeetingStore::new(self.connection()).list_for_project(project_id, active_only)
    }

    fn meeting_key_exists(&self, key: &str) -> Result<bool> {
        MeetingStore::new(self.connection()).key_exists(key)
    }
}

impl<T: StoreAccess> EventRepository for T {
    fn append_event(&self, event: &Event) -> Result<bool> {
        EventStore::new(self.connection()).insert_if_absent(event)
    }

    fn list_events(&self, meeting_uuid: &str) -> Result<Vec<Event>> {
        EventStore::new(self.connection()).list_for_meeting(meeting_uuid)
    }

    fn count_events(&self, meeting_uuid: &str) -> Result<u64> {
        EventStore::new(self.connection()).count_for_meeting(meeting_uuid)
    }
}

impl<T: StoreAccess> HistoryRepository for T {
    fn find_history(&self, meeting_uuid: &str, hub_uuid: &str) -> Result<Option<CurrentState>> {
        HistoryStore::new(self.connection()).find(meeting_uuid, hub_uuid)
    }

    fn save_history(&self, state: &CurrentState) -> Result<()> {
        HistoryStore::new(self.connection()).save(state)
    }

    fn list_meeting_histories(&self, meeting_uuid: &str) -> Result<Vec<CurrentState>> {
        HistoryStore::new(self.connection()).list_for_meeting(meeting_uuid)
    }

    fn list_hub_histories(&self, hub_uuid: &str) -> Result<Vec<CurrentState>> {
        HistoryStore::new(self.connection()).list_for_hub(hub_uuid)
    }
}
