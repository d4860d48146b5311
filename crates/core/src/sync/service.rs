//! Thread-safe entry point to the sync engine
//!
//! Every call opens its own connection and runs in one transaction. Batch
//! submissions additionally hold the (hub, meeting) pair lock for the whole
//! validate -> append -> project -> persist sequence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::TransactionBehavior;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::keys::generate_unique_key;
use crate::models::{EventInput, Hub, Member, MemberRef, Project, ProjectStats};
use crate::storage::{
    Database, DatabaseTx, HubRepository, MeetingRepository, MemberRepository, ProjectRepository,
    Storage,
};

use super::ingest::{create_meeting_record, ingest_batch, BatchReceipt, HubContext};
use super::locks::PairLocks;
use super::snapshot::{
    build_hub_view, build_meeting_view, build_project_view, since_from_seconds, HubView, MeetingView,
    ProjectView,
};
use super::validator::parse_batch;

pub struct SyncService {
    path: PathBuf,
    busy_timeout: Duration,
    settings: SyncConfig,
    locks: PairLocks,
}

impl SyncService {
    /// Open (creating and migrating if needed) the database at `path`
    #[instrument(skip(path, settings), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P, busy_timeout: Duration, settings: SyncConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let version = Database::open(&path)?.schema_version()?;
        info!(version, "Sync store ready");
        Ok(Self {
            path,
            busy_timeout,
            settings,
            locks: PairLocks::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fresh connection to the store
    pub fn connect(&self) -> Result<Database> {
        Database::connect(&self.path, self.busy_timeout)
    }

    fn run<T, F>(&self, behavior: TransactionBehavior, f: F) -> Result<T>
    where
        F: FnOnce(&DatabaseTx<'_>) -> Result<T>,
    {
        let mut db = self.connect()?;
        let tx = db.transaction(behavior)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&DatabaseTx<'_>) -> Result<T>,
    {
        self.run(TransactionBehavior::Immediate, f)
    }

    fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&DatabaseTx<'_>) -> Result<T>,
    {
        self.run(TransactionBehavior::Deferred, f)
    }

    fn new_key<F>(&self, exists: F) -> Result<String>
    where
        F: FnMut(&str) -> Result<bool>,
    {
        generate_unique_key(self.settings.key_length, self.settings.key_attempts, exists)
    }

    /// Submit a batch of events from `hub_uuid` for `meeting_uuid`
    #[instrument(skip(self, events), fields(hub = %hub_uuid, meeting = %meeting_uuid, count = events.len()))]
    pub fn submit_batch(
        &self,
        hub_uuid: &str,
        meeting_uuid: &str,
        events: &[EventInput],
    ) -> Result<BatchReceipt> {
        let events = parse_batch(hub_uuid, meeting_uuid, events)?;
        let _pair = self.locks.lock(hub_uuid, meeting_uuid);
        self.write(|tx| {
            let mut ctx = HubContext::resolve(tx, hub_uuid)?;
            ingest_batch(tx, &mut ctx, meeting_uuid, &events, &self.settings)
        })
    }

    /// Create a meeting explicitly; repeating the call for the same uuid is a no-op
    #[instrument(skip(self), fields(hub = %hub_uuid, meeting = %meeting_uuid))]
    pub fn create_meeting(
        &self,
        hub_uuid: &str,
        project_id: Uuid,
        log_version: f64,
        meeting_uuid: &str,
    ) -> Result<String> {
        if meeting_uuid.trim().is_empty() {
            return Err(Error::InvalidOperation("meeting uuid is empty".into()));
        }
        if !log_version.is_finite() {
            return Err(Error::InvalidOperation(format!("invalid log version {}", log_version)));
        }

        self.write(|tx| {
            let ctx = HubContext::resolve(tx, hub_uuid)?;
            ctx.ensure_access(project_id)?;
            if tx.find_project(project_id)?.is_none() {
                return Err(Error::not_found("project", project_id));
            }
            if let Some(existing) = tx.find_meeting(meeting_uuid)? {
                if existing.project_id != project_id {
                    return Err(Error::InvalidOperation(format!(
                        "meeting '{}' belongs to another project",
                        meeting_uuid
                    )));
                }
                return Ok(existing.uuid);
            }
            let meeting = create_meeting_record(tx, project_id, meeting_uuid, log_version, &self.settings)?;
            info!(key = %meeting.key, "Meeting created");
            Ok(meeting.uuid)
        })
    }

    /// The hub's project with members and active meetings
    #[instrument(skip(self), fields(hub = %hub_uuid))]
    pub fn project_snapshot(&self, hub_uuid: &str) -> Result<ProjectView> {
        self.read(|tx| {
            let ctx = HubContext::resolve(tx, hub_uuid)?;
            build_project_view(tx, &ctx.project)
        })
    }

    /// The hub's own state; members limited to those updated after `since` (epoch seconds)
    #[instrument(skip(self), fields(hub = %hub_uuid))]
    pub fn hub_snapshot(&self, hub_uuid: &str, since: f64) -> Result<HubView> {
        self.read(|tx| {
            let ctx = HubContext::resolve(tx, hub_uuid)?;
            build_hub_view(tx, &ctx.hub, since_from_seconds(since))
        })
    }

    #[instrument(skip(self), fields(hub = %hub_uuid, meeting = %meeting_uuid))]
    pub fn meeting_snapshot(
        &self,
        hub_uuid: &str,
        meeting_uuid: &str,
        include_events: bool,
    ) -> Result<MeetingView> {
        self.read(|tx| {
            let ctx = HubContext::resolve(tx, hub_uuid)?;
            let meeting = tx
                .find_meeting(meeting_uuid)?
                .ok_or_else(|| Error::not_found("meeting", meeting_uuid))?;
            ctx.ensure_access(meeting.project_id)?;
            build_meeting_view(tx, &meeting, include_events)
        })
    }

    /// Upsert a member by (badge, project); the key survives re-registration
    #[instrument(skip(self, name, email), fields(project = %project_id, badge = %badge))]
    pub fn register_member(
        &self,
        project_id: Uuid,
        badge: &str,
        name: &str,
        email: Option<String>,
    ) -> Result<MemberRef> {
        let badge = badge.trim();
        if badge.is_empty() {
            return Err(Error::InvalidOperation("badge is empty".into()));
        }
        if name.trim().is_empty() {
            return Err(Error::InvalidOperation("member name is empty".into()));
        }

        self.write(|tx| {
            if tx.find_project(project_id)?.is_none() {
                return Err(Error::not_found("project", project_id));
            }
            let key = match tx.find_member_by_badge(project_id, badge)? {
                Some(existing) => existing.key,
                None => self.new_key(|k| tx.member_key_exists(k))?,
            };
            let mut member = Member::new(project_id, badge.to_string(), name.trim().to_string(), key);
            if let Some(email) = email.filter(|e| !e.trim().is_empty()) {
                member = member.with_email(email);
            }
            let stored = tx.upsert_member(&member)?;
            info!(key = %stored.key, "Member registered");
            Ok(stored.to_ref())
        })
    }

    #[instrument(skip(self))]
    pub fn create_project(&self, name: &str) -> Result<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidOperation("project name is empty".into()));
        }
        self.write(|tx| self.insert_project(tx, name))
    }

    fn insert_project(&self, store: &impl Storage, name: &str) -> Result<Project> {
        let key = self.new_key(|k| store.project_key_exists(k))?;
        let project = Project::new(name.to_string(), key);
        store.create_project(&project)?;
        info!(project = %project.id, key = %project.key, "Project created");
        Ok(project)
    }

    /// Return the hub, creating it in the default project on first contact
    #[instrument(skip(self), fields(hub = %hub_uuid))]
    pub fn register_hub(&self, hub_uuid: &str) -> Result<Hub> {
        if hub_uuid.trim().is_empty() {
            return Err(Error::InvalidOperation("hub uuid is empty".into()));
        }
        self.write(|tx| {
            if let Some(hub) = tx.find_hub(hub_uuid)? {
                return Ok(hub);
            }
            let project = match tx.find_project_by_name(&self.settings.default_project)? {
                Some(project) => project,
                None => self.insert_project(tx, &self.settings.default_project)?,
            };
            let hub = Hub::new(
                hub_uuid.to_string(),
                self.settings.default_hub_name.clone(),
                project.id,
            );
            tx.create_hub(&hub)?;
            info!(project = %project.key, "Hub registered");
            Ok(hub)
        })
    }

    #[instrument(skip(self), fields(hub = %hub_uuid))]
    pub fn rename_hub(&self, hub_uuid: &str, name: &str) -> Result<Hub> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidOperation("hub name is empty".into()));
        }
        self.write(|tx| {
            let mut hub = tx
                .find_hub(hub_uuid)?
                .ok_or_else(|| Error::not_found("hub", hub_uuid))?;
            hub.name = name.to_string();
            tx.update_hub(&hub)?;
            Ok(hub)
        })
    }

    pub fn project_stats(&self, project_id: Uuid) -> Result<ProjectStats> {
        self.read(|tx| {
            if tx.find_project(project_id)?.is_none() {
                return Err(Error::not_found("project", project_id));
            }
            tx.project_stats(project_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MeetingPhase;
    use crate::storage::{EventRepository, HistoryRepository};
    use crate::sync::BatchStatus;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;
    use tempfile::{tempdir, TempDir};

    const MEETING: &str = "LAB|100000";

    struct Harness {
        _dir: TempDir,
        service: SyncService,
        project: Project,
    }

    fn harness() -> Harness {
        let dir = tempdir().unwrap();
        let service = SyncService::open(
            dir.path().join("sync.db"),
            Duration::from_secs(5),
            SyncConfig::default(),
        )
        .unwrap();
        let hub = service.register_hub("H").unwrap();
        let project = service.connect().unwrap().find_project(hub.project_id).unwrap().unwrap();
        Harness {
            _dir: dir,
            service,
            project,
        }
    }

    fn joined(i: i64, ts: f64) -> EventInput {
        EventInput::new("hub joined", i, ts)
    }

    fn member(kind: &str, i: i64, ts: f64, badge: &str) -> EventInput {
        EventInput::new(kind, i, ts).with_data(json!({ "badge": badge }))
    }

    fn history(h: &Harness, hub: &str) -> crate::models::CurrentState {
        h.service
            .connect()
            .unwrap()
            .find_history(MEETING, hub)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_end_to_end_scenario() {
        let h = harness();
        let s = &h.service;

        let r = s.submit_batch("H", MEETING, &[joined(0, 100.0)]).unwrap();
        assert_eq!(r, BatchReceipt::success(0));
        let view = s.meeting_snapshot("H", MEETING, false).unwrap();
        assert!(view.hubs["H"].is_active);
        assert_eq!(view.start_time, Some(100.0));
        assert!(view.is_active);

        s.submit_batch("H", MEETING, &[member("member joined", 1, 105.0, "badge123")])
            .unwrap();
        assert!(history(&h, "H").members["badge123"].is_active);

        s.submit_batch("H", MEETING, &[EventInput::new("hub left", 2, 200.0)])
            .unwrap();
        let hub_view = s.hub_snapshot("H", 0.0).unwrap();
        assert!(hub_view.current_meeting.is_none());
        assert!(!history(&h, "H").is_active);

        s.submit_batch("H", MEETING, &[EventInput::new("meeting ended", 3, 205.0)])
            .unwrap();
        let view = s.meeting_snapshot("H", MEETING, true).unwrap();
        assert!(!view.is_active);
        assert_eq!(view.end_time, Some(205.0));
        assert_eq!(view.phase, MeetingPhase::Ended);

        let before = history(&h, "H");
        let r = s
            .submit_batch("H", MEETING, &[member("member joined", 1, 105.0, "badge123")])
            .unwrap();
        assert_eq!(r, BatchReceipt::success(3));
        assert_eq!(history(&h, "H"), before);
        assert_eq!(view.event_count, 4);
        assert_eq!(view.events.map(|e| e.len()), Some(4));
    }

    #[test]
    fn test_same_batch_twice_is_idempotent() {
        let h = harness();
        let batch = vec![
            joined(0, 100.0),
            member("member joined", 1, 101.0, "B1"),
            EventInput::new("audio", 2, 102.0).with_data(json!({"rms": 0.4})),
        ];
        let first = h.service.submit_batch("H", MEETING, &batch).unwrap();
        let state = history(&h, "H");
        let second = h.service.submit_batch("H", MEETING, &batch).unwrap();

        assert_eq!(first, second);
        assert_eq!(history(&h, "H"), state);
        assert_eq!(h.service.connect().unwrap().count_events(MEETING).unwrap(), 3);
    }

    #[test]
    fn test_gap_is_rejected_and_state_kept() {
        let h = harness();
        let batch: Vec<_> = std::iter::once(joined(0, 100.0))
            .chain((1..=5).map(|i| EventInput::new("audio", i, 100.0 + i as f64)))
            .collect();
        h.service.submit_batch("H", MEETING, &batch).unwrap();

        let r = h
            .service
            .submit_batch("H", MEETING, &[EventInput::new("audio", 7, 107.0)])
            .unwrap();
        assert_eq!(r.status, BatchStatus::MissingEvents);
        assert_eq!(r.last_update_index, 5);
        assert_eq!(history(&h, "H").last_log_index, 5);
        assert_eq!(h.service.connect().unwrap().count_events(MEETING).unwrap(), 6);

        // Overlapping retransmission is fine
        let overlap = vec![EventInput::new("audio", 5, 105.0), EventInput::new("audio", 6, 106.0)];
        assert_eq!(
            h.service.submit_batch("H", MEETING, &overlap).unwrap(),
            BatchReceipt::success(6)
        );
    }

    #[test]
    fn test_empty_batch_is_heartbeat() {
        let h = harness();
        h.service.submit_batch("H", MEETING, &[joined(0, 1.0)]).unwrap();
        let r = h.service.submit_batch("H", MEETING, &[]).unwrap();
        assert_eq!(r, BatchReceipt::success(0));

        let r = h.service.submit_batch("H", "LAB|unknown", &[]).unwrap();
        assert_eq!(r, BatchReceipt::success(-1));
        let hub = h.service.connect().unwrap().find_hub("H").unwrap().unwrap();
        assert!(hub.last_seen_at.is_some());
    }

    #[test]
    fn test_malformed_batch_writes_nothing() {
        let h = harness();
        let batch = vec![joined(0, 100.0), EventInput::new("member joined", 1, 101.0)];
        let err = h.service.submit_batch("H", MEETING, &batch).unwrap_err();
        assert!(matches!(err, Error::MalformedEvent { position: 1, .. }));

        let db = h.service.connect().unwrap();
        assert_eq!(db.count_events(MEETING).unwrap(), 0);
        assert!(db.find_meeting(MEETING).unwrap().is_none());
        assert!(db.find_hub("H").unwrap().unwrap().last_seen_at.is_none());
    }

    #[test]
    fn test_unknown_hub_is_not_found() {
        let h = harness();
        let err = h.service.submit_batch("ghost", MEETING, &[joined(0, 1.0)]).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(matches!(h.service.hub_snapshot("ghost", 0.0), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_late_join_does_not_reopen_meeting() {
        let h = harness();
        h.service.register_hub("H2").unwrap();
        h.service
            .submit_batch("H", MEETING, &[joined(0, 100.0), EventInput::new("meeting ended", 1, 150.0)])
            .unwrap();

        let r = h.service.submit_batch("H2", MEETING, &[joined(0, 160.0)]).unwrap();
        assert!(r.is_success());

        let view = h.service.meeting_snapshot("H2", MEETING, false).unwrap();
        assert_eq!(view.phase, MeetingPhase::Ended);
        assert!(!view.is_active);
        assert_eq!(view.end_time, Some(150.0));
        assert!(!view.hubs["H2"].is_active);
        assert!(h.service.hub_snapshot("H2", 0.0).unwrap().current_meeting.is_none());
        assert!(h.service.project_snapshot("H").unwrap().meetings.is_empty());
    }

    #[test]
    fn test_concurrent_duplicate_submissions() {
        let h = harness();
        let service = Arc::new(h.service);
        let batch: Vec<_> = std::iter::once(joined(0, 100.0))
            .chain((1..20).map(|i| member("member joined", i, 100.0 + i as f64, &format!("B{}", i))))
            .collect();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                let batch = batch.clone();
                thread::spawn(move || service.submit_batch("H", MEETING, &batch).unwrap())
            })
            .collect();
        let receipts: Vec<_> = handles.into_iter().map(|t| t.join().unwrap()).collect();

        assert!(receipts.iter().all(|r| *r == BatchReceipt::success(19)));
        let db = service.connect().unwrap();
        assert_eq!(db.count_events(MEETING).unwrap(), 20);
        let state = db.find_history(MEETING, "H").unwrap().unwrap();
        assert_eq!(state.members.len(), 19);
        assert_eq!(state.last_log_index, 19);
    }

    #[test]
    fn test_distinct_pairs_in_parallel() {
        let h = harness();
        let service = Arc::new(h.service);
        for hub in ["A", "B", "C", "D"] {
            service.register_hub(hub).unwrap();
        }

        let handles: Vec<_> = ["A", "B", "C", "D"]
            .into_iter()
            .map(|hub| {
                let service = service.clone();
                thread::spawn(move || {
                    for i in 0..10 {
                        let event = if i == 0 {
                            joined(0, 1.0)
                        } else {
                            EventInput::new("audio", i, 1.0 + i as f64)
                        };
                        service.submit_batch(hub, MEETING, &[event]).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let db = service.connect().unwrap();
        assert_eq!(db.count_events(MEETING).unwrap(), 40);
        assert_eq!(db.list_meeting_histories(MEETING).unwrap().len(), 4);
    }

    #[test]
    fn test_register_hub_is_idempotent_and_renamable() {
        let h = harness();
        let again = h.service.register_hub("H").unwrap();
        assert_eq!(again.project_id, h.project.id);
        assert_eq!(again.name, "New Hub");
        assert_eq!(h.project.name, "OB-DEFAULT");

        let renamed = h.service.rename_hub("H", "Lobby").unwrap();
        assert_eq!(renamed.name, "Lobby");
        assert_eq!(h.service.hub_snapshot("H", 0.0).unwrap().name, "Lobby");
        assert!(matches!(h.service.rename_hub("H", " "), Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn test_member_registration_and_delta_sync() {
        let h = harness();
        let first = h.service.register_member(h.project.id, "B1", "Ada", None).unwrap();
        let watermark = chrono::Utc::now().timestamp_micros() as f64 / 1e6;
        thread::sleep(Duration::from_millis(20));
        let again = h
            .service
            .register_member(h.project.id, "B1", "Ada L.", Some("ada@example.org".into()))
            .unwrap();
        h.service.register_member(h.project.id, "B2", "Bo", None).unwrap();

        assert_eq!(first.key, again.key);
        assert_eq!(again.name, "Ada L.");

        let project = h.service.project_snapshot("H").unwrap();
        assert_eq!(project.badge_map.len(), 2);
        assert_eq!(project.members["Ada L."].badge, "B1");

        let delta = h.service.hub_snapshot("H", watermark).unwrap();
        assert_eq!(delta.badge_map.len(), 2);
        let later = h.service.hub_snapshot("H", watermark + 3600.0).unwrap();
        assert!(later.badge_map.is_empty());

        assert!(matches!(
            h.service.register_member(Uuid::new_v4(), "B3", "X", None),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_create_meeting_checks_project() {
        let h = harness();
        let uuid = h.service.create_meeting("H", h.project.id, 2.0, MEETING).unwrap();
        assert_eq!(uuid, MEETING);
        assert_eq!(h.service.create_meeting("H", h.project.id, 2.0, MEETING).unwrap(), MEETING);

        let other = h.service.create_project("Other").unwrap();
        assert_eq!(other.key.len(), 10);
        assert!(matches!(
            h.service.create_meeting("H", other.id, 1.0, "X|1"),
            Err(Error::InvalidOperation(_))
        ));

        let view = h.service.meeting_snapshot("H", MEETING, false).unwrap();
        assert_eq!(view.log_version, 2.0);
        assert_eq!(view.phase, MeetingPhase::Unstarted);
    }

    #[test]
    fn test_project_stats_sum_ended_meetings() {
        let h = harness();
        h.service.register_member(h.project.id, "B1", "Ada", None).unwrap();
        h.service
            .submit_batch(
                "H",
                MEETING,
                &[
                    joined(0, 100.0),
                    EventInput::new("audio", 1, 130.0),
                    EventInput::new("meeting ended", 2, 160.0),
                ],
            )
            .unwrap();
        h.service
            .submit_batch("H", "LAB|200000", &[joined(0, 500.0)])
            .unwrap();

        let stats = h.service.project_stats(h.project.id).unwrap();
        assert_eq!(stats.member_count, 1);
        assert_eq!(stats.meeting_count, 2);
        assert!((stats.total_meeting_seconds - 60.0).abs() < 1e-9);
    }
}
