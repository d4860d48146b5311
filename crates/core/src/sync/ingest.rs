//! Batch ingestion pipeline
//!
//! validate -> append -> project -> persist, run against whatever store handle
//! the caller passes. The caller owns the transaction and the pair lock.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::keys::generate_unique_key;
use crate::models::{CurrentState, Event, Hub, Meeting, Project};
use crate::storage::Storage;

use super::event_log::{AppendOutcome, EventLog};
use super::projector::Projector;
use super::validator::{check_contiguity, BatchOutcome};

/// Log format assumed when a meeting is opened by its event stream
pub const DEFAULT_LOG_VERSION: f64 = 1.0;

/// The authenticated hub a request runs on behalf of
#[derive(Debug, Clone, PartialEq)]
pub struct HubContext {
    pub hub: Hub,
    pub project: Project,
}

impl HubContext {
    pub fn resolve<S: Storage + ?Sized>(store: &S, hub_uuid: &str) -> Result<Self> {
        let hub = store
            .find_hub(hub_uuid)?
            .ok_or_else(|| Error::not_found("hub", hub_uuid))?;
        let project = store
            .find_project(hub.project_id)?
            .ok_or_else(|| Error::not_found("project", hub.project_id))?;
        Ok(Self { hub, project })
    }

    /// Hubs see their own project; super-user hubs see all of them
    pub fn can_access(&self, project_id: Uuid) -> bool {
        self.hub.is_super_user || self.project.id == project_id
    }

    pub fn ensure_access(&self, project_id: Uuid) -> Result<()> {
        if self.can_access(project_id) {
            Ok(())
        } else {
            Err(Error::InvalidOperation(format!(
                "hub '{}' cannot access project {}",
                self.hub.uuid, project_id
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    #[serde(rename = "success")]
    Success,
    #[serde(rename = "missing events")]
    MissingEvents,
}

/// Reply to a batch submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReceipt {
    pub status: BatchStatus,
    /// Highest index the server holds for the pair; resend from the next one
    pub last_update_index: i64,
}

impl BatchReceipt {
    pub fn success(last_update_index: i64) -> Self {
        Self {
            status: BatchStatus::Success,
            last_update_index,
        }
    }

    pub fn missing_events(last_update_index: i64) -> Self {
        Self {
            status: BatchStatus::MissingEvents,
            last_update_index,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == BatchStatus::Success
    }
}

/// Insert a meeting row with a fresh key
pub fn create_meeting_record<S: Storage + ?Sized>(
    store: &S,
    project_id: Uuid,
    meeting_uuid: &str,
    log_version: f64,
    settings: &SyncConfig,
) -> Result<Meeting> {
    let key = generate_unique_key(settings.key_length, settings.key_attempts, |k| {
        store.meeting_key_exists(k)
    })?;
    let meeting = Meeting::new(meeting_uuid.to_string(), key, project_id, log_version);
    store.create_meeting(&meeting)?;
    Ok(meeting)
}

/// Apply one already well-formed batch for `ctx.hub` in `meeting_uuid`.
///
/// Gap rejection is an ordinary receipt. Errors leave the caller's
/// transaction to be rolled back.
#[instrument(
    skip(store, ctx, events, settings),
    fields(hub = %ctx.hub.uuid, meeting = %meeting_uuid, count = events.len())
)]
pub fn ingest_batch<S: Storage + ?Sized>(
    store: &S,
    ctx: &mut HubContext,
    meeting_uuid: &str,
    events: &[Event],
    settings: &SyncConfig,
) -> Result<BatchReceipt> {
    let now = Utc::now();
    store.touch_hub(&ctx.hub.uuid, now)?;
    ctx.hub.last_seen_at = Some(now);

    let existing = store.find_meeting(meeting_uuid)?;
    if let Some(meeting) = &existing {
        ctx.ensure_access(meeting.project_id)?;
    }

    let mut state = store
        .find_history(meeting_uuid, &ctx.hub.uuid)?
        .unwrap_or_else(|| CurrentState::new(meeting_uuid.to_string(), ctx.hub.uuid.clone()));

    if let BatchOutcome::MissingEvents { resend_from } = check_contiguity(state.last_log_index, events) {
        info!(
            resend_from,
            first = ?events.first().map(|e| e.log_index),
            "Batch rejected: missing events"
        );
        return Ok(BatchReceipt::missing_events(state.last_log_index));
    }
    if events.is_empty() {
        debug!("Heartbeat");
        return Ok(BatchReceipt::success(state.last_log_index));
    }

    let mut meeting = match existing {
        Some(meeting) => meeting,
        None => {
            let opener = events
                .iter()
                .find(|e| e.kind.opens_meeting())
                .ok_or_else(|| Error::not_found("meeting", meeting_uuid))?;
            let log_version = opener
                .data
                .get("log_version")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(DEFAULT_LOG_VERSION);
            let meeting =
                create_meeting_record(store, ctx.hub.project_id, meeting_uuid, log_version, settings)?;
            info!(key = %meeting.key, "Meeting opened by event stream");
            meeting
        }
    };

    let log = EventLog::new(store);
    let mut inserted = 0usize;
    {
        let mut projector = Projector::new(&mut meeting, &mut ctx.hub, &mut state);
        for event in events {
            match log.append(event)? {
                AppendOutcome::Inserted => {
                    inserted += 1;
                    let effect = projector.apply(event);
                    debug!(log_index = event.log_index, kind = %event.kind, ?effect, "Event projected");
                }
                AppendOutcome::AlreadyPresent => {}
            }
        }
    }

    if inserted > 0 {
        store.update_meeting(&meeting)?;
        store.update_hub(&ctx.hub)?;
        store.save_history(&state)?;
    }

    info!(
        inserted,
        duplicates = events.len() - inserted,
        last_log_index = state.last_log_index,
        "Batch applied"
    );
    Ok(BatchReceipt::success(state.last_log_index))
}
