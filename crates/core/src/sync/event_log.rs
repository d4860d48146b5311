//! Append-only event log over the store

use tracing::debug;

use crate::error::Result;
use crate::models::Event;
use crate::storage::EventRepository;

/// What happened to an appended event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// New row; its effects must be projected
    Inserted,
    /// Same (hub, meeting, log_index) already logged; nothing to do
    AlreadyPresent,
}

pub struct EventLog<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: EventRepository + ?Sized> EventLog<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub fn append(&self, event: &Event) -> Result<AppendOutcome> {
        if self.store.append_event(event)? {
            Ok(AppendOutcome::Inserted)
        } else {
            debug!(
                hub = %event.hub_uuid,
                meeting = %event.meeting_uuid,
                log_index = event.log_index,
                "Duplicate event ignored"
            );
            Ok(AppendOutcome::AlreadyPresent)
        }
    }

    /// Whole meeting, display order
    pub fn meeting_log(&self, meeting_uuid: &str) -> Result<Vec<Event>> {
        self.store.list_events(meeting_uuid)
    }

    pub fn count(&self, meeting_uuid: &str) -> Result<u64> {
        self.store.count_events(meeting_uuid)
    }
}
