//! Event log storage: append-only, deduplicated by (hub, meeting, log_index)

use rusqlite::{params, Connection, Row};
use tracing::instrument;

use super::parse::{parse_datetime, parse_json};
use crate::error::Result;
use crate::models::{Event, EventKind};

const COLUMNS: &str = "hub_uuid, meeting_uuid, type, log_index, log_timestamp, data, recorded_at";

fn map_event(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        hub_uuid: row.get(0)?,
        meeting_uuid: row.get(1)?,
        kind: EventKind::from(row.get::<_, String>(2)?),
        log_index: row.get(3)?,
        log_timestamp: row.get(4)?,
        data: parse_json(5, &row.get::<_, String>(5)?)?,
        recorded_at: parse_datetime(6, &row.get::<_, String>(6)?)?,
    })
}

pub struct EventStore<'a> {
    conn: &'a Connection,
}

impl<'a> EventStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert unless the natural key is already present. Returns whether a row was written.
    #[instrument(skip(self, event), fields(hub = %event.hub_uuid, meeting = %event.meeting_uuid, log_index = event.log_index))]
    pub fn insert_if_absent(&self, event: &Event) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT INTO events (hub_uuid, meeting_uuid, type, log_index, log_timestamp, data, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(hub_uuid, meeting_uuid, log_index) DO NOTHING",
            params![
                event.hub_uuid,
                event.meeting_uuid,
                event.kind.as_str(),
                event.log_index,
                event.log_timestamp,
                serde_json::to_string(&event.data)?,
                event.recorded_at.to_rfc3339(),
            ],
        )?;
        Ok(inserted == 1)
    }

    /// Full meeting log in display order
    #[instrument(skip(self))]
    pub fn list_for_meeting(&self, meeting_uuid: &str) -> Result<Vec<Event>> {
        let sql = format!(
            "SELECT {} FROM events WHERE meeting_uuid = ?1
             ORDER BY log_timestamp, hub_uuid, log_index",
            COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let events = stmt
            .query_map(params![meeting_uuid], map_event)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }

    pub fn count_for_meeting(&self, meeting_uuid: &str) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM events WHERE meeting_uuid = ?1",
            params![meeting_uuid],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
