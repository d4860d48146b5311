//! Current-state (history) storage, one row per (meeting, hub)

use std::collections::BTreeMap;

use chrono::Utc;
use rusqlite::{params, Connection, Row};
use tracing::instrument;

use super::parse::{parse_json, OptionalExt};
use crate::error::Result;
use crate::models::{CurrentState, MemberPresence};

const COLUMNS: &str = "meeting_uuid, hub_uuid, is_active, last_activity_update, last_log_index, members";

fn map_state(row: &Row<'_>) -> rusqlite::Result<CurrentState> {
    let members: BTreeMap<String, MemberPresence> = parse_json(5, &row.get::<_, String>(5)?)?;
    Ok(CurrentState {
        meeting_uuid: row.get(0)?,
        hub_uuid: row.get(1)?,
        is_active: row.get(2)?,
        last_activity_update: row.get(3)?,
        last_log_index: row.get(4)?,
        members,
    })
}

pub struct HistoryStore<'a> {
    conn: &'a Connection,
}

impl<'a> HistoryStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    #[instrument(skip(self))]
    pub fn find(&self, meeting_uuid: &str, hub_uuid: &str) -> Result<Option<CurrentState>> {
        let sql = format!(
            "SELECT {} FROM histories WHERE meeting_uuid = ?1 AND hub_uuid = ?2",
            COLUMNS
        );
        let state = self
            .conn
            .query_row(&sql, params![meeting_uuid, hub_uuid], map_state)
            .optional()?;
        Ok(state)
    }

    /// Insert or overwrite the row for the state's (meeting, hub)
    #[instrument(skip(self, state), fields(meeting = %state.meeting_uuid, hub = %state.hub_uuid, last_log_index = state.last_log_index))]
    pub fn save(&self, state: &CurrentState) -> Result<()> {
        self.conn.execute(
            "INSERT INTO histories (meeting_uuid, hub_uuid, is_active, last_activity_update, last_log_index, members, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(meeting_uuid, hub_uuid) DO UPDATE SET
                is_active = excluded.is_active,
                last_activity_update = excluded.last_activity_update,
                last_log_index = excluded.last_log_index,
                members = excluded.members,
                updated_at = excluded.updated_at",
            params![
                state.meeting_uuid,
                state.hub_uuid,
                state.is_active,
                state.last_activity_update,
                state.last_log_index,
                serde_json::to_string(&state.members)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn list_for_meeting(&self, meeting_uuid: &str) -> Result<Vec<CurrentState>> {
        let sql = format!(
            "SELECT {} FROM histories WHERE meeting_uuid = ?1 ORDER BY hub_uuid",
            COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let states = stmt
            .query_map(params![meeting_uuid], map_state)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(states)
    }

    #[instrument(skip(self))]
    pub fn list_for_hub(&self, hub_uuid: &str) -> Result<Vec<CurrentState>> {
        let sql = format!(
            "SELECT {} FROM histories WHERE hub_uuid = ?1 ORDER BY meeting_uuid",
            COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let states = stmt
            .query_map(params![hub_uuid], map_state)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(states)
    }
}
