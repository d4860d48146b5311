//! Meeting storage operations

use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{parse_datetime, parse_uuid, OptionalExt};
use crate::error::Result;
use crate::models::Meeting;

const COLUMNS: &str = "uuid, key, project_id, log_version, start_time, end_time, is_active, \
                       last_update_timestamp, last_update_index, created_at";

fn map_meeting(row: &Row<'_>) -> rusqlite::Result<Meeting> {
    Ok(Meeting {
        uuid: row.get(0)?,
        key: row.get(1)?,
        project_id: parse_uuid(2, &row.get::<_, String>(2)?)?,
        log_version: row.get(3)?,
        start_time: row.get(4)?,
        end_time: row.get(5)?,
        is_active: row.get::<_, i32>(6)? != 0,
        last_update_timestamp: row.get(7)?,
        last_update_index: row.get(8)?,
        created_at: parse_datetime(9, &row.get::<_, String>(9)?)?,
    })
}

pub struct MeetingStore<'a> {
    conn: &'a Connection,
}

impl<'a> MeetingStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    #[instrument(skip(self, meeting), fields(meeting = %meeting.uuid))]
    pub fn create(&self, meeting: &Meeting) -> Result<()> {
        self.conn.execute(
            "INSERT INTO meetings (uuid, key, project_id, log_version, start_time, end_time, is_active,
                                   last_update_timestamp, last_update_index, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                meeting.uuid,
                meeting.key,
                meeting.project_id.to_string(),
                meeting.log_version,
                meeting.start_time,
                meeting.end_time,
                meeting.is_active as i32,
                meeting.last_update_timestamp,
                meeting.last_update_index,
                meeting.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn find(&self, uuid: &str) -> Result<Option<Meeting>> {
        let sql = format!("SELECT {} FROM meetings WHERE uuid = ?1", COLUMNS);
        let meeting = self
            .conn
            .query_row(&sql, params![uuid], map_meeting)
            .optional()?;
        Ok(meeting)
    }

    /// Persist lifecycle and last-update fields
    #[instrument(skip(self, meeting), fields(meeting = %meeting.uuid, active = meeting.is_active))]
    pub fn update(&self, meeting: &Meeting) -> Result<()> {
        self.conn.execute(
            "UPDATE meetings SET start_time = ?1, end_time = ?2, is_active = ?3,
                                 last_update_timestamp = ?4, last_update_index = ?5
             WHERE uuid = ?6",
            params![
                meeting.start_time,
                meeting.end_time,
                meeting.is_active as i32,
                meeting.last_update_timestamp,
                meeting.last_update_index,
                meeting.uuid,
            ],
        )?;
        Ok(())
    }

    /// Meetings of a project, optionally only the active ones, oldest first
    #[instrument(skip(self))]
    pub fn list_for_project(&self, project_id: Uuid, active_only: bool) -> Result<Vec<Meeting>> {
        let sql = format!(
            "SELECT {} FROM meetings WHERE project_id = ?1 AND (?2 = 0 OR is_active = 1)
             ORDER BY start_time, uuid",
            COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let meetings = stmt
            .query_map(params![project_id.to_string(), active_only as i32], map_meeting)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(meetings)
    }

    pub fn key_exists(&self, key: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM meetings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
