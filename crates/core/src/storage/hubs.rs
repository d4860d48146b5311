//! Hub storage operations

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{parse_datetime, parse_datetime_opt, parse_uuid, OptionalExt};
use crate::error::Result;
use crate::models::Hub;

const COLUMNS: &str =
    "uuid, name, project_id, is_super_user, current_meeting, created_at, last_seen_at";

fn map_hub(row: &Row<'_>) -> rusqlite::Result<Hub> {
    Ok(Hub {
        uuid: row.get(0)?,
        name: row.get(1)?,
        project_id: parse_uuid(2, &row.get::<_, String>(2)?)?,
        is_super_user: row.get(3)?,
        current_meeting: row.get(4)?,
        created_at: parse_datetime(5, &row.get::<_, String>(5)?)?,
        last_seen_at: parse_datetime_opt(6, row.get(6)?)?,
    })
}

pub struct HubStore<'a> {
    conn: &'a Connection,
}

impl<'a> HubStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    #[instrument(skip(self, hub), fields(hub = %hub.uuid))]
    pub fn create(&self, hub: &Hub) -> Result<()> {
        self.conn.execute(
            "INSERT INTO hubs (uuid, name, project_id, is_super_user, current_meeting, created_at, last_seen_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                hub.uuid,
                hub.name,
                hub.project_id.to_string(),
                hub.is_super_user,
                hub.current_meeting,
                hub.created_at.to_rfc3339(),
                hub.last_seen_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn find(&self, uuid: &str) -> Result<Option<Hub>> {
        let sql = format!("SELECT {} FROM hubs WHERE uuid = ?1", COLUMNS);
        let hub = self.conn.query_row(&sql, params![uuid], map_hub).optional()?;
        Ok(hub)
    }

    /// Persist every mutable hub field
    #[instrument(skip(self, hub), fields(hub = %hub.uuid))]
    pub fn update(&self, hub: &Hub) -> Result<()> {
        self.conn.execute(
            "UPDATE hubs SET name = ?1, project_id = ?2, is_super_user = ?3, current_meeting = ?4, last_seen_at = ?5
             WHERE uuid = ?6",
            params![
                hub.name,
                hub.project_id.to_string(),
                hub.is_super_user,
                hub.current_meeting,
                hub.last_seen_at.map(|t| t.to_rfc3339()),
                hub.uuid,
            ],
        )?;
        Ok(())
    }

    /// Record a heartbeat
    pub fn touch(&self, uuid: &str, at: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "UPDATE hubs SET last_seen_at = ?1 WHERE uuid = ?2",
            params![at.to_rfc3339(), uuid],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn list_for_project(&self, project_id: Uuid) -> Result<Vec<Hub>> {
        let sql = format!(
            "SELECT {} FROM hubs WHERE project_id = ?1 ORDER BY name, uuid",
            COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let hubs = stmt
            .query_map(params![project_id.to_string()], map_hub)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(hubs)
    }
}
