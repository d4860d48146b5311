//! Project storage operations

use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{parse_datetime, parse_uuid, OptionalExt};
use crate::error::Result;
use crate::models::{Project, ProjectStats};

const COLUMNS: &str = "id, key, name, created_at";

fn map_project(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: parse_uuid(0, &row.get::<_, String>(0)?)?,
        key: row.get(1)?,
        name: row.get(2)?,
        created_at: parse_datetime(3, &row.get::<_, String>(3)?)?,
    })
}

pub struct ProjectStore<'a> {
    conn: &'a Connection,
}

impl<'a> ProjectStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Create a new project
    #[instrument(skip(self, project), fields(project = %project.name, key = %project.key))]
    pub fn create(&self, project: &Project) -> Result<()> {
        self.conn.execute(
            "INSERT INTO projects (id, key, name, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                project.id.to_string(),
                project.key,
                project.name,
                project.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn find_by_id(&self, id: Uuid) -> Result<Option<Project>> {
        let sql = format!("SELECT {} FROM projects WHERE id = ?1", COLUMNS);
        let project = self
            .conn
            .query_row(&sql, params![id.to_string()], map_project)
            .optional()?;
        Ok(project)
    }

    #[instrument(skip(self))]
    pub fn find_by_key(&self, key: &str) -> Result<Option<Project>> {
        let sql = format!("SELECT {} FROM projects WHERE key = ?1", COLUMNS);
        let project = self
            .conn
            .query_row(&sql, params![key], map_project)
            .optional()?;
        Ok(project)
    }

    /// Oldest project with the given name (names are not unique)
    #[instrument(skip(self))]
    pub fn find_by_name(&self, name: &str) -> Result<Option<Project>> {
        let sql = format!(
            "SELECT {} FROM projects WHERE name = ?1 ORDER BY created_at LIMIT 1",
            COLUMNS
        );
        let project = self
            .conn
            .query_row(&sql, params![name], map_project)
            .optional()?;
        Ok(project)
    }

    pub fn key_exists(&self, key: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM projects WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Member and meeting counters plus total recorded meeting time
    #[instrument(skip(self))]
    pub fn stats(&self, id: Uuid) -> Result<ProjectStats> {
        let id = id.to_string();
        let member_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM members WHERE project_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        let meeting_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM meetings WHERE project_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        let total: Option<f64> = self.conn.query_row(
            "SELECT SUM(last_update_timestamp - start_time) FROM meetings
             WHERE project_id = ?1 AND end_time IS NOT NULL
               AND start_time IS NOT NULL AND last_update_timestamp >= start_time",
            params![id],
            |row| row.get(0),
        )?;

        Ok(ProjectStats {
            member_count: member_count as u64,
            meeting_count: meeting_count as u64,
            total_meeting_seconds: total.unwrap_or(0.0),
        })
    }
}
