//! Member storage operations

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{parse_datetime, parse_uuid, sortable_datetime, OptionalExt};
use crate::error::Result;
use crate::models::Member;

const COLUMNS: &str = "id, key, project_id, badge, name, email, created_at, updated_at";

fn map_member(row: &Row<'_>) -> rusqlite::Result<Member> {
    Ok(Member {
        id: parse_uuid(0, &row.get::<_, String>(0)?)?,
        key: row.get(1)?,
        project_id: parse_uuid(2, &row.get::<_, String>(2)?)?,
        badge: row.get(3)?,
        name: row.get(4)?,
        email: row.get(5)?,
        created_at: parse_datetime(6, &row.get::<_, String>(6)?)?,
        updated_at: parse_datetime(7, &row.get::<_, String>(7)?)?,
    })
}

pub struct MemberStore<'a> {
    conn: &'a Connection,
}

impl<'a> MemberStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert the member, or refresh name/email of the existing (badge, project) row.
    ///
    /// On conflict the stored id and key are kept; the returned record is the
    /// row as persisted.
    #[instrument(skip(self, member), fields(badge = %member.badge, project = %member.project_id))]
    pub fn upsert(&self, member: &Member) -> Result<Member> {
        self.conn.execute(
            "INSERT INTO members (id, key, project_id, badge, name, email, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(badge, project_id) DO UPDATE SET
                name = excluded.name,
                email = excluded.email,
                updated_at = excluded.updated_at",
            params![
                member.id.to_string(),
                member.key,
                member.project_id.to_string(),
                member.badge,
                member.name,
                member.email,
                sortable_datetime(&member.created_at),
                sortable_datetime(&member.updated_at),
            ],
        )?;

        self.find_by_badge(member.project_id, &member.badge)?
            .ok_or_else(|| crate::Error::not_found("member", &member.badge))
    }

    #[instrument(skip(self))]
    pub fn find_by_badge(&self, project_id: Uuid, badge: &str) -> Result<Option<Member>> {
        let sql = format!(
            "SELECT {} FROM members WHERE project_id = ?1 AND badge = ?2",
            COLUMNS
        );
        let member = self
            .conn
            .query_row(&sql, params![project_id.to_string(), badge], map_member)
            .optional()?;
        Ok(member)
    }

    #[instrument(skip(self))]
    pub fn list_for_project(&self, project_id: Uuid) -> Result<Vec<Member>> {
        let sql = format!(
            "SELECT {} FROM members WHERE project_id = ?1 ORDER BY name, badge",
            COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let members = stmt
            .query_map(params![project_id.to_string()], map_member)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(members)
    }

    /// Members whose record changed strictly after `since`
    #[instrument(skip(self))]
    pub fn list_updated_since(&self, project_id: Uuid, since: DateTime<Utc>) -> Result<Vec<Member>> {
        let sql = format!(
            "SELECT {} FROM members WHERE project_id = ?1 AND updated_at > ?2 ORDER BY updated_at",
            COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let members = stmt
            .query_map(params![project_id.to_string(), sortable_datetime(&since)], map_member)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(members)
    }

    pub fn key_exists(&self, key: &str) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM members WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
