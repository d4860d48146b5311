//! Database migration system
//!
//! Tracks schema versions and applies migrations in order.

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::{debug, info, instrument};

use crate::error::Result;

/// A database migration
pub struct Migration {
    /// Version number (must be sequential starting from 1)
    pub version: u32,
    /// Description of what this migration does
    pub description: &'static str,
    /// SQL to run for this migration
    pub sql: &'static str,
}

/// All migrations in order
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema",
        sql: r#"
            -- Projects table
            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                key TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            -- Meetings table
            CREATE TABLE IF NOT EXISTS meetings (
                uuid TEXT PRIMARY KEY,
                key TEXT NOT NULL UNIQUE,
                project_id TEXT NOT NULL,
                log_version REAL NOT NULL,
                start_time REAL,
                end_time REAL,
                is_active INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE
            );

            -- Hubs table
            CREATE TABLE IF NOT EXISTS hubs (
                uuid TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                project_id TEXT NOT NULL,
                is_super_user INTEGER NOT NULL DEFAULT 0,
                current_meeting TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (project_id) REFERENCES projects(id),
                FOREIGN KEY (current_meeting) REFERENCES meetings(uuid) ON DELETE SET NULL
            );

            -- Members table
            CREATE TABLE IF NOT EXISTS members (
                id TEXT PRIMARY KEY,
                key TEXT NOT NULL UNIQUE,
                project_id TEXT NOT NULL,
                badge TEXT NOT NULL,
                name TEXT NOT NULL,
                email TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (project_id) REFERENCES projects(id) ON DELETE CASCADE,
                UNIQUE(badge, project_id)
            );

            -- Append-only event log, deduplicated by (hub, meeting, log_index)
            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hub_uuid TEXT NOT NULL,
                meeting_uuid TEXT NOT NULL,
                log_index INTEGER NOT NULL,
                log_timestamp REAL NOT NULL,
                type TEXT NOT NULL,
                data TEXT NOT NULL DEFAULT 'null',
                recorded_at TEXT NOT NULL,
                FOREIGN KEY (hub_uuid) REFERENCES hubs(uuid),
                FOREIGN KEY (meeting_uuid) REFERENCES meetings(uuid) ON DELETE CASCADE,
                UNIQUE(hub_uuid, meeting_uuid, log_index)
            );

            -- Current state per (meeting, hub)
            CREATE TABLE IF NOT EXISTS histories (
                meeting_uuid TEXT NOT NULL,
                hub_uuid TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 0,
                last_activity_update INTEGER NOT NULL DEFAULT -1,
                last_log_index INTEGER NOT NULL DEFAULT -1,
                members TEXT NOT NULL DEFAULT '{}',
                updated_at TEXT NOT NULL,
                PRIMARY KEY (meeting_uuid, hub_uuid),
                FOREIGN KEY (meeting_uuid) REFERENCES meetings(uuid) ON DELETE CASCADE,
                FOREIGN KEY (hub_uuid) REFERENCES hubs(uuid)
            );
        "#,
    },
    Migration {
        version: 2,
        description: "Add indexes for query performance",
        sql: r#"
            CREATE INDEX IF NOT EXISTS idx_hubs_project ON hubs(project_id);
            CREATE INDEX IF NOT EXISTS idx_members_project ON members(project_id);
            CREATE INDEX IF NOT EXISTS idx_members_updated ON members(project_id, updated_at);
            CREATE INDEX IF NOT EXISTS idx_meetings_project ON meetings(project_id, is_active);

            -- Full-log reads are ordered for display by timestamp
            CREATE INDEX IF NOT EXISTS idx_events_meeting_ts ON events(meeting_uuid, log_timestamp);
            CREATE INDEX IF NOT EXISTS idx_histories_hub ON histories(hub_uuid);
        "#,
    },
    Migration {
        version: 3,
        description: "Add hub heartbeat and meeting last-update tracking",
        sql: r#"
            ALTER TABLE hubs ADD COLUMN last_seen_at TEXT;
            ALTER TABLE meetings ADD COLUMN last_update_timestamp REAL;
            ALTER TABLE meetings ADD COLUMN last_update_index INTEGER;
        "#,
    },
];

/// Create the bookkeeping table that records applied versions
fn ensure_version_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
    )?;
    Ok(())
}

/// Highest applied version, 0 for a fresh database
pub(crate) fn applied_version(conn: &Connection) -> Result<u32> {
    let version: Option<u32> =
        conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |row| {
            row.get(0)
        })?;
    Ok(version.unwrap_or(0))
}

/// Apply one migration and its bookkeeping row atomically
fn apply(conn: &Connection, migration: &Migration) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(migration.sql)?;

    // Record the version in the same transaction so a failed step leaves no trace
    tx.execute(
        "INSERT INTO schema_migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
        params![
            migration.version,
            migration.description,
            Utc::now().to_rfc3339()
        ],
    )?;
    tx.commit()?;
    Ok(())
}

/// Run all pending migrations
#[instrument(skip(conn))]
pub fn run_migrations(conn: &Connection) -> Result<()> {
    ensure_version_table(conn)?;

    // Get current version
    let from = applied_version(conn)?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > from).collect();
    if pending.is_empty() {
        debug!(version = from, "Schema up to date");
        return Ok(());
    }

    // Apply pending migrations in order
    for migration in pending {
        info!(
            version = migration.version,
            description = migration.description,
            "Applying migration"
        );
        apply(conn, migration)?;
    }

    info!(from, to = applied_version(conn)?, "Database schema updated");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn latest_version() -> u32 {
        MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
    }

    fn table_exists(conn: &Connection, name: &str) -> bool {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |row| row.get::<_, i64>(0),
        )
        .unwrap()
            == 1
    }

    #[test]
    fn test_fresh_database_reaches_latest_version() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();

        assert_eq!(applied_version(&conn).unwrap(), latest_version());
        for table in ["projects", "hubs", "members", "meetings", "events", "histories"] {
            assert!(table_exists(&conn, table), "missing table {}", table);
        }
    }

    #[test]
    fn test_rerun_is_noop() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows as u32, latest_version());
    }

    #[test]
    fn test_versions_are_contiguous() {
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(
                migration.version as usize,
                i + 1,
                "Migration '{}' is out of sequence",
                migration.description
            );
        }
    }
}
