//! SQLite storage layer for badgesync

mod events;
mod histories;
mod hubs;
mod meetings;
mod members;
mod migrations;
mod parse;
mod projects;
mod traits;

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};
use tracing::instrument;

use crate::error::Result;

pub use events::EventStore;
pub use histories::HistoryStore;
pub use hubs::HubStore;
pub use meetings::MeetingStore;
pub use members::MemberStore;
pub use projects::ProjectStore;
pub use traits::{
    EventRepository, HistoryRepository, HubRepository, MeetingRepository, MemberRepository,
    ProjectRepository, Storage, StoreAccess,
};

/// Default wait for a locked database before giving up
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Main database handle
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create the database at the given path and bring the schema up to date
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = Self::connect(path, DEFAULT_BUSY_TIMEOUT)?;
        // WAL lets readers keep a consistent snapshot while a batch is being written
        db.conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get::<_, String>(0))?;
        db.init()?;
        Ok(db)
    }

    /// Open an existing database without running migrations
    pub fn connect<P: AsRef<Path>>(path: P, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        conn.busy_timeout(busy_timeout)?;
        Ok(Self { conn })
    }

    /// Open in-memory database (for testing)
    #[instrument]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> Result<()> {
        migrations::run_migrations(&self.conn)
    }

    /// Get current schema version
    pub fn schema_version(&self) -> Result<u32> {
        migrations::applied_version(&self.conn)
    }

    /// Start a transaction; writers should use `Immediate` so the write lock is
    /// taken before anything is read
    pub fn transaction(&mut self, behavior: TransactionBehavior) -> Result<DatabaseTx<'_>> {
        let tx = self.conn.transaction_with_behavior(behavior)?;
        Ok(DatabaseTx { tx })
    }
}

impl StoreAccess for Database {
    fn connection(&self) -> &Connection {
        &self.conn
    }
}

/// An open transaction; dropping it without `commit` rolls back
pub struct DatabaseTx<'a> {
    tx: Transaction<'a>,
}

impl DatabaseTx<'_> {
    pub fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }
}

impl StoreAccess for DatabaseTx<'_> {
    fn connection(&self) -> &Connection {
        &self.tx
    }
}
