//! badgesync core library
//!
//! Models, SQLite storage, and the engine that merges hub event batches into
//! per-meeting state and serves snapshots back to hubs.

pub mod config;
pub mod error;
pub mod invariants;
pub mod keys;
pub mod models;
pub mod storage;
pub mod sync;

pub use config::{Config, ConfigError};
pub use error::{Error, Result};
pub use keys::generate_unique_key;
pub use models::*;
pub use storage::{Database, Storage};
pub use sync::{BatchReceipt, BatchStatus, HubView, MeetingView, ProjectView, SyncService};
