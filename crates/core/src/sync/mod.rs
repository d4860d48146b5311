//! The event ingestion and meeting-state reconciliation engine

pub mod event_log;
pub mod ingest;
pub mod lifecycle;
pub mod locks;
pub mod projector;
pub mod service;
pub mod snapshot;
pub mod validator;

pub use event_log::{AppendOutcome, EventLog};
pub use ingest::{ingest_batch, BatchReceipt, BatchStatus, HubContext, DEFAULT_LOG_VERSION};
pub use lifecycle::Transition;
pub use locks::{PairGuard, PairLocks};
pub use projector::{Effect, Projector};
pub use service::SyncService;
pub use snapshot::{
    BadgeEntry, CurrentMeeting, HistorySummary, HubView, MeetingView, NamedMember, ProjectView,
};
pub use validator::{check_contiguity, parse_batch, BatchOutcome};
