//! badgesync network library
//!
//! Exposes the sync service to hubs over TCP.
//!
//! # Architecture
//!
//! - **Server**: accepts hub connections and runs requests against a `SyncService`
//! - **Client**: request/response helpers for hubs and tools
//! - **Protocol**: length-prefixed JSON messages tagged by `type`
//!
//! # Usage
//!
//! ```ignore
//! let service = Arc::new(SyncService::open(path, timeout, SyncConfig::default())?);
//! let server = Server::start("127.0.0.1:7341", service, 64).await?;
//!
//! let mut client = Client::connect(server.addr()).await?;
//! let receipt = client.submit_batch(hub, meeting, events).await?;
//! ```

pub mod client;
pub mod error;
mod frame;
pub mod protocol;
pub mod server;

pub use client::Client;
pub use error::{Error, Result};
pub use frame::MAX_FRAME_SIZE;
pub use protocol::{ErrorKind, Request, Response};
pub use server::Server;
