//! TCP client for talking to a badgesync server
//!
//! Requests are answered in order on one connection, so the client is a plain
//! write-then-read over a single stream.

use std::net::SocketAddr;

use badgesync_core::sync::{BatchReceipt, HubView, MeetingView, ProjectView};
use badgesync_core::{EventInput, Hub, MemberRef, Project, ProjectStats};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::{ErrorKind, Request, Response};

pub struct Client {
    stream: TcpStream,
    addr: SocketAddr,
}

fn unexpected(expected: &str, got: Response) -> Error {
    Error::Protocol(format!("Expected {} response, got {:?}", expected, got))
}

impl Client {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let addr = stream.peer_addr()?;
        info!(addr = %addr, "Connected to server");
        Ok(Self { stream, addr })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Send one request and wait for its response. Error responses become `Err`.
    pub async fn request(&mut self, request: &Request) -> Result<Response> {
        write_frame(&mut self.stream, request).await?;
        let response: Response = read_frame(&mut self.stream).await?;
        match response {
            Response::Error {
                kind: ErrorKind::Unavailable,
                message,
            } => Err(Error::Rejected(message)),
            Response::Error { kind, message } => {
                debug!(request = request.name(), ?kind, message = %message, "Server returned error");
                Err(Error::Remote { kind, message })
            }
            response => Ok(response),
        }
    }

    pub async fn ping(&mut self) -> Result<()> {
        match self.request(&Request::Ping).await? {
            Response::Pong => Ok(()),
            other => Err(unexpected("pong", other)),
        }
    }

    pub async fn submit_batch(
        &mut self,
        hub_uuid: &str,
        meeting_uuid: &str,
        events: Vec<EventInput>,
    ) -> Result<BatchReceipt> {
        let request = Request::SubmitBatch {
            hub_uuid: hub_uuid.to_string(),
            meeting_uuid: meeting_uuid.to_string(),
            events,
        };
        match self.request(&request).await? {
            Response::Batch(receipt) => Ok(receipt),
            other => Err(unexpected("batch", other)),
        }
    }

    pub async fn create_meeting(
        &mut self,
        hub_uuid: &str,
        project_id: Uuid,
        log_version: f64,
        meeting_uuid: &str,
    ) -> Result<String> {
        let request = Request::CreateMeeting {
            hub_uuid: hub_uuid.to_string(),
            project_id,
            log_version,
            meeting_uuid: meeting_uuid.to_string(),
        };
        match self.request(&request).await? {
            Response::MeetingCreated { meeting_uuid } => Ok(meeting_uuid),
            other => Err(unexpected("meeting_created", other)),
        }
    }

    pub async fn project_snapshot(&mut self, hub_uuid: &str) -> Result<ProjectView> {
        let request = Request::ProjectSnapshot {
            hub_uuid: hub_uuid.to_string(),
        };
        match self.request(&request).await? {
            Response::Project(view) => Ok(view),
            other => Err(unexpected("project", other)),
        }
    }

    pub async fn hub_snapshot(&mut self, hub_uuid: &str, since: f64) -> Result<HubView> {
        let request = Request::HubSnapshot {
            hub_uuid: hub_uuid.to_string(),
            since,
        };
        match self.request(&request).await? {
            Response::Hub(view) => Ok(view),
            other => Err(unexpected("hub", other)),
        }
    }

    pub async fn meeting_snapshot(
        &mut self,
        hub_uuid: &str,
        meeting_uuid: &str,
        include_events: bool,
    ) -> Result<MeetingView> {
        let request = Request::MeetingSnapshot {
            hub_uuid: hub_uuid.to_string(),
            meeting_uuid: meeting_uuid.to_string(),
            include_events,
        };
        match self.request(&request).await? {
            Response::Meeting(view) => Ok(view),
            other => Err(unexpected("meeting", other)),
        }
    }

    pub async fn register_member(
        &mut self,
        project_id: Uuid,
        badge: &str,
        name: &str,
        email: Option<String>,
    ) -> Result<MemberRef> {
        let request = Request::RegisterMember {
            project_id,
            badge: badge.to_string(),
            name: name.to_string(),
            email,
        };
        match self.request(&request).await? {
            Response::Member(member) => Ok(member),
            other => Err(unexpected("member", other)),
        }
    }

    pub async fn create_project(&mut self, name: &str) -> Result<Project> {
        let request = Request::CreateProject {
            name: name.to_string(),
        };
        match self.request(&request).await? {
            Response::ProjectCreated(project) => Ok(project),
            other => Err(unexpected("project_created", other)),
        }
    }

    pub async fn register_hub(&mut self, hub_uuid: &str) -> Result<Hub> {
        let request = Request::RegisterHub {
            hub_uuid: hub_uuid.to_string(),
        };
        match self.request(&request).await? {
            Response::HubInfo(hub) => Ok(hub),
            other => Err(unexpected("hub_info", other)),
        }
    }

    pub async fn rename_hub(&mut self, hub_uuid: &str, name: &str) -> Result<Hub> {
        let request = Request::RenameHub {
            hub_uuid: hub_uuid.to_string(),
            name: name.to_string(),
        };
        match self.request(&request).await? {
            Response::HubInfo(hub) => Ok(hub),
            other => Err(unexpected("hub_info", other)),
        }
    }

    pub async fn project_stats(&mut self, project_id: Uuid) -> Result<ProjectStats> {
        match self.request(&Request::ProjectStats { project_id }).await? {
            Response::Stats(stats) => Ok(stats),
            other => Err(unexpected("stats", other)),
        }
    }
}
