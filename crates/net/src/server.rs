//! TCP server exposing the sync service to hubs
//!
//! One task per connection; each connection carries any number of
//! request/response pairs in order. Engine calls are blocking (SQLite) and
//! run on tokio's blocking pool.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use badgesync_core::SyncService;
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::{broadcast, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::frame::{read_frame, write_frame};
use crate::protocol::{ErrorKind, Request, Response};

/// How long a refused connection may take to send its first request
const REFUSAL_WAIT: Duration = Duration::from_secs(5);

/// Running server handle
pub struct Server {
    addr: SocketAddr,
    shutdown_tx: broadcast::Sender<()>,
}

impl Server {
    /// Bind `listen` and start accepting connections
    pub async fn start<A: ToSocketAddrs>(
        listen: A,
        service: Arc<SyncService>,
        max_connections: usize,
    ) -> Result<Self> {
        let listener = TcpListener::bind(listen).await?;
        let bound_addr = listener.local_addr()?;
        info!(addr = %bound_addr, max_connections, "Server started");

        let (shutdown_tx, _) = broadcast::channel(1);
        let limit = Arc::new(Semaphore::new(max_connections.max(1)));
        tokio::spawn(accept_loop(listener, service, limit, shutdown_tx.clone()));

        Ok(Server {
            addr: bound_addr,
            shutdown_tx,
        })
    }

    /// Get the server's bound address
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting and close open connections
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
        info!("Server shutdown initiated");
    }
}

async fn accept_loop(
    listener: TcpListener,
    service: Arc<SyncService>,
    limit: Arc<Semaphore>,
    shutdown_tx: broadcast::Sender<()>,
) {
    let mut shutdown_rx = shutdown_tx.subscribe();
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => match limit.clone().try_acquire_owned() {
                        Ok(permit) => {
                            debug!(addr = %addr, "New connection");
                            tokio::spawn(handle_connection(
                                stream,
                                addr,
                                service.clone(),
                                permit,
                                shutdown_tx.subscribe(),
                            ));
                        }
                        Err(_) => {
                            warn!(addr = %addr, "Connection limit reached");
                            tokio::spawn(refuse(stream));
                        }
                    },
                    Err(e) => {
                        error!(error = %e, "Accept failed");
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Accept loop shutting down");
                break;
            }
        }
    }
}

/// Answer the first request with a refusal, then close
async fn refuse(mut stream: TcpStream) {
    let first = tokio::time::timeout(REFUSAL_WAIT, read_frame::<_, Request>(&mut stream)).await;
    if !matches!(first, Ok(Ok(_))) {
        return;
    }
    let response = Response::error(ErrorKind::Unavailable, "server is at its connection limit");
    if let Err(e) = write_frame(&mut stream, &response).await {
        debug!(error = %e, "Failed to send refusal");
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    service: Arc<SyncService>,
    _permit: OwnedSemaphorePermit,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let (mut reader, mut writer) = tokio::io::split(stream);

    loop {
        let request = tokio::select! {
            frame = read_frame::<_, Request>(&mut reader) => frame,
            _ = shutdown_rx.recv() => break,
        };

        let response = match request {
            Ok(request) => dispatch(&service, request).await,
            Err(Error::ConnectionClosed) => {
                debug!(addr = %addr, "Connection closed");
                break;
            }
            Err(Error::Protocol(reason)) => {
                // Framing is lost; answer once and drop the connection
                warn!(addr = %addr, reason = %reason, "Protocol error");
                let response = Response::error(ErrorKind::MalformedEvent, reason);
                let _ = write_frame(&mut writer, &response).await;
                break;
            }
            Err(e) => {
                warn!(addr = %addr, error = %e, "Read error");
                break;
            }
        };

        if let Err(e) = write_frame(&mut writer, &response).await {
            debug!(addr = %addr, error = %e, "Write failed");
            break;
        }
    }
}

async fn dispatch(service: &Arc<SyncService>, request: Request) -> Response {
    if request == Request::Ping {
        return Response::Pong;
    }

    let name = request.name();
    let service = service.clone();
    match tokio::task::spawn_blocking(move || execute(&service, request)).await {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => {
            let response = Response::from_core_error(&err);
            match ErrorKind::from(&err) {
                ErrorKind::Internal => error!(request = name, error = %err, "Request failed"),
                _ => debug!(request = name, error = %err, "Request refused"),
            }
            response
        }
        Err(join) => {
            error!(request = name, error = %join, "Request task panicked");
            Response::error(ErrorKind::Internal, "internal server error")
        }
    }
}

fn execute(service: &SyncService, request: Request) -> badgesync_core::Result<Response> {
    let response = match request {
        Request::Ping => Response::Pong,
        Request::SubmitBatch {
            hub_uuid,
            meeting_uuid,
            events,
        } => Response::Batch(service.submit_batch(&hub_uuid, &meeting_uuid, &events)?),
        Request::CreateMeeting {
            hub_uuid,
            project_id,
            log_version,
            meeting_uuid,
        } => Response::MeetingCreated {
            meeting_uuid: service.create_meeting(&hub_uuid, project_id, log_version, &meeting_uuid)?,
        },
        Request::ProjectSnapshot { hub_uuid } => Response::Project(service.project_snapshot(&hub_uuid)?),
        Request::HubSnapshot { hub_uuid, since } => Response::Hub(service.hub_snapshot(&hub_uuid, since)?),
        Request::MeetingSnapshot {
            hub_uuid,
            meeting_uuid,
            include_events,
        } => Response::Meeting(service.meeting_snapshot(&hub_uuid, &meeting_uuid, include_events)?),
        Request::RegisterMember {
            project_id,
            badge,
            name,
            email,
        } => Response::Member(service.register_member(project_id, &badge, &name, email)?),
        Request::CreateProject { name } => Response::ProjectCreated(service.create_project(&name)?),
        Request::RegisterHub { hub_uuid } => Response::HubInfo(service.register_hub(&hub_uuid)?),
        Request::RenameHub { hub_uuid, name } => Response::HubInfo(service.rename_hub(&hub_uuid, &name)?),
        Request::ProjectStats { project_id } => Response::Stats(service.project_stats(project_id)?),
    };
    Ok(response)
}
