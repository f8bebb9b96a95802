//! IPC request dispatcher (spec §4.6): routes an inbound typed request to
//! the correct supervisor, serializes the reply, and publishes
//! notifications upstream. Grounded in the teacher's
//! `launcher/src/server/handlers` dispatch-table pattern, generalized
//! from a single fixed Supervisor peer to many requester peers.

use std::sync::Arc;
use std::time::Duration;

use fabric_core::error::ErrorKind;
use fabric_protocol::types::WireErrorKind;
use fabric_protocol::{Notification, Reply, Request};

use crate::requester::{RequesterDeathHandler, RequesterRegistry};
use crate::supervisor::{AppSupervisor, HostedSupervisor};
use crate::transport::{ConnectionId, Transport};

/// Passthrough handler for the collaborator-specific request kinds (ACL /
/// firewall / cert / SMB-share providers, spec §1 "out of scope"). The
/// dispatcher only needs to route to one of these, never implement it.
#[async_trait::async_trait]
pub trait CollaboratorHandler: Send + Sync {
    async fn handle(&self, kind: &str, payload: Vec<u8>) -> Result<Vec<u8>, fabric_core::Error>;
}

/// Rejects every collaborator request; used where no such provider is
/// wired up (e.g. most tests).
pub struct NoCollaborators;

#[async_trait::async_trait]
impl CollaboratorHandler for NoCollaborators {
    async fn handle(&self, kind: &str, _payload: Vec<u8>) -> Result<Vec<u8>, fabric_core::Error> {
        Err(fabric_core::Error::new(
            ErrorKind::InvalidArgument,
            format!("no collaborator registered for request kind {}", kind),
        ))
    }
}

pub struct Dispatcher<T: Transport> {
    transport: Arc<T>,
    hosted: Arc<HostedSupervisor>,
    app: Arc<AppSupervisor>,
    requesters: Arc<RequesterRegistry>,
    collaborators: Arc<dyn CollaboratorHandler>,
}

impl<T: Transport + 'static> Dispatcher<T> {
    pub fn new(
        transport: Arc<T>,
        hosted: Arc<HostedSupervisor>,
        app: Arc<AppSupervisor>,
        requesters: Arc<RequesterRegistry>,
        collaborators: Arc<dyn CollaboratorHandler>,
    ) -> Self {
        Dispatcher { transport, hosted, app, requesters, collaborators }
    }

    /// Drains inbound requests until the transport closes (spec §4.8:
    /// driven as its own task for the lifetime of an open `Host`).
    pub async fn run(self: Arc<Self>) {
        while let Some(inbound) = self.transport.recv().await {
            let this = Arc::clone(&self);
            tokio::spawn(async move {
                let reply = this.handle(inbound.connection, inbound.request).await;
                let _ = inbound.reply.send(reply);
            });
        }
    }

    async fn handle(self: &Arc<Self>, connection: ConnectionId, request: Request) -> Reply {
        if !request.is_current_version() {
            log::warn!("rejecting {} with unsupported version {:?}", request.kind_name(), request.version());
            return protocol_mismatch(&request);
        }

        match request {
            Request::Register { requester_id, process_id, node_id, callback_address, .. } => {
                let error = self.handle_register(connection, requester_id, process_id, node_id, callback_address).await;
                Reply::Register { error }
            }
            Request::Unregister { requester_id, .. } => {
                let error = self.handle_unregister(&requester_id).await;
                Reply::Unregister { error }
            }
            Request::ActivateProcess { requester_id, app_service_id, process, .. } => {
                match self.app.activate_process(&requester_id, &app_service_id, process, Duration::from_secs(30)).await {
                    Ok(pid) => Reply::ActivateProcess { error: None, process_id: Some(pid) },
                    Err(err) => Reply::ActivateProcess { error: Some((&err).into()), process_id: None },
                }
            }
            Request::DeactivateProcess { requester_id, app_service_id, graceful, timeout_ms, .. } => {
                let error = self
                    .app
                    .deactivate_process(&requester_id, &app_service_id, graceful, Duration::from_millis(timeout_ms))
                    .await
                    .err()
                    .map(|e| (&e).into());
                Reply::DeactivateProcess { error }
            }
            Request::TerminateProcess { requester_id, app_service_id, .. } => {
                let error = self.app.terminate_process(&requester_id, &app_service_id).await.err().map(|e| (&e).into());
                Reply::TerminateProcess { error }
            }
            Request::ActivateHostedService { params, .. } => {
                let error = self.hosted.activate_hosted_service(params).await.err().map(|e| (&e).into());
                Reply::ActivateHostedService { error }
            }
            Request::DeactivateHostedService { service_name, .. } => {
                let error = self.hosted.deactivate_hosted_service(&service_name).await.err().map(|e| (&e).into());
                Reply::DeactivateHostedService { error }
            }
            Request::GetContainerInfo { requester_id, app_service_id, info_type, .. } => {
                match self.app.measure(&requester_id, &app_service_id).await {
                    Ok(m) => Reply::GetContainerInfo {
                        error: None,
                        info: Some(format!("{}: cpu={:.1}% mem={}B", info_type, m.cpu_percent, m.memory_bytes)),
                    },
                    Err(err) => Reply::GetContainerInfo { error: Some((&err).into()), info: None },
                }
            }
            Request::CollaboratorRequest { kind, payload, .. } => match self.collaborators.handle(&kind, payload).await {
                Ok(payload) => Reply::CollaboratorRequest { error: None, payload: Some(payload) },
                Err(err) => Reply::CollaboratorRequest { error: Some((&err).into()), payload: None },
            },
        }
    }

    async fn handle_register(
        self: &Arc<Self>,
        connection: ConnectionId,
        requester_id: String,
        process_id: i32,
        node_id: String,
        callback_address: String,
    ) -> Option<WireErrorKind> {
        let death_handler: Arc<dyn RequesterDeathHandler> = Arc::clone(self) as Arc<dyn RequesterDeathHandler>;
        match self
            .requesters
            .register(requester_id.clone(), process_id, node_id, callback_address, death_handler)
            .await
        {
            Ok(()) => {
                self.transport.associate(connection, requester_id).await;
                None
            }
            Err(err) => Some((&err).into()),
        }
    }

    async fn handle_unregister(&self, requester_id: &str) -> Option<WireErrorKind> {
        self.app.abort_application_environment(requester_id).await;
        let result = self.requesters.unregister(requester_id).await;
        self.transport.forget(requester_id).await;
        result.err().map(|e| (&e).into())
    }

    pub async fn broadcast_node_enabled(&self) {
        self.transport.broadcast(Notification::NodeEnabled).await;
    }

    pub async fn broadcast_node_disabled(&self) {
        self.transport.broadcast(Notification::NodeDisabled).await;
    }
}

#[async_trait::async_trait]
impl<T: Transport + 'static> RequesterDeathHandler for Dispatcher<T> {
    /// The primary mechanism preventing orphaned child processes after a
    /// runtime-node crash (spec §4.5): bulk-tear-down every app service
    /// the dead requester owned, then drop the transport association.
    async fn on_requester_died(&self, requester_id: &str) {
        self.app.abort_application_environment(requester_id).await;
        self.transport.forget(requester_id).await;
    }
}

fn protocol_mismatch(request: &Request) -> Reply {
    let error = Some(WireErrorKind::ProtocolMismatch);
    match request {
        Request::Register { .. } => Reply::Register { error },
        Request::Unregister { .. } => Reply::Unregister { error },
        Request::ActivateProcess { .. } => Reply::ActivateProcess { error, process_id: None },
        Request::DeactivateProcess { .. } => Reply::DeactivateProcess { error },
        Request::TerminateProcess { .. } => Reply::TerminateProcess { error },
        Request::ActivateHostedService { .. } => Reply::ActivateHostedService { error },
        Request::DeactivateHostedService { .. } => Reply::DeactivateHostedService { error },
        Request::GetContainerInfo { .. } => Reply::GetContainerInfo { error, info: None },
        Request::CollaboratorRequest { .. } => Reply::CollaboratorRequest { error, payload: None },
    }
}
