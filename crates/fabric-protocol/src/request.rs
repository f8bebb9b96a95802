use serde::{Deserialize, Serialize};

use crate::types::{HostedServiceParams, ProcessDescription};
use crate::version::{ProtocolVersion, CURRENT_VERSION};

/// The closed set of request kinds the in-node runtime client (or a hosted
/// service) may send (spec §6.1). Every variant's `version` field is
/// checked by the dispatcher before anything else is decoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    Register {
        version: ProtocolVersion,
        requester_id: String,
        process_id: i32,
        node_id: String,
        callback_address: String,
    },
    Unregister {
        version: ProtocolVersion,
        requester_id: String,
    },
    ActivateProcess {
        version: ProtocolVersion,
        requester_id: String,
        app_service_id: String,
        process: ProcessDescription,
    },
    DeactivateProcess {
        version: ProtocolVersion,
        requester_id: String,
        app_service_id: String,
        graceful: bool,
        timeout_ms: u64,
    },
    TerminateProcess {
        version: ProtocolVersion,
        requester_id: String,
        app_service_id: String,
    },
    ActivateHostedService {
        version: ProtocolVersion,
        params: HostedServiceParams,
    },
    DeactivateHostedService {
        version: ProtocolVersion,
        service_name: String,
    },
    GetContainerInfo {
        version: ProtocolVersion,
        requester_id: String,
        app_service_id: String,
        info_type: String,
        args: Vec<String>,
    },
    /// Passthrough to an out-of-scope collaborator (ACL / firewall / cert /
    /// SMB-share providers). The dispatcher never interprets `payload`; it
    /// only routes on `kind` (spec §4.6, §6.1 "...").
    CollaboratorRequest {
        version: ProtocolVersion,
        kind: String,
        payload: Vec<u8>,
    },
}

impl Request {
    pub fn version(&self) -> ProtocolVersion {
        match self {
            Request::Register { version, .. }
            | Request::Unregister { version, .. }
            | Request::ActivateProcess { version, .. }
            | Request::DeactivateProcess { version, .. }
            | Request::TerminateProcess { version, .. }
            | Request::ActivateHostedService { version, .. }
            | Request::DeactivateHostedService { version, .. }
            | Request::GetContainerInfo { version, .. }
            | Request::CollaboratorRequest { version, .. } => *version,
        }
    }

    pub fn is_current_version(&self) -> bool {
        self.version() == CURRENT_VERSION
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Request::Register { .. } => "Register",
            Request::Unregister { .. } => "Unregister",
            Request::ActivateProcess { .. } => "ActivateProcess",
            Request::DeactivateProcess { .. } => "DeactivateProcess",
            Request::TerminateProcess { .. } => "TerminateProcess",
            Request::ActivateHostedService { .. } => "ActivateHostedService",
            Request::DeactivateHostedService { .. } => "DeactivateHostedService",
            Request::GetContainerInfo { .. } => "GetContainerInfo",
            Request::CollaboratorRequest { .. } => "CollaboratorRequest",
        }
    }
}
