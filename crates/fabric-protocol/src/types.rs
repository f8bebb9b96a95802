use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The closed error taxonomy of spec §7, mirrored here in a serializable
/// form so it can travel as an IPC reply field. Kept in lockstep with
/// `fabric_core::ErrorKind` by the `From` impls in `error.rs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireErrorKind {
    InvalidArgument,
    InvalidState,
    NotFound,
    AlreadyExists,
    Timeout,
    LauncherFailure,
    ConfigurationError,
    ProtocolMismatch,
    Closed,
    Disabled,
}

impl From<fabric_core::ErrorKind> for WireErrorKind {
    fn from(kind: fabric_core::ErrorKind) -> Self {
        use fabric_core::ErrorKind as K;
        match kind {
            K::InvalidArgument => WireErrorKind::InvalidArgument,
            K::InvalidState => WireErrorKind::InvalidState,
            K::NotFound => WireErrorKind::NotFound,
            K::AlreadyExists => WireErrorKind::AlreadyExists,
            K::Timeout => WireErrorKind::Timeout,
            K::LauncherFailure => WireErrorKind::LauncherFailure,
            K::ConfigurationError => WireErrorKind::ConfigurationError,
            K::ProtocolMismatch => WireErrorKind::ProtocolMismatch,
            K::Closed => WireErrorKind::Closed,
            K::Disabled => WireErrorKind::Disabled,
        }
    }
}

impl From<&fabric_core::Error> for WireErrorKind {
    fn from(err: &fabric_core::Error) -> Self {
        err.kind().into()
    }
}

/// Resource-governance limits for a launched process (spec §3).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu_shares: Option<u32>,
    pub cpuset: Option<String>,
    pub memory_bytes: Option<u64>,
}

/// TLS identity to bind to an endpoint (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TlsDescriptor {
    pub thumbprint: String,
    pub store: String,
    pub find_type: String,
}

/// An endpoint a service binds to (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub port: u16,
    pub protocol: String,
    pub tls: Option<TlsDescriptor>,
}

/// A container to launch the process inside of. `is_container_root` marks
/// an entry that owns dependent container-child entries sharing its
/// network namespace (spec §3 invariants).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerDescription {
    pub image: String,
    pub is_container_root: bool,
    pub root_container_id: Option<String>,
}

/// Everything needed to launch a process, independent of whether it backs
/// a hosted service or an application service (spec §3 "launch descriptor").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessDescription {
    pub executable: String,
    pub arguments: Vec<String>,
    pub working_directory: Option<String>,
    pub environment: HashMap<String, String>,
    pub console_ctrl: bool,
    pub runas_id: Option<String>,
    pub resource_limits: Option<ResourceLimits>,
    pub container: Option<ContainerDescription>,
}

/// Declarative parameters for a hosted service (spec §3, §4.3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostedServiceParams {
    pub service_name: String,
    pub process: ProcessDescription,
    pub endpoint: Option<EndpointDescriptor>,
}

/// Health-check datum published in `ContainerHealthStatusChange`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerHealthStatus {
    pub app_service_id: String,
    pub healthy: bool,
    pub detail: Option<String>,
}
