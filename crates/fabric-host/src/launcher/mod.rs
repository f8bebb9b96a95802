//! The process-launcher collaborator (spec §6.2) — out of scope to
//! *implement* in full (job objects / cgroups / container engines are
//! someone else's problem) but the host needs a trait boundary to drive
//! it through. Grounded in the teacher's `launcher/src/sys/unix/service.rs`
//! `Process`/`run` pair, generalized from "spawn a Supervisor" to "spawn
//! any described process".

pub mod unix;
pub mod mock;

use std::any::Any;
use std::fmt;

use async_trait::async_trait;
use fabric_core::{signal::Pid, Result};
use fabric_protocol::types::{ProcessDescription, ResourceLimits, TlsDescriptor};

/// Opaque handle to a live child process or container (spec glossary:
/// "activation context"). Implementations carry whatever OS-specific
/// state they need (a `tokio::process::Child`, a container-engine client
/// handle, ...); the host only ever holds the trait object.
pub trait ActivationContext: Send + Sync + fmt::Debug {
    fn as_any(&self) -> &dyn Any;
}

/// A CPU/memory sample returned by `measure_resource_usage` (spec §4.1).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    pub cpu_percent: f64,
    pub memory_bytes: u64,
}

#[async_trait]
pub trait Launcher: Send + Sync {
    /// Create an OS child (or container) for `descriptor`, returning its
    /// pid and an opaque handle to wait on or signal later.
    async fn launch(
        &self,
        descriptor: &ProcessDescription,
    ) -> Result<(Pid, Box<dyn ActivationContext>)>;

    /// Deliver a friendly signal if supported and `graceful`, else force-kill.
    async fn terminate(&self, context: &dyn ActivationContext, graceful: bool) -> Result<()>;

    /// Block until the process exits and return its exit code. The
    /// supervisor drives this in a background task per live entry so it
    /// behaves like the "register an exit callback" shape of spec §6.2
    /// without requiring callback-based APIs in an async codebase.
    async fn wait_exit(&self, context: &dyn ActivationContext) -> Result<i32>;

    async fn measure(&self, context: &dyn ActivationContext) -> Result<Measurement>;

    /// In-place reconfiguration for the hosted-service update path (spec
    /// §4.3): only resource-governance limits and TLS thumbprint can be
    /// changed without a restart.
    async fn reconfigure(
        &self,
        context: &dyn ActivationContext,
        limits: Option<&ResourceLimits>,
        tls: Option<&TlsDescriptor>,
    ) -> Result<()>;
}
