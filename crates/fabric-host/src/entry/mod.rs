//! The entry FSM (spec §4.1): one independent state machine per managed
//! service, application-service and hosted-service shaped respectively.

pub mod fsm;
pub mod state;

use std::sync::Arc;
use std::sync::Mutex as SyncMutex;

use fabric_core::deadline::Deadline;
use fabric_core::error::{Error, ErrorKind};
use fabric_core::signal::Pid;
use fabric_core::Result;
use fabric_protocol::types::{EndpointDescriptor, ProcessDescription};
use tokio::sync::Mutex as AsyncMutex;

use crate::launcher::{ActivationContext, Launcher, Measurement};
use crate::stats::RunStats;

use fsm::Fsm;
use state::{AppState, HostedState};

/// Held behind an `Arc` rather than directly inside the entry's mutex so
/// a long-lived wait on the process (`await_exit`) can clone its handle
/// and release the entry lock immediately, instead of starving every
/// other operation on this entry for the process's whole lifetime.
struct Activation {
    pid: Pid,
    context: Box<dyn ActivationContext>,
}

/// A dynamically-requested managed child process, keyed by
/// `(requester-id, instance-id)` (spec §3, §4.4).
pub struct AppEntry {
    pub requester_id: String,
    pub instance_id: String,
    pub descriptor: ProcessDescription,
    pub endpoint: Option<EndpointDescriptor>,
    pub is_container_root: bool,
    fsm: AsyncMutex<Fsm<AppState>>,
    activation: AsyncMutex<Option<Arc<Activation>>>,
}

impl AppEntry {
    pub fn new(
        requester_id: impl Into<String>,
        instance_id: impl Into<String>,
        descriptor: ProcessDescription,
        endpoint: Option<EndpointDescriptor>,
    ) -> Self {
        let is_container_root = descriptor
            .container
            .as_ref()
            .map(|c| c.is_container_root)
            .unwrap_or(false);
        AppEntry {
            requester_id: requester_id.into(),
            instance_id: instance_id.into(),
            descriptor,
            endpoint,
            is_container_root,
            fsm: AsyncMutex::new(Fsm::new(AppState::Inactive)),
            activation: AsyncMutex::new(None),
        }
    }

    pub async fn state(&self) -> AppState {
        self.fsm.lock().await.state()
    }

    async fn activation(&self) -> Option<Arc<Activation>> {
        self.activation.lock().await.clone()
    }

    /// Inactive -> Starting -> Started; on launcher failure, -> Failed.
    /// Holds the entry lock for the whole operation so a concurrent
    /// deactivate/abort on the same entry serializes behind it (spec §5).
    pub async fn activate(&self, launcher: &dyn Launcher, deadline: Deadline) -> Result<Pid> {
        let mut guard = self.fsm.lock().await;
        guard.transition(AppState::Starting)?;

        let launch = tokio::time::timeout(deadline.remaining(), launcher.launch(&self.descriptor)).await;
        match launch {
            Ok(Ok((pid, context))) => {
                guard.transition(AppState::Started)?;
                *self.activation.lock().await = Some(Arc::new(Activation { pid, context }));
                Ok(pid)
            }
            Ok(Err(err)) => {
                guard.force_failed();
                Err(err)
            }
            Err(_) => {
                guard.force_failed();
                Err(Error::timeout("activate deadline expired"))
            }
        }
    }

    /// Started -> Stopping -> Stopped. `graceful=false` bypasses friendly
    /// termination and goes straight to force-kill.
    pub async fn deactivate(&self, launcher: &dyn Launcher, graceful: bool, deadline: Deadline) -> Result<()> {
        let mut guard = self.fsm.lock().await;
        guard.transition(AppState::Stopping)?;

        let activation = match self.activation().await {
            Some(a) => a,
            None => {
                guard.force_failed();
                return Err(Error::new(ErrorKind::InvalidState, "no live activation context to deactivate"));
            }
        };

        let result = tokio::time::timeout(deadline.remaining(), launcher.terminate(&*activation.context, graceful)).await;
        match result {
            Ok(Ok(())) => {
                guard.transition(AppState::Stopped)?;
                Ok(())
            }
            Ok(Err(err)) => {
                guard.force_failed();
                Err(err)
            }
            Err(_) => {
                guard.force_failed();
                Err(Error::timeout("deactivate deadline expired"))
            }
        }
    }

    /// Abort is always legal from a non-aborted state (spec §4.1); a
    /// forced teardown is attempted best-effort and its failure does not
    /// block the abort transition itself.
    pub async fn abort(&self, launcher: &dyn Launcher) -> Result<()> {
        let mut guard = self.fsm.lock().await;
        guard.abort()?;
        if let Some(activation) = self.activation().await {
            if let Err(err) = launcher.terminate(&*activation.context, false).await {
                log::warn!(
                    "best-effort teardown during abort of {}/{} failed: {}",
                    self.requester_id, self.instance_id, err
                );
            }
        }
        Ok(())
    }

    /// Escalation after a `deactivate` timeout (spec §5: "cancellation
    /// during Stopping escalates to forced termination"). The entry may
    /// have landed in `Failed` with no table-driven path to `Stopped`, so
    /// this force-kills the child and lands the FSM in `Stopped` directly
    /// once the kill has actually completed.
    pub async fn force_kill(&self, launcher: &dyn Launcher) -> Result<()> {
        if let Some(activation) = self.activation().await {
            launcher.terminate(&*activation.context, false).await?;
        }
        self.fsm.lock().await.force(AppState::Stopped);
        Ok(())
    }

    /// Edge-triggered exit callback from the launcher. Only meaningful in
    /// `Started` (normal exit) or `Stopping` (completes an in-flight
    /// deactivate); anywhere else it's recorded and ignored (spec §4.1).
    pub async fn on_process_terminated(&self, _exit_code: i32) {
        let mut guard = self.fsm.lock().await;
        match guard.state() {
            AppState::Started => {
                let _ = guard.transition(AppState::Stopping);
                let _ = guard.transition(AppState::Stopped);
            }
            AppState::Stopping => {
                let _ = guard.transition(AppState::Stopped);
            }
            other => log::debug!("exit observed while entry was in {:?}; ignored", other),
        }
    }

    pub async fn get_process_id(&self) -> Result<Pid> {
        if self.state().await != AppState::Started {
            return Err(Error::new(ErrorKind::InvalidState, "process is not running"));
        }
        match self.activation().await {
            Some(a) => Ok(a.pid),
            None => Err(Error::new(ErrorKind::InvalidState, "process is not running")),
        }
    }

    pub async fn measure_resource_usage(&self, launcher: &dyn Launcher) -> Result<Measurement> {
        if self.state().await != AppState::Started {
            return Err(Error::new(ErrorKind::InvalidState, "can only measure a started entry"));
        }
        match self.activation().await {
            Some(a) => launcher.measure(&*a.context).await,
            None => Err(Error::new(ErrorKind::InvalidState, "process is not running")),
        }
    }

    /// Block until the launcher reports this entry's process has exited.
    /// Returns `None` if there is no live activation to wait on. Clones
    /// the activation handle and releases the entry lock before the
    /// (potentially long) wait, so a concurrent deactivate/abort isn't
    /// starved for the process's whole lifetime.
    pub async fn await_exit(&self, launcher: &dyn Launcher) -> Option<i32> {
        let activation = self.activation().await?;
        match launcher.wait_exit(&*activation.context).await {
            Ok(code) => Some(code),
            Err(err) => {
                log::warn!("error waiting on {}/{}: {}", self.requester_id, self.instance_id, err);
                None
            }
        }
    }
}

/// A declaratively-configured managed child process belonging to the
/// runtime itself, keyed by name (spec §3, §4.3).
pub struct HostedEntry {
    pub name: String,
    descriptor: SyncMutex<ProcessDescription>,
    endpoint: SyncMutex<Option<EndpointDescriptor>>,
    fsm: AsyncMutex<Fsm<HostedState>>,
    activation: AsyncMutex<Option<Arc<Activation>>>,
    pub stats: SyncMutex<RunStats>,
    disabled: SyncMutex<bool>,
}

impl HostedEntry {
    pub fn new(name: impl Into<String>, descriptor: ProcessDescription, endpoint: Option<EndpointDescriptor>) -> Self {
        HostedEntry {
            name: name.into(),
            descriptor: SyncMutex::new(descriptor),
            endpoint: SyncMutex::new(endpoint),
            fsm: AsyncMutex::new(Fsm::new(HostedState::Inactive)),
            activation: AsyncMutex::new(None),
            stats: SyncMutex::new(RunStats::default()),
            disabled: SyncMutex::new(false),
        }
    }

    pub fn descriptor(&self) -> ProcessDescription {
        self.descriptor.lock().unwrap().clone()
    }

    pub fn endpoint(&self) -> Option<EndpointDescriptor> {
        self.endpoint.lock().unwrap().clone()
    }

    pub async fn state(&self) -> HostedState {
        self.fsm.lock().await.state()
    }

    async fn activation(&self) -> Option<Arc<Activation>> {
        self.activation.lock().await.clone()
    }

    pub fn is_disabled(&self) -> bool {
        *self.disabled.lock().unwrap()
    }

    pub fn disable(&self) {
        *self.disabled.lock().unwrap() = true;
    }

    pub async fn activate(&self, launcher: &dyn Launcher, deadline: Deadline) -> Result<Pid> {
        let mut guard = self.fsm.lock().await;
        guard.transition(HostedState::Initializing)?;

        let descriptor = self.descriptor();
        let launch = tokio::time::timeout(deadline.remaining(), launcher.launch(&descriptor)).await;
        let outcome = match launch {
            Ok(Ok((pid, context))) => {
                guard.transition(HostedState::Initialized)?;
                *self.activation.lock().await = Some(Arc::new(Activation { pid, context }));
                Ok(pid)
            }
            Ok(Err(err)) => {
                guard.force_failed();
                Err(err)
            }
            Err(_) => {
                guard.force_failed();
                Err(Error::timeout("activate deadline expired"))
            }
        };
        self.stats.lock().unwrap().update_activation(outcome.is_ok());
        outcome
    }

    pub async fn deactivate(&self, launcher: &dyn Launcher, graceful: bool, deadline: Deadline) -> Result<()> {
        let mut guard = self.fsm.lock().await;
        guard.transition(HostedState::Deactivating)?;

        let activation = match self.activation().await {
            Some(a) => a,
            None => {
                guard.force_failed();
                return Err(Error::new(ErrorKind::InvalidState, "no live activation context to deactivate"));
            }
        };
        let result = tokio::time::timeout(deadline.remaining(), launcher.terminate(&*activation.context, graceful)).await;
        match result {
            Ok(Ok(())) => {
                guard.transition(HostedState::Deactivated)?;
                Ok(())
            }
            Ok(Err(err)) => {
                guard.force_failed();
                Err(err)
            }
            Err(_) => {
                guard.force_failed();
                Err(Error::timeout("deactivate deadline expired"))
            }
        }
    }

    pub async fn abort(&self, launcher: &dyn Launcher) -> Result<()> {
        let mut guard = self.fsm.lock().await;
        guard.abort()?;
        if let Some(activation) = self.activation().await {
            if let Err(err) = launcher.terminate(&*activation.context, false).await {
                log::warn!("best-effort teardown during abort of hosted service {} failed: {}", self.name, err);
            }
        }
        Ok(())
    }

    /// Only resource-governance limits and TLS thumbprint can be applied
    /// in place (spec §4.3, §9 resolved in DESIGN.md); the caller is
    /// responsible for deciding whether a given diff qualifies. On success,
    /// `process`/`endpoint` replace the stored descriptor so a later
    /// `descriptor()`/`endpoint()` read (e.g. settings reconcile's
    /// idempotence check) sees the applied values, not the original launch
    /// descriptor.
    pub async fn update_in_place(
        &self,
        launcher: &dyn Launcher,
        process: ProcessDescription,
        endpoint: Option<EndpointDescriptor>,
        deadline: Deadline,
    ) -> Result<()> {
        let mut guard = self.fsm.lock().await;
        guard.transition(HostedState::Updating)?;
        let activation = match self.activation().await {
            Some(a) => a,
            None => {
                guard.force_failed();
                return Err(Error::new(ErrorKind::InvalidState, "no live activation context to reconfigure"));
            }
        };
        let tls = endpoint.as_ref().and_then(|e| e.tls.as_ref());
        let result = tokio::time::timeout(
            deadline.remaining(),
            launcher.reconfigure(&*activation.context, process.resource_limits.as_ref(), tls),
        )
        .await;
        match result {
            Ok(Ok(())) => {
                guard.transition(HostedState::Initialized)?;
                *self.descriptor.lock().unwrap() = process;
                *self.endpoint.lock().unwrap() = endpoint;
                Ok(())
            }
            Ok(Err(err)) => {
                guard.force_failed();
                Err(err)
            }
            Err(_) => {
                guard.force_failed();
                Err(Error::timeout("update deadline expired"))
            }
        }
    }

    pub async fn on_process_terminated(&self, exit_code: i32) {
        self.stats.lock().unwrap().update_exit(exit_code);
        let mut guard = self.fsm.lock().await;
        match guard.state() {
            HostedState::Initialized => {
                let _ = guard.transition(HostedState::Deactivating);
                let _ = guard.transition(HostedState::Deactivated);
            }
            HostedState::Deactivating => {
                let _ = guard.transition(HostedState::Deactivated);
            }
            other => log::debug!("exit observed for hosted service {} while in {:?}; ignored", self.name, other),
        }
    }

    pub async fn get_process_id(&self) -> Result<Pid> {
        if self.state().await != HostedState::Initialized {
            return Err(Error::new(ErrorKind::InvalidState, "process is not running"));
        }
        match self.activation().await {
            Some(a) => Ok(a.pid),
            None => Err(Error::new(ErrorKind::InvalidState, "process is not running")),
        }
    }

    pub async fn await_exit(&self, launcher: &dyn Launcher) -> Option<i32> {
        let activation = self.activation().await?;
        match launcher.wait_exit(&*activation.context).await {
            Ok(code) => Some(code),
            Err(err) => {
                log::warn!("error waiting on hosted service {}: {}", self.name, err);
                None
            }
        }
    }

    /// `Deactivated` is terminal for an explicit stop, but the restart
    /// scheduler (spec §4.3 backoff ladder) needs to bring a crashed entry
    /// back around to `Initializing`; bypass the table the same way
    /// `force_kill` does for app services.
    pub async fn reset_for_restart(&self) {
        self.fsm.lock().await.force(HostedState::Inactive);
    }
}
