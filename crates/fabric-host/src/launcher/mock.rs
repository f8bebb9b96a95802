//! An in-process launcher double for exercising the supervisors and
//! dispatcher without spawning real OS processes. Used by the seed
//! scenario integration tests (spec §8).

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use fabric_core::error::{Error, ErrorKind};
use fabric_core::signal::Pid;
use fabric_core::Result;
use fabric_protocol::types::{ProcessDescription, ResourceLimits, TlsDescriptor};
use tokio::sync::{oneshot, Mutex};

use super::{ActivationContext, Launcher, Measurement};

#[derive(Debug)]
pub struct MockActivationContext {
    pid: Pid,
    exit_rx: Mutex<Option<oneshot::Receiver<i32>>>,
}

impl ActivationContext for MockActivationContext {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Lets a test script drive a spawned mock process to exit with a given
/// code at will (simulating "kill P externally" in seed scenario 1).
pub struct MockHandle {
    exit_tx: Mutex<Option<oneshot::Sender<i32>>>,
}

impl MockHandle {
    pub async fn exit(&self, code: i32) {
        if let Some(tx) = self.exit_tx.lock().await.take() {
            let _ = tx.send(code);
        }
    }
}

#[derive(Default)]
pub struct MockLauncher {
    next_pid: AtomicI32,
    handles: Mutex<HashMap<Pid, Arc<MockHandle>>>,
    executables: Mutex<HashMap<Pid, String>>,
    /// Processes that should fail to launch (by executable name), to
    /// exercise the `Failed`-on-launch-error path.
    pub fail_launch_for: Mutex<Vec<String>>,
    /// Processes that ignore a graceful `terminate` (by executable name),
    /// to exercise the deactivate-timeout-then-force-kill escalation path
    /// (spec §8 seed scenario 5). A non-graceful terminate still takes.
    pub ignore_graceful_term_for: Mutex<Vec<String>>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn handle_for(&self, pid: Pid) -> Option<Arc<MockHandle>> {
        self.handles.lock().await.get(&pid).cloned()
    }
}

#[async_trait]
impl Launcher for MockLauncher {
    async fn launch(
        &self,
        descriptor: &ProcessDescription,
    ) -> Result<(Pid, Box<dyn ActivationContext>)> {
        if self
            .fail_launch_for
            .lock()
            .await
            .contains(&descriptor.executable)
        {
            return Err(Error::new(
                ErrorKind::LauncherFailure,
                format!("mock launcher configured to fail for {}", descriptor.executable),
            ));
        }
        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst) + 1;
        let (tx, rx) = oneshot::channel();
        self.handles
            .lock()
            .await
            .insert(pid, Arc::new(MockHandle { exit_tx: Mutex::new(Some(tx)) }));
        self.executables
            .lock()
            .await
            .insert(pid, descriptor.executable.clone());
        Ok((
            pid,
            Box::new(MockActivationContext {
                pid,
                exit_rx: Mutex::new(Some(rx)),
            }),
        ))
    }

    async fn terminate(&self, context: &dyn ActivationContext, graceful: bool) -> Result<()> {
        let ctx = downcast(context)?;
        if graceful {
            let ignores = match self.executables.lock().await.get(&ctx.pid) {
                Some(executable) => self.ignore_graceful_term_for.lock().await.contains(executable),
                None => false,
            };
            if ignores {
                // A process that ignores the friendly signal never reports
                // back to a graceful terminate; the caller's own deadline
                // is what ends this, via `tokio::time::timeout` dropping
                // this future (spec §8 seed scenario 5).
                std::future::pending::<()>().await;
            }
        }
        if let Some(handle) = self.handle_for(ctx.pid).await {
            handle.exit(143).await;
        }
        Ok(())
    }

    async fn wait_exit(&self, context: &dyn ActivationContext) -> Result<i32> {
        let ctx = downcast(context)?;
        let rx = ctx.exit_rx.lock().await.take();
        match rx {
            Some(rx) => rx
                .await
                .map_err(|_| Error::new(ErrorKind::LauncherFailure, "mock process dropped without exiting")),
            None => Err(Error::new(ErrorKind::InvalidState, "already waited on this context")),
        }
    }

    async fn measure(&self, context: &dyn ActivationContext) -> Result<Measurement> {
        downcast(context)?;
        Ok(Measurement {
            cpu_percent: 1.5,
            memory_bytes: 1024 * 1024,
        })
    }

    async fn reconfigure(
        &self,
        context: &dyn ActivationContext,
        _limits: Option<&ResourceLimits>,
        _tls: Option<&TlsDescriptor>,
    ) -> Result<()> {
        downcast(context)?;
        Ok(())
    }
}

fn downcast(context: &dyn ActivationContext) -> Result<&MockActivationContext> {
    context
        .as_any()
        .downcast_ref::<MockActivationContext>()
        .ok_or_else(|| Error::new(ErrorKind::LauncherFailure, "activation context type mismatch"))
}
