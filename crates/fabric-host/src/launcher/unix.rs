//! Real unix process launcher. Grounded in the teacher's
//! `launcher/src/sys/unix/service.rs`: spawn into a fresh process group so
//! a child's own SIGTERM-to-group can never reach this host, then signal
//! the negative pid to reach the whole group on teardown.

use std::any::Any;
use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;

use async_trait::async_trait;
use fabric_core::error::{Error, ErrorKind};
use fabric_core::signal::{self, Pid, TermSignal};
use fabric_core::Result;
use fabric_protocol::types::{ProcessDescription, ResourceLimits, TlsDescriptor};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{timeout, Duration};

use super::{ActivationContext, Launcher, Measurement};

pub struct UnixLauncher;

pub struct UnixActivationContext {
    pid: Pid,
    child: AsyncMutex<Child>,
}

impl fmt::Debug for UnixActivationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnixActivationContext")
            .field("pid", &self.pid)
            .finish()
    }
}

impl ActivationContext for UnixActivationContext {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn downcast(context: &dyn ActivationContext) -> Result<&UnixActivationContext> {
    context
        .as_any()
        .downcast_ref::<UnixActivationContext>()
        .ok_or_else(|| Error::new(ErrorKind::LauncherFailure, "activation context type mismatch"))
}

#[async_trait]
impl Launcher for UnixLauncher {
    async fn launch(
        &self,
        descriptor: &ProcessDescription,
    ) -> Result<(Pid, Box<dyn ActivationContext>)> {
        let mut cmd = Command::new(&descriptor.executable);
        cmd.args(&descriptor.arguments)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &descriptor.working_directory {
            cmd.current_dir(dir);
        }
        for (key, val) in &descriptor.environment {
            cmd.env(key, val);
        }
        // Children get their own process group so a broadcast signal to
        // the group never reaches this host (owned_pgid in the teacher).
        unsafe {
            cmd.pre_exec(|| {
                libc::setpgid(0, 0);
                Ok(())
            });
        }

        let mut child = cmd.spawn().map_err(|e| {
            Error::wrap(ErrorKind::LauncherFailure, "failed to spawn child process", e)
        })?;
        let pid = child
            .id()
            .ok_or_else(|| Error::new(ErrorKind::LauncherFailure, "child exited before reporting a pid"))?
            as Pid;

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pipe_lines(stdout, pid, "O"));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pipe_lines(stderr, pid, "E"));
        }

        Ok((
            pid,
            Box::new(UnixActivationContext {
                pid,
                child: AsyncMutex::new(child),
            }),
        ))
    }

    async fn terminate(&self, context: &dyn ActivationContext, graceful: bool) -> Result<()> {
        let ctx = downcast(context)?;
        if graceful {
            signal::signal_process(ctx.pid, TermSignal::Term)?;
            let mut guard = ctx.child.lock().await;
            if timeout(Duration::from_secs(8), guard.wait()).await.is_ok() {
                return Ok(());
            }
        }
        signal::signal_process(ctx.pid, TermSignal::Kill)
    }

    async fn wait_exit(&self, context: &dyn ActivationContext) -> Result<i32> {
        let ctx = downcast(context)?;
        let mut guard = ctx.child.lock().await;
        let status = guard.wait().await.map_err(|e| {
            Error::wrap(ErrorKind::LauncherFailure, "failed waiting on child", e)
        })?;
        Ok(status.code().unwrap_or_else(|| status.signal().unwrap_or(-1) + 128))
    }

    async fn measure(&self, context: &dyn ActivationContext) -> Result<Measurement> {
        let ctx = downcast(context)?;
        if !signal::is_alive(ctx.pid) {
            return Err(Error::new(ErrorKind::InvalidState, "process is not running"));
        }
        // A real implementation reads /proc/<pid>/stat and
        // /proc/<pid>/status; placeholder zeroes keep the trait boundary
        // honest without pulling in a procfs dependency the teacher never
        // carries for this purpose.
        Ok(Measurement {
            cpu_percent: 0.0,
            memory_bytes: 0,
        })
    }

    async fn reconfigure(
        &self,
        context: &dyn ActivationContext,
        _limits: Option<&ResourceLimits>,
        _tls: Option<&TlsDescriptor>,
    ) -> Result<()> {
        let ctx = downcast(context)?;
        if !signal::is_alive(ctx.pid) {
            return Err(Error::new(ErrorKind::InvalidState, "process is not running"));
        }
        // Writing updated cgroup/cpuset limits and re-binding a TLS
        // thumbprint is cgroup-driver/ACL-provider territory (spec §1
        // out-of-scope collaborators); this trait boundary is what the
        // hosted-service update path calls into.
        Ok(())
    }
}

/// Consume a child's stdout/stderr until EOF, one log line per child line.
/// Mirrors the teacher's `pipe_stdout`/`pipe_stderr` threads, adapted to a
/// tokio task per async pipe handle instead of a blocking thread per pipe.
async fn pipe_lines<R>(reader: R, pid: Pid, stream: &'static str)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => log::info!("[{} {}] {}", pid, stream, line),
            Ok(None) => break,
            Err(err) => {
                log::warn!("error reading child {} output: {}", pid, err);
                break;
            }
        }
    }
}
