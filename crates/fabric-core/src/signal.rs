//! Process-signal helpers, grounded in the teacher's
//! `launcher/src/sys/unix/service.rs` `pid_to_signal`/`kill` logic.

#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid as NixPid;

use crate::error::{Error, ErrorKind, Result};

pub type Pid = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TermSignal {
    /// Friendly request to exit.
    Term,
    /// Unconditional kill.
    Kill,
}

/// Every child is launched in its own process group (see the launcher
/// collaborator) so that signalling it can never also hit this host.
/// When `pid` is itself a process group leader, signal the negative pid to
/// reach the whole group and avoid orphaning grandchildren.
#[cfg(unix)]
pub fn signal_process(pid: Pid, signal: TermSignal) -> Result<()> {
    let target = pid_to_signal(pid);
    let sig = match signal {
        TermSignal::Term => Signal::SIGTERM,
        TermSignal::Kill => Signal::SIGKILL,
    };
    signal::kill(NixPid::from_raw(target), sig).map_err(|errno| {
        Error::wrap(
            ErrorKind::LauncherFailure,
            format!("failed to signal pid {}", pid),
            errno,
        )
    })
}

#[cfg(unix)]
fn pid_to_signal(pid: Pid) -> Pid {
    match nix::unistd::getpgid(Some(NixPid::from_raw(pid))) {
        Ok(pgid) if pgid.as_raw() == pid => {
            log::debug!(
                "pid {} is its own process group leader; signalling the group",
                pid
            );
            -pid
        }
        _ => pid,
    }
}

#[cfg(unix)]
pub fn is_alive(pid: Pid) -> bool {
    signal::kill(NixPid::from_raw(pid), None).is_ok()
}

#[cfg(not(unix))]
pub fn signal_process(_pid: Pid, _signal: TermSignal) -> Result<()> {
    Err(Error::new(
        ErrorKind::LauncherFailure,
        "process signalling is only implemented for unix in this build",
    ))
}

#[cfg(not(unix))]
pub fn is_alive(_pid: Pid) -> bool {
    false
}
