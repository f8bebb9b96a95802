//! CLI surface (spec §6.4). Flag parsing itself is in scope (`clap`
//! matches the teacher's `sup` crate dependency); what each flag
//! *triggers* — service-manager registration, hidden child windows — is
//! the out-of-scope collaborator named in spec §1.

use std::path::PathBuf;

use clap::Parser;

/// The reserved "unhandled exception" terminator (spec §6.4); also used
/// by `fabric_core::fatal_invariant` for asserted invariant violations
/// (spec §7).
pub const UNHANDLED_EXCEPTION_EXIT_CODE: i32 = 3;

#[derive(Debug, Parser)]
#[clap(name = "fabrichostd", about = "Node-local process activation and supervision host")]
pub struct Cli {
    /// Run as an OS-registered system service.
    #[clap(long = "service", short = 's')]
    pub service: bool,

    /// Run attached to the foreground console instead.
    #[clap(long = "console", short = 'c')]
    pub console: bool,

    /// Launch hosted/app child processes with their windows hidden.
    #[clap(long = "activatehidden")]
    pub activate_hidden: bool,

    /// Bypass first-time cluster setup before opening.
    #[clap(long = "skipfabricsetup")]
    pub skip_fabric_setup: bool,

    /// Register this binary with the OS service manager, then exit.
    #[clap(long = "install", short = 'i')]
    pub install: bool,

    /// Remove this binary's OS service manager registration, then exit.
    #[clap(long = "uninstall", short = 'u')]
    pub uninstall: bool,

    /// Path to the declared-configuration document (spec §6.3).
    #[clap(long = "config", default_value = "fabrichost.toml")]
    pub config_path: PathBuf,

    /// Path of the Unix domain socket the IPC transport listens on.
    #[clap(long = "socket", default_value = "/run/fabrichostd.sock")]
    pub socket_path: PathBuf,
}

impl Cli {
    /// `--install`/`--uninstall` are one-shot actions that never reach
    /// `Host::open`; `--service` and `--console` both do, differing only
    /// in whether stdio is attached (spec §6.4's two run modes).
    pub fn is_registration_action(&self) -> bool {
        self.install || self.uninstall
    }
}
