//! Entry point: parse CLI flags, load the declared configuration, open
//! the host, and run until asked to shut down. Mirrors the teacher's
//! `sup::main` boot/run/shutdown shape.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use fabric_host::cli::{Cli, UNHANDLED_EXCEPTION_EXIT_CODE};
use fabric_host::config;
use fabric_host::host::{DrainMode, Host, HostDeps};
use fabric_host::launcher::unix::UnixLauncher;
use fabric_host::transport::UnixSocketTransport;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    if cli.is_registration_action() {
        // OS service-manager registration is an out-of-scope collaborator
        // (spec §1, §6.4); this binary only logs the request's intent.
        log::info!(
            "service-manager {} requested; delegate to the platform service-registration collaborator",
            if cli.install { "install" } else { "uninstall" }
        );
        return ExitCode::SUCCESS;
    }

    let declaration = match config::load(&cli.config_path) {
        Ok(d) => d,
        Err(err) => {
            log::error!("failed to load configuration from {}: {}", cli.config_path.display(), err);
            return ExitCode::from(UNHANDLED_EXCEPTION_EXIT_CODE as u8);
        }
    };

    let transport = match UnixSocketTransport::bind(&cli.socket_path).await {
        Ok(t) => t,
        Err(err) => {
            log::error!("failed to bind IPC socket at {}: {}", cli.socket_path.display(), err);
            return ExitCode::from(UNHANDLED_EXCEPTION_EXIT_CODE as u8);
        }
    };

    let deps = HostDeps::new(transport, Arc::new(UnixLauncher));
    let start_timeout = declaration.host.start_timeout();
    let stop_timeout = declaration.host.stop_timeout();

    let host = match Host::open(declaration, Some(cli.config_path.clone()), deps, start_timeout).await {
        Ok(host) => host,
        Err(err) => {
            log::error!("host open failed: {}", err);
            return ExitCode::from(UNHANDLED_EXCEPTION_EXIT_CODE as u8);
        }
    };

    log::info!("fabrichostd open; listening on {}", cli.socket_path.display());

    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("failed to install shutdown signal handler: {}", err);
    }

    log::info!("shutdown requested; draining and closing");
    host.close(DrainMode::Drain, stop_timeout + Duration::from_secs(5)).await;
    ExitCode::SUCCESS
}
