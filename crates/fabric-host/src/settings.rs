//! Settings watcher (spec §4.7): subscribes to configuration-file
//! changes, diffs the declared service set against the running hosted
//! map, and issues add/update/stop operations. Grounded in the teacher's
//! `sup::manager::spec_watcher` (`notify`-crate filesystem watch feeding a
//! reconciliation pass), generalized from "one spec file per service" to
//! "one declaration document naming every hosted service".
//!
//! Holds no locks across the delegation to supervisors (spec §4.7); each
//! supervisor call below takes its own per-entry lock internally.

use std::path::{Path, PathBuf};

use fabric_protocol::types::{EndpointDescriptor, ProcessDescription};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config;
use crate::registry::Registry;
use crate::supervisor::HostedSupervisor;
use std::sync::Arc;

/// Only the resource-governance limits and the endpoint's TLS thumbprint
/// are updatable in place; the security principal, executable, arguments,
/// environment, working directory, container shape, and the endpoint's
/// port/protocol all force a stop-then-start (spec §4.3, §9 open question
/// — resolved here rather than mimicking the source's accumulated
/// predicate verbatim). A TLS-only change on an otherwise-unchanged
/// endpoint still qualifies, which is the whole point of carrying TLS
/// separately from port/protocol here.
pub fn updatable_in_place(
    current: &ProcessDescription,
    new: &ProcessDescription,
    current_endpoint: Option<&EndpointDescriptor>,
    new_endpoint: Option<&EndpointDescriptor>,
) -> bool {
    let process_unchanged = current.executable == new.executable
        && current.arguments == new.arguments
        && current.working_directory == new.working_directory
        && current.environment == new.environment
        && current.console_ctrl == new.console_ctrl
        && current.runas_id == new.runas_id
        && current.container == new.container;
    let endpoint_shape_unchanged = match (current_endpoint, new_endpoint) {
        (None, None) => true,
        (Some(a), Some(b)) => a.port == b.port && a.protocol == b.protocol,
        _ => false,
    };
    process_unchanged && endpoint_shape_unchanged
}

/// Reconcile the running hosted map against a freshly-loaded declaration
/// (spec §4.7 steps 1-4). Idempotent: calling this twice with the same
/// declaration issues no further activate/deactivate actions, since step
/// 4 only acts when the launch descriptor actually differs.
pub async fn reconcile(declaration: &config::Declaration, registry: &Registry, hosted: &Arc<HostedSupervisor>) {
    let declared_lower: std::collections::HashSet<String> =
        declaration.services.iter().map(|s| s.service_name.to_lowercase()).collect();

    for name in registry.hosted_names().await {
        if !declared_lower.contains(&name.to_lowercase()) {
            if let Err(err) = hosted.deactivate_hosted_service(&name).await {
                log::warn!("settings reconcile: failed to stop removed service {}: {}", name, err);
            }
            registry.remove_hosted(&name).await;
        }
    }

    for params in &declaration.services {
        match registry.get_hosted(&params.service_name).await {
            None => {
                if let Err(err) = hosted.activate_hosted_service(params.clone()).await {
                    log::warn!("settings reconcile: failed to activate new service {}: {}", params.service_name, err);
                }
            }
            Some(entry) => {
                if entry.descriptor() != params.process || entry.endpoint() != params.endpoint {
                    if let Err(err) = hosted.update(params.clone()).await {
                        log::warn!("settings reconcile: failed to update service {}: {}", params.service_name, err);
                    }
                }
            }
        }
    }
}

/// Owns the filesystem watch for as long as the host is open; dropping it
/// tears down the watch thread.
pub struct SettingsWatcher {
    _watcher: RecommendedWatcher,
}

impl SettingsWatcher {
    /// Registers a callback with the configuration source for the
    /// declaration file and spawns a task that reconciles on every change
    /// (spec §4.7).
    pub fn spawn(path: PathBuf, registry: Arc<Registry>, hosted: Arc<HostedSupervisor>) -> notify::Result<Self> {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel::<notify::Result<Event>>();
        let mut watcher = notify::recommended_watcher(move |event| {
            let _ = events_tx.send(event);
        })?;
        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                match event {
                    Ok(event) if event.kind.is_modify() || event.kind.is_create() => {
                        reconcile_from_disk(&path, &registry, &hosted).await;
                    }
                    Ok(_) => {}
                    Err(err) => log::warn!("settings watch error: {}", err),
                }
            }
        });

        Ok(SettingsWatcher { _watcher: watcher })
    }
}

async fn reconcile_from_disk(path: &Path, registry: &Registry, hosted: &Arc<HostedSupervisor>) {
    match config::load(path) {
        Ok(declaration) => reconcile(&declaration, registry, hosted).await,
        Err(err) => log::warn!("settings reconcile: failed to reload {}: {}", path.display(), err),
    }
}
