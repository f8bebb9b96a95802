//! Top-level host lifecycle (spec §4.8): sequences subcomponent init,
//! drives the graceful-shutdown drain, and tears everything down on
//! close or abort. Grounded in the teacher's `sup::manager::Manager`
//! open/run/shutdown shape, generalized to this spec's Open/Close/Abort
//! triad plus the node-disable drain step `sup` has no equivalent of.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fabric_core::deadline::Deadline;
use fabric_core::error::ErrorKind;
use fabric_core::{Error, Result};
use tokio::task::JoinHandle;

use crate::config::{self, Declaration};
use crate::dispatcher::{CollaboratorHandler, Dispatcher, NoCollaborators};
use crate::launcher::Launcher;
use crate::registry::Registry;
use crate::requester::RequesterRegistry;
use crate::restart::{ClusterLayerClient, ImmediateClusterLayerClient, NullServiceController, RestartManager, ServiceController};
use crate::settings::SettingsWatcher;
use crate::supervisor::{AppSupervisor, HostedSupervisor};
use crate::transport::Transport;

/// Everything `Host::open` needs that isn't derivable from the
/// configuration document itself: the collaborators named out-of-scope by
/// spec §1 that this process must still be handed a concrete instance of.
pub struct HostDeps<T> {
    pub transport: Arc<T>,
    pub launcher: Arc<dyn Launcher>,
    pub cluster: Arc<dyn ClusterLayerClient>,
    pub service_controller: Arc<dyn ServiceController>,
    pub collaborators: Arc<dyn CollaboratorHandler>,
}

impl<T> HostDeps<T> {
    pub fn new(transport: Arc<T>, launcher: Arc<dyn Launcher>) -> Self {
        HostDeps {
            transport,
            launcher,
            cluster: Arc::new(ImmediateClusterLayerClient),
            service_controller: Arc::new(NullServiceController),
            collaborators: Arc::new(NoCollaborators),
        }
    }
}

/// Whether `Host::close` should drain external traffic via the restart
/// manager before tearing children down (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainMode {
    Drain,
    Skip,
}

pub struct Host<T: Transport + 'static> {
    registry: Arc<Registry>,
    hosted: Arc<HostedSupervisor>,
    app: Arc<AppSupervisor>,
    requesters: Arc<RequesterRegistry>,
    dispatcher: Arc<Dispatcher<T>>,
    dispatcher_task: JoinHandle<()>,
    restart: RestartManager,
    settings_watcher: Option<SettingsWatcher>,
    settings: config::HostSettings,
    config_path: Option<PathBuf>,
}

impl<T: Transport + 'static> Host<T> {
    /// Initialize IPC transport (already listening by the time `deps` is
    /// constructed, so late-binding clients are accepted), create both
    /// supervisors, register the dispatcher, then start hosted services.
    /// Any subcomponent failure aborts everything already started and
    /// returns a typed error (spec §4.8).
    pub async fn open(declaration: Declaration, config_path: Option<PathBuf>, deps: HostDeps<T>, timeout: Duration) -> Result<Self> {
        let deadline = Deadline::after(timeout);
        let registry = Arc::new(Registry::new());
        let backoff = declaration.host.backoff_config();

        let hosted = Arc::new(HostedSupervisor::new(
            Arc::clone(&registry),
            Arc::clone(&deps.launcher),
            backoff,
            declaration.host.start_timeout(),
            declaration.host.stop_timeout(),
        ));
        let notifications = Arc::new(crate::notify::TransportSink::new(Arc::clone(&deps.transport)));
        let app = Arc::new(AppSupervisor::new(
            Arc::clone(&registry),
            Arc::clone(&deps.launcher),
            notifications,
            declaration.host.stop_timeout(),
        ));
        let requesters = Arc::new(RequesterRegistry::new());

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&deps.transport),
            Arc::clone(&hosted),
            Arc::clone(&app),
            Arc::clone(&requesters),
            deps.collaborators,
        ));
        let dispatcher_task = tokio::spawn({
            let dispatcher = Arc::clone(&dispatcher);
            async move { dispatcher.run().await }
        });

        if let Err(err) = hosted.open(declaration.services.clone()).await {
            dispatcher_task.abort();
            hosted.close().await;
            return Err(err);
        }

        if deadline.is_expired() {
            dispatcher_task.abort();
            hosted.close().await;
            return Err(Error::timeout("host open exceeded its deadline"));
        }

        let settings_watcher = match &config_path {
            Some(path) => match SettingsWatcher::spawn(path.clone(), Arc::clone(&registry), Arc::clone(&hosted)) {
                Ok(watcher) => Some(watcher),
                Err(err) => {
                    log::warn!("failed to start settings watcher for {}: {}", path.display(), err);
                    None
                }
            },
            None => None,
        };

        let restart = RestartManager::new(deps.cluster, deps.service_controller, declaration.host.node_disable_wait());

        Ok(Host {
            registry,
            hosted,
            app,
            requesters,
            dispatcher,
            dispatcher_task,
            restart,
            settings_watcher,
            settings: declaration.host,
            config_path,
        })
    }

    /// If `mode` is `Drain`, request node-disable first (bounded by
    /// `node_disable_wait`); then tear down supervisors app-services
    /// first, then hosted; then unregister IPC handlers; then close the
    /// transport (spec §4.8).
    pub async fn close(mut self, mode: DrainMode, timeout: Duration) {
        if mode == DrainMode::Drain && self.settings.enable_restart_management {
            if let Err(err) = self.restart.disable_node().await {
                log::warn!("node-disable drain did not complete cleanly: {}", err);
            } else {
                self.dispatcher.broadcast_node_disabled().await;
            }
        }

        self.registry.close();
        self.requesters.close().await;
        self.app.close(timeout).await;
        self.hosted.close().await;

        self.settings_watcher.take();
        self.dispatcher_task.abort();
    }

    /// Skip drain, force-terminate every managed child, close transport
    /// (spec §4.8).
    pub async fn abort(mut self) {
        self.registry.close();
        let launcher = self.app.launcher();
        for entry in self.registry.all_app_entries().await {
            if let Err(err) = entry.abort(launcher.as_ref()).await {
                log::warn!("error aborting app entry {}/{}: {}", entry.requester_id, entry.instance_id, err);
            }
        }
        for entry in self.registry.all_hosted().await {
            if let Err(err) = entry.abort(launcher.as_ref()).await {
                log::warn!("error aborting hosted entry {}: {}", entry.name, err);
            }
        }
        self.settings_watcher.take();
        self.dispatcher_task.abort();
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn hosted(&self) -> &Arc<HostedSupervisor> {
        &self.hosted
    }

    pub fn app(&self) -> &Arc<AppSupervisor> {
        &self.app
    }

    pub fn config_path(&self) -> Option<&PathBuf> {
        self.config_path.as_ref()
    }
}

/// `ErrorKind::Closed` is returned for any request reaching a registry
/// that has already begun shutdown (spec §3 "closed flag").
pub fn ensure_open(registry: &Registry) -> Result<()> {
    if registry.is_closed() {
        return Err(Error::new(ErrorKind::Closed, "host is closing; no new work is accepted"));
    }
    Ok(())
}
