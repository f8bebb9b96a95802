//! Application-service supervisor (spec §4.4): handles activate/deactivate
//! /terminate/get-container-info requests keyed by `(requester-id,
//! app-service-id)`, and publishes an application-service-terminated
//! notification to the requester on exit.

use std::sync::Arc;
use std::time::Duration;

use fabric_core::deadline::Deadline;
use fabric_core::error::Error;
use fabric_core::signal::Pid;
use fabric_core::Result;
use fabric_protocol::types::ProcessDescription;
use fabric_protocol::Notification;
use futures::future::join_all;

use crate::entry::AppEntry;
use crate::launcher::{Launcher, Measurement};
use crate::notify::NotificationSink;
use crate::registry::Registry;

pub struct AppSupervisor {
    registry: Arc<Registry>,
    launcher: Arc<dyn Launcher>,
    notifications: Arc<dyn NotificationSink>,
    default_deactivate_timeout: Duration,
}

impl AppSupervisor {
    pub fn new(
        registry: Arc<Registry>,
        launcher: Arc<dyn Launcher>,
        notifications: Arc<dyn NotificationSink>,
        default_deactivate_timeout: Duration,
    ) -> Self {
        AppSupervisor {
            registry,
            launcher,
            notifications,
            default_deactivate_timeout,
        }
    }

    pub async fn activate_process(
        self: &Arc<Self>,
        requester_id: &str,
        app_service_id: &str,
        process: ProcessDescription,
        timeout: Duration,
    ) -> Result<Pid> {
        let entry = Arc::new(AppEntry::new(requester_id, app_service_id, process, None));
        self.registry.insert_app(Arc::clone(&entry)).await?;
        let pid = match entry.activate(self.launcher.as_ref(), Deadline::after(timeout)).await {
            Ok(pid) => pid,
            Err(err) => {
                self.registry.remove_app(requester_id, app_service_id).await;
                return Err(err);
            }
        };

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.watch_until_exit(entry).await;
        });
        Ok(pid)
    }

    async fn watch_until_exit(self: Arc<Self>, entry: Arc<AppEntry>) {
        let exit_code = match entry.await_exit(self.launcher.as_ref()).await {
            Some(code) => code,
            None => return,
        };
        entry.on_process_terminated(exit_code).await;
        self.registry
            .remove_app(&entry.requester_id, &entry.instance_id)
            .await;
        self.notifications
            .publish(
                &entry.requester_id,
                Notification::ApplicationServiceTerminated {
                    parent_id: entry.requester_id.clone(),
                    app_service_id: entry.instance_id.clone(),
                    exit_code,
                },
            )
            .await;
    }

    /// Deactivating a container root cascades to every live container-child
    /// entry it owns (spec.md:59,119) — this is the normal single-service
    /// `DeactivateProcess` path, not only the bulk teardown
    /// `abort_application_environment` does on full-application removal.
    pub async fn deactivate_process(
        &self,
        requester_id: &str,
        app_service_id: &str,
        graceful: bool,
        timeout: Duration,
    ) -> Result<()> {
        let entry = self
            .registry
            .get_app(requester_id, app_service_id)
            .await
            .ok_or_else(|| Error::not_found(format!("app service {}/{} not found", requester_id, app_service_id)))?;
        let timeout = if timeout.is_zero() { self.default_deactivate_timeout } else { timeout };

        if entry.is_container_root {
            let children = self.registry.app_children_of_container_root(requester_id, app_service_id).await;
            for child in children {
                if let Err(err) = self.deactivate_entry(&child, graceful, timeout).await {
                    log::warn!(
                        "deactivate of container child {}/{} (root {}) failed: {}",
                        requester_id, child.instance_id, app_service_id, err
                    );
                }
            }
        }

        self.deactivate_entry(&entry, graceful, timeout).await
    }

    async fn deactivate_entry(&self, entry: &Arc<AppEntry>, graceful: bool, timeout: Duration) -> Result<()> {
        let result = entry.deactivate(self.launcher.as_ref(), graceful, Deadline::after(timeout)).await;
        if let Err(err) = &result {
            if err.kind() == fabric_core::ErrorKind::Timeout {
                log::warn!(
                    "deactivate of {}/{} timed out; escalating to force-kill",
                    entry.requester_id, entry.instance_id
                );
                if let Err(kill_err) = entry.force_kill(self.launcher.as_ref()).await {
                    log::warn!("force-kill of {}/{} also failed: {}", entry.requester_id, entry.instance_id, kill_err);
                }
            }
        }
        result
    }

    pub async fn terminate_process(&self, requester_id: &str, app_service_id: &str) -> Result<i32> {
        let entry = self
            .registry
            .get_app(requester_id, app_service_id)
            .await
            .ok_or_else(|| Error::not_found(format!("app service {}/{} not found", requester_id, app_service_id)))?;
        entry.deactivate(self.launcher.as_ref(), false, Deadline::after(Duration::from_secs(5))).await?;
        entry.get_process_id().await.or(Ok(0))
    }

    pub async fn measure(&self, requester_id: &str, app_service_id: &str) -> Result<Measurement> {
        let entry = self
            .registry
            .get_app(requester_id, app_service_id)
            .await
            .ok_or_else(|| Error::not_found(format!("app service {}/{} not found", requester_id, app_service_id)))?;
        entry.measure_resource_usage(self.launcher.as_ref()).await
    }

    /// Removes and forcibly tears down every app service owned under an
    /// application (spec §4.4), container roots and children alike: both
    /// are entries keyed under the same requester, so a bulk removal
    /// reaches both without needing the explicit cascade `deactivate_process`
    /// does for a single-service request.
    pub async fn abort_application_environment(&self, requester_id: &str) {
        let entries = self.registry.remove_all_for_requester(requester_id).await;
        let teardowns = entries.into_iter().map(|entry| {
            let launcher = Arc::clone(&self.launcher);
            async move {
                if let Err(err) = entry.abort(launcher.as_ref()).await {
                    log::warn!("error aborting {}/{}: {}", entry.requester_id, entry.instance_id, err);
                }
            }
        });
        join_all(teardowns).await;
    }

    /// Both supervisors share one launcher instance; exposed so
    /// `Host::abort` can drive a forced teardown without constructing a
    /// second handle.
    pub fn launcher(&self) -> Arc<dyn Launcher> {
        Arc::clone(&self.launcher)
    }

    /// Deactivate every live app-service entry; used by `Host::close`.
    pub async fn close(&self, timeout: Duration) {
        let mut entries = Vec::new();
        for requester_id in self.registry.requester_ids().await {
            entries.extend(self.registry.remove_all_for_requester(&requester_id).await);
        }
        let launcher = Arc::clone(&self.launcher);
        let teardowns = entries.into_iter().map(|entry| {
            let launcher = Arc::clone(&launcher);
            async move {
                if let Err(err) = entry.deactivate(launcher.as_ref(), true, Deadline::after(timeout)).await {
                    log::warn!("error stopping app service {}/{} during close: {}", entry.requester_id, entry.instance_id, err);
                }
            }
        });
        join_all(teardowns).await;
    }
}
