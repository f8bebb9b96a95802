//! Hosted-service supervisor (spec §4.3): owns declared long-lived
//! services, drives Start/Stop/Update, installs an exit handler that
//! either reschedules or disables.

use std::sync::Arc;
use std::time::Duration;

use fabric_core::deadline::Deadline;
use fabric_core::error::Error;
use fabric_core::Result;
use fabric_protocol::types::HostedServiceParams;
use futures::future::join_all;

use crate::entry::state::HostedState;
use crate::entry::HostedEntry;
use crate::launcher::Launcher;
use crate::registry::Registry;
use crate::stats::{compute_backoff, BackoffConfig, BackoffDecision};

pub struct HostedSupervisor {
    registry: Arc<Registry>,
    launcher: Arc<dyn Launcher>,
    backoff: BackoffConfig,
    start_timeout: Duration,
    stop_timeout: Duration,
}

impl HostedSupervisor {
    pub fn new(
        registry: Arc<Registry>,
        launcher: Arc<dyn Launcher>,
        backoff: BackoffConfig,
        start_timeout: Duration,
        stop_timeout: Duration,
    ) -> Self {
        HostedSupervisor {
            registry,
            launcher,
            backoff,
            start_timeout,
            stop_timeout,
        }
    }

    /// Enumerate the declared services and schedule each through
    /// `activate`, in parallel (spec §4.3 "on open"). Takes `Arc<Self>` so
    /// each activation can spawn its own long-lived exit watcher.
    pub async fn open(self: &Arc<Self>, declared: Vec<HostedServiceParams>) -> Result<()> {
        let activations = declared.into_iter().map(|params| {
            let this = Arc::clone(self);
            let name = params.service_name.clone();
            async move {
                if let Err(err) = this.activate_hosted_service(params).await {
                    log::warn!("failed to activate declared hosted service {}: {}", name, err);
                }
            }
        });
        join_all(activations).await;
        Ok(())
    }

    /// Insert-or-noop, then Start. Installs the exit-watch task that
    /// drives the restart/backoff scheduler once the process is live.
    pub async fn activate_hosted_service(self: &Arc<Self>, params: HostedServiceParams) -> Result<()> {
        if self.registry.get_hosted(&params.service_name).await.is_some() {
            return Ok(());
        }
        let entry = Arc::new(HostedEntry::new(
            params.service_name.clone(),
            params.process,
            params.endpoint,
        ));
        self.registry.insert_hosted(Arc::clone(&entry)).await?;
        self.start_and_watch(entry).await
    }

    async fn start_and_watch(self: &Arc<Self>, entry: Arc<HostedEntry>) -> Result<()> {
        entry
            .activate(self.launcher.as_ref(), Deadline::after(self.start_timeout))
            .await?;
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.watch_until_exit(entry).await;
        });
        Ok(())
    }

    /// Waits on the launcher's exit notification for one entry, then
    /// either reschedules it (due-time from the backoff formula) or, once
    /// the failure budget is exceeded, marks it disabled and stops
    /// watching (spec §4.3, §4.2). Never runs concurrently with an
    /// in-flight activate/deactivate on the same entry, since both go
    /// through the entry's own lock.
    async fn watch_until_exit(self: Arc<Self>, entry: Arc<HostedEntry>) {
        loop {
            let exit_code = match entry.await_exit(self.launcher.as_ref()).await {
                Some(code) => code,
                None => return,
            };
            entry.on_process_terminated(exit_code).await;

            if entry.is_disabled() {
                return;
            }

            let decision = {
                let mut stats = entry.stats.lock().unwrap();
                compute_backoff(&mut stats, &self.backoff)
            };
            match decision {
                BackoffDecision::Disable => {
                    entry.disable();
                    log::warn!("hosted service {} exceeded its failure budget; disabling", entry.name);
                    return;
                }
                BackoffDecision::RetryAfter(delay) => {
                    tokio::time::sleep(delay).await;
                    if self.registry.get_hosted(&entry.name).await.is_none() {
                        // removed by a settings-change while we were sleeping
                        return;
                    }
                    entry.reset_for_restart().await;
                    if let Err(err) = entry
                        .activate(self.launcher.as_ref(), Deadline::after(self.start_timeout))
                        .await
                    {
                        log::warn!("restart of hosted service {} failed: {}", entry.name, err);
                    }
                }
            }
        }
    }

    pub async fn deactivate_hosted_service(&self, name: &str) -> Result<()> {
        let entry = self
            .registry
            .get_hosted(name)
            .await
            .ok_or_else(|| Error::not_found(format!("hosted service {} not found", name)))?;
        entry
            .deactivate(self.launcher.as_ref(), true, Deadline::after(self.stop_timeout))
            .await
    }

    /// In-place reconfigure when only resource-governance limits or TLS
    /// thumbprint changed and the security principal is unchanged;
    /// otherwise stop-then-start (spec §4.3, open question resolved in
    /// DESIGN.md).
    pub async fn update(self: &Arc<Self>, params: HostedServiceParams) -> Result<()> {
        let entry = self
            .registry
            .get_hosted(&params.service_name)
            .await
            .ok_or_else(|| Error::not_found(format!("hosted service {} not found", params.service_name)))?;

        if crate::settings::updatable_in_place(
            &entry.descriptor(),
            &params.process,
            entry.endpoint().as_ref(),
            params.endpoint.as_ref(),
        ) {
            entry
                .update_in_place(
                    self.launcher.as_ref(),
                    params.process,
                    params.endpoint,
                    Deadline::after(self.stop_timeout),
                )
                .await
        } else {
            self.deactivate_hosted_service(&params.service_name).await?;
            self.registry.remove_hosted(&params.service_name).await;
            self.activate_hosted_service(params).await
        }
    }

    /// Deactivate every entry in parallel, bounded by `stop_timeout`
    /// (spec §4.3 "on close").
    pub async fn close(&self) {
        let entries = self.registry.all_hosted().await;
        let stop_timeout = self.stop_timeout;
        let launcher = Arc::clone(&self.launcher);
        let shutdowns = entries.into_iter().map(|entry| {
            let launcher = Arc::clone(&launcher);
            async move {
                if entry.state().await == HostedState::Initialized {
                    if let Err(err) = entry.deactivate(launcher.as_ref(), true, Deadline::after(stop_timeout)).await {
                        log::warn!("error stopping hosted service {} during close: {}", entry.name, err);
                    }
                }
            }
        });
        join_all(shutdowns).await;
    }
}
