//! Restart / node-disable manager (spec §4.9). Grounded in
//! `examples/original_source/src/prod/src/Hosting2/FabricRestartManager.h`:
//! on shutdown it posts a disable-node request to the cluster layer and
//! blocks close until an enable/disable confirmation arrives or
//! `node_disable_wait` elapses, reporting progress periodically so the
//! surrounding service-controller does not kill the process while waiting
//! (the source's `StartPollingAsync`/`Run` loop, ported to a single
//! `tokio::select!` instead of a dedicated polling thread).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fabric_core::{Error, Result};
use tokio::time::interval;

/// The cluster's replication/consensus layer is explicitly out of scope
/// (spec §1); this is the narrow request/confirm surface the restart
/// manager needs from it.
#[async_trait]
pub trait ClusterLayerClient: Send + Sync {
    async fn disable_node(&self) -> Result<()>;
    async fn enable_node(&self) -> Result<()>;
}

/// Used when `enable_restart_management` is off, or in tests: confirms
/// immediately, as if the cluster layer always agrees right away.
pub struct ImmediateClusterLayerClient;

#[async_trait]
impl ClusterLayerClient for ImmediateClusterLayerClient {
    async fn disable_node(&self) -> Result<()> {
        Ok(())
    }

    async fn enable_node(&self) -> Result<()> {
        Ok(())
    }
}

/// The OS service-manager registration itself is out of scope (spec §1,
/// §6.4); this is only the narrow "I'm still alive, don't kill me"
/// checkpoint a service controller needs during a long wait.
#[async_trait]
pub trait ServiceController: Send + Sync {
    async fn report_progress(&self);
}

pub struct NullServiceController;

#[async_trait]
impl ServiceController for NullServiceController {
    async fn report_progress(&self) {}
}

pub struct RestartManager {
    cluster: Arc<dyn ClusterLayerClient>,
    controller: Arc<dyn ServiceController>,
    node_disable_wait: Duration,
}

impl RestartManager {
    pub fn new(
        cluster: Arc<dyn ClusterLayerClient>,
        controller: Arc<dyn ServiceController>,
        node_disable_wait: Duration,
    ) -> Self {
        RestartManager { cluster, controller, node_disable_wait }
    }

    /// Cooperative draining of external traffic prior to local shutdown
    /// (spec glossary "node disable"). Bounded by `node_disable_wait`;
    /// reports progress every 5s while waiting so an OS service-manager
    /// watchdog doesn't fire.
    pub async fn disable_node(&self) -> Result<()> {
        let progress_reporter = async {
            let mut ticker = interval(Duration::from_secs(5));
            loop {
                ticker.tick().await;
                self.controller.report_progress().await;
            }
        };

        tokio::select! {
            result = self.cluster.disable_node() => result,
            _ = tokio::time::sleep(self.node_disable_wait) => {
                Err(Error::timeout("node-disable confirmation did not arrive within node_disable_wait"))
            }
            _ = progress_reporter => {
                unreachable!("progress reporter never completes on its own")
            }
        }
    }

    pub async fn enable_node(&self) -> Result<()> {
        self.cluster.enable_node().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowCluster {
        delay: Duration,
    }

    #[async_trait]
    impl ClusterLayerClient for SlowCluster {
        async fn disable_node(&self) -> Result<()> {
            tokio::time::sleep(self.delay).await;
            Ok(())
        }

        async fn enable_node(&self) -> Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingController {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ServiceController for CountingController {
        async fn report_progress(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_cluster_never_confirms() {
        let manager = RestartManager::new(
            Arc::new(SlowCluster { delay: Duration::from_secs(3600) }),
            Arc::new(NullServiceController),
            Duration::from_secs(10),
        );
        let result = manager.disable_node().await;
        assert_eq!(result.unwrap_err().kind(), fabric_core::ErrorKind::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_when_cluster_confirms_in_time() {
        let manager = RestartManager::new(
            Arc::new(SlowCluster { delay: Duration::from_secs(1) }),
            Arc::new(NullServiceController),
            Duration::from_secs(30),
        );
        assert!(manager.disable_node().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn reports_progress_while_waiting_on_a_slow_cluster() {
        let controller = Arc::new(CountingController::default());
        let manager = RestartManager::new(
            Arc::new(SlowCluster { delay: Duration::from_secs(17) }),
            Arc::clone(&controller) as Arc<dyn ServiceController>,
            Duration::from_secs(30),
        );
        assert!(manager.disable_node().await.is_ok());
        assert!(controller.calls.load(Ordering::SeqCst) >= 3);
    }
}
