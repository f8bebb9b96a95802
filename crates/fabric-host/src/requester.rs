//! Requester registry (spec §4.5): tracks live IPC clients, watches their
//! process handles, and fans termination into bulk removal of their app
//! services — the primary mechanism preventing orphaned child processes
//! after a runtime-node crash.

use std::collections::HashMap;
use std::sync::Arc;

use fabric_core::error::Error;
use fabric_core::signal::{self, Pid};
use fabric_core::Result;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration};

pub struct RequesterRecord {
    pub requester_id: String,
    pub process_id: Pid,
    pub node_id: String,
    pub callback_address: String,
    watch: JoinHandle<()>,
}

impl Drop for RequesterRecord {
    fn drop(&mut self) {
        self.watch.abort();
    }
}

/// Called once a requester's watched process has died, so the owner can
/// remove and tear down every app service keyed by that requester.
#[async_trait::async_trait]
pub trait RequesterDeathHandler: Send + Sync {
    async fn on_requester_died(&self, requester_id: &str);
}

#[derive(Default)]
pub struct RequesterRegistry {
    requesters: RwLock<HashMap<String, RequesterRecord>>,
}

impl RequesterRegistry {
    pub fn new() -> Self {
        RequesterRegistry::default()
    }

    /// Idempotent unregister; double-register by the same requester-id is
    /// rejected with `AlreadyExists` (spec §4.5).
    pub async fn register(
        &self,
        requester_id: impl Into<String>,
        process_id: Pid,
        node_id: impl Into<String>,
        callback_address: impl Into<String>,
        death_handler: Arc<dyn RequesterDeathHandler>,
    ) -> Result<()> {
        let requester_id = requester_id.into();
        let mut requesters = self.requesters.write().await;
        if requesters.contains_key(&requester_id) {
            return Err(Error::already_exists(format!(
                "requester {} is already registered",
                requester_id
            )));
        }
        let watched_id = requester_id.clone();
        let watch = tokio::spawn(async move {
            watch_process(process_id, watched_id, death_handler).await;
        });
        requesters.insert(
            requester_id.clone(),
            RequesterRecord {
                requester_id,
                process_id,
                node_id: node_id.into(),
                callback_address: callback_address.into(),
                watch,
            },
        );
        Ok(())
    }

    pub async fn unregister(&self, requester_id: &str) -> Result<()> {
        self.requesters.write().await.remove(requester_id);
        Ok(())
    }

    pub async fn get(&self, requester_id: &str) -> Option<(Pid, String, String)> {
        self.requesters
            .read()
            .await
            .get(requester_id)
            .map(|r| (r.process_id, r.node_id.clone(), r.callback_address.clone()))
    }

    pub async fn len(&self) -> usize {
        self.requesters.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.requesters.read().await.is_empty()
    }

    pub async fn close(&self) {
        self.requesters.write().await.clear();
    }
}

/// Poll the requester's OS process until it's gone, then invoke the death
/// handler. A poll loop is the portable analogue of the teacher's
/// `try_wait`-driven reap loop; it is not this host's own child (the
/// requester is the runtime peer, not something we spawned), so we can
/// only observe liveness rather than wait on it directly.
async fn watch_process(pid: Pid, requester_id: String, handler: Arc<dyn RequesterDeathHandler>) {
    let mut ticker = interval(Duration::from_millis(500));
    loop {
        ticker.tick().await;
        if !signal::is_alive(pid) {
            log::info!("requester {} (pid {}) is gone; reclaiming its app services", requester_id, pid);
            handler.on_requester_died(&requester_id).await;
            return;
        }
    }
}
