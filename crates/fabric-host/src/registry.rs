//! The two-level registry of supervised entries (spec §3, §4.5).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fabric_core::error::Error;
use fabric_core::Result;
use tokio::sync::RwLock;

use crate::entry::{AppEntry, HostedEntry};

/// `service-name → Entry`, `requester-id → (instance-id → Entry)`, guarded
/// by independent readers-writer locks, plus the `closed` gate that stops
/// new insertions once shutdown begins (spec §3).
#[derive(Default)]
pub struct Registry {
    hosted: RwLock<HashMap<String, Arc<HostedEntry>>>,
    app: RwLock<HashMap<String, HashMap<String, Arc<AppEntry>>>>,
    closed: AtomicBool,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::closed("registry is closed; no new work is accepted"));
        }
        Ok(())
    }

    // --- hosted map (case-insensitive service-name) ---

    pub async fn insert_hosted(&self, entry: Arc<HostedEntry>) -> Result<()> {
        self.check_open()?;
        let key = entry.name.to_lowercase();
        self.hosted.write().await.insert(key, entry);
        Ok(())
    }

    pub async fn get_hosted(&self, name: &str) -> Option<Arc<HostedEntry>> {
        self.hosted.read().await.get(&name.to_lowercase()).cloned()
    }

    pub async fn remove_hosted(&self, name: &str) -> Option<Arc<HostedEntry>> {
        self.hosted.write().await.remove(&name.to_lowercase())
    }

    pub async fn hosted_names(&self) -> Vec<String> {
        self.hosted.read().await.values().map(|e| e.name.clone()).collect()
    }

    pub async fn all_hosted(&self) -> Vec<Arc<HostedEntry>> {
        self.hosted.read().await.values().cloned().collect()
    }

    // --- app map (requester-id x instance-id) ---

    pub async fn insert_app(&self, entry: Arc<AppEntry>) -> Result<()> {
        self.check_open()?;
        let mut map = self.app.write().await;
        let per_requester = map.entry(entry.requester_id.clone()).or_default();
        if per_requester.contains_key(&entry.instance_id) {
            return Err(Error::already_exists(format!(
                "app service {}/{} already registered",
                entry.requester_id, entry.instance_id
            )));
        }
        per_requester.insert(entry.instance_id.clone(), entry);
        Ok(())
    }

    pub async fn get_app(&self, requester_id: &str, instance_id: &str) -> Option<Arc<AppEntry>> {
        self.app
            .read()
            .await
            .get(requester_id)
            .and_then(|m| m.get(instance_id))
            .cloned()
    }

    pub async fn remove_app(&self, requester_id: &str, instance_id: &str) -> Option<Arc<AppEntry>> {
        let mut map = self.app.write().await;
        let removed = map.get_mut(requester_id).and_then(|m| m.remove(instance_id));
        if let Some(per_requester) = map.get(requester_id) {
            if per_requester.is_empty() {
                map.remove(requester_id);
            }
        }
        removed
    }

    /// Bulk removal of every app service owned by a requester — the
    /// mechanism preventing orphaned children after a runtime-node crash
    /// (spec §4.5) and the basis for `abort_application_environment`.
    pub async fn remove_all_for_requester(&self, requester_id: &str) -> Vec<Arc<AppEntry>> {
        self.app
            .write()
            .await
            .remove(requester_id)
            .map(|m| m.into_values().collect())
            .unwrap_or_default()
    }

    /// Every app-service entry under `requester_id` whose container
    /// descriptor names `root_instance_id` as its root (spec.md:59,119:
    /// "deactivating the root deactivates the children"; "container roots
    /// own container children; deactivating a root cascades").
    pub async fn app_children_of_container_root(&self, requester_id: &str, root_instance_id: &str) -> Vec<Arc<AppEntry>> {
        self.app
            .read()
            .await
            .get(requester_id)
            .map(|m| {
                m.values()
                    .filter(|entry| {
                        entry
                            .descriptor
                            .container
                            .as_ref()
                            .and_then(|c| c.root_container_id.as_deref())
                            == Some(root_instance_id)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn app_count_for_requester(&self, requester_id: &str) -> usize {
        self.app.read().await.get(requester_id).map(|m| m.len()).unwrap_or(0)
    }

    pub async fn total_app_count(&self) -> usize {
        self.app.read().await.values().map(|m| m.len()).sum()
    }

    pub async fn all_app_entries(&self) -> Vec<Arc<AppEntry>> {
        self.app
            .read()
            .await
            .values()
            .flat_map(|m| m.values().cloned())
            .collect()
    }

    pub async fn requester_ids(&self) -> Vec<String> {
        self.app.read().await.keys().cloned().collect()
    }

    pub async fn total_hosted_count(&self) -> usize {
        self.hosted.read().await.len()
    }
}
