//! In-memory cluster: cache, store and change notifications in one place.
//!
//! Plays both the object cache and the shared store so tests and the demo
//! binary can run the full reconciliation loop without a real cluster.
//! Patch application goes through the same merge-patch code the commit
//! protocol's round-trip tests exercise.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::{ObjectKey, Pod, Secret, VolumeBackup, VolumeClaim};
use crate::error::StoreError;
use crate::patch::apply_merge_patch;
use crate::ports::{BackupEvents, BackupStore, ClusterCache};

#[derive(Default)]
struct ClusterState {
    backups: HashMap<ObjectKey, VolumeBackup>,
    pods: HashMap<(String, String), Pod>,
    secrets: HashMap<(String, String), Secret>,
    claims: HashMap<(String, String), VolumeClaim>,

    /// Patches applied so far; gate tests assert this stays zero.
    patch_count: usize,

    /// Patches to accept before the failure window starts.
    fail_after: usize,

    /// Patches to reject with Unavailable once the window starts.
    fail_count: usize,
}

pub struct InMemoryCluster {
    state: Mutex<ClusterState>,
    observers: Mutex<Vec<Arc<dyn BackupEvents>>>,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ClusterState::default()),
            observers: Mutex::new(Vec::new()),
        }
    }

    /// Registers a change observer; it sees adds and updates from now on.
    pub fn register(&self, observer: Arc<dyn BackupEvents>) {
        self.observers
            .lock()
            .expect("observers lock poisoned")
            .push(observer);
    }

    /// Inserts a backup and notifies observers, as an external creator
    /// would through the watch mechanism.
    pub fn create_backup(&self, backup: VolumeBackup) {
        let key = backup.key();
        self.state
            .lock()
            .expect("cluster lock poisoned")
            .backups
            .insert(key.clone(), backup);
        for observer in self.observers.lock().expect("observers lock poisoned").iter() {
            observer.on_add(key.clone());
        }
    }

    pub fn insert_pod(&self, pod: Pod) {
        let k = (pod.metadata.namespace.clone(), pod.metadata.name.clone());
        self.state
            .lock()
            .expect("cluster lock poisoned")
            .pods
            .insert(k, pod);
    }

    pub fn insert_secret(&self, secret: Secret) {
        let k = (
            secret.metadata.namespace.clone(),
            secret.metadata.name.clone(),
        );
        self.state
            .lock()
            .expect("cluster lock poisoned")
            .secrets
            .insert(k, secret);
    }

    pub fn insert_claim(&self, claim: VolumeClaim) {
        let k = (
            claim.metadata.namespace.clone(),
            claim.metadata.name.clone(),
        );
        self.state
            .lock()
            .expect("cluster lock poisoned")
            .claims
            .insert(k, claim);
    }

    pub fn remove_backup(&self, key: &ObjectKey) {
        self.state
            .lock()
            .expect("cluster lock poisoned")
            .backups
            .remove(key);
    }

    pub fn patch_count(&self) -> usize {
        self.state.lock().expect("cluster lock poisoned").patch_count
    }

    /// Makes the next `count` patches fail with Unavailable.
    pub fn fail_next_patches(&self, count: usize) {
        self.fail_patches_after(0, count);
    }

    /// Accepts `skip` more patches, then fails the following `count`.
    /// Lets a test target one specific store write, such as the final
    /// Completed commit.
    pub fn fail_patches_after(&self, skip: usize, count: usize) {
        let mut state = self.state.lock().expect("cluster lock poisoned");
        state.fail_after = skip;
        state.fail_count = count;
    }

    fn notify_update(&self, key: &ObjectKey) {
        for observer in self.observers.lock().expect("observers lock poisoned").iter() {
            observer.on_update(key.clone());
        }
    }
}

impl Default for InMemoryCluster {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClusterCache for InMemoryCluster {
    async fn backup(&self, key: &ObjectKey) -> Option<VolumeBackup> {
        self.state
            .lock()
            .expect("cluster lock poisoned")
            .backups
            .get(key)
            .cloned()
    }

    async fn pod(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.state
            .lock()
            .expect("cluster lock poisoned")
            .pods
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    async fn secret(&self, namespace: &str, name: &str) -> Option<Secret> {
        self.state
            .lock()
            .expect("cluster lock poisoned")
            .secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    async fn claim(&self, namespace: &str, name: &str) -> Option<VolumeClaim> {
        self.state
            .lock()
            .expect("cluster lock poisoned")
            .claims
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }
}

#[async_trait]
impl BackupStore for InMemoryCluster {
    async fn get(&self, key: &ObjectKey) -> Result<VolumeBackup, StoreError> {
        self.state
            .lock()
            .expect("cluster lock poisoned")
            .backups
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    async fn patch(&self, key: &ObjectKey, patch: &[u8]) -> Result<VolumeBackup, StoreError> {
        let updated = {
            let mut state = self.state.lock().expect("cluster lock poisoned");
            if state.fail_after > 0 {
                state.fail_after -= 1;
            } else if state.fail_count > 0 {
                state.fail_count -= 1;
                return Err(StoreError::Unavailable("injected patch failure".into()));
            }

            let current = state
                .backups
                .get(key)
                .ok_or_else(|| StoreError::NotFound(key.clone()))?;

            let patch: serde_json::Value = serde_json::from_slice(patch)
                .map_err(|e| StoreError::Unavailable(format!("malformed patch: {e}")))?;
            let mut doc = serde_json::to_value(current)
                .map_err(|e| StoreError::Unavailable(format!("unserializable object: {e}")))?;
            apply_merge_patch(&mut doc, &patch);

            let updated: VolumeBackup = serde_json::from_value(doc)
                .map_err(|e| StoreError::Unavailable(format!("patched object invalid: {e}")))?;

            state.patch_count += 1;
            state.backups.insert(key.clone(), updated.clone());
            updated
        };

        // Mirror a real store: every accepted write flows back through
        // the watch as an update.
        self.notify_update(key);
        Ok(updated)
    }
}
