//! Backup reconciliation: the per-key sync handler.
//!
//! `Reconciler::sync` reads the backup from the cache, gates on phase and
//! node ownership, claims it by committing InProgress, runs the copy
//! against the resolved host path, and commits the terminal outcome. Only
//! transient store errors cross back to the dispatcher; everything
//! task-terminal becomes a committed Failed phase.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::domain::{BackupPhase, ObjectKey, VolumeBackup};
use crate::error::SyncError;
use crate::patch::diff_merge_patch;
use crate::pathmatch::single_path_match;
use crate::ports::{BackupStore, ClusterCache, Copier, CopyRequest, CredentialSource};
use crate::volume::volume_directory;

/// Default host mount prefix under which pod volumes appear.
pub const DEFAULT_HOST_PODS_ROOT: &str = "/host_pods";

/// Outcome of a finished copy whose Completed commit is still owed to the
/// store.
#[derive(Debug, Clone)]
struct FinishedCopy {
    path: String,
    snapshot_id: String,
}

/// A decided attempt whose terminal commit has not landed yet. Recorded
/// before either terminal write so a redelivery retries only the commit.
#[derive(Debug, Clone)]
enum PendingOutcome {
    Completed(FinishedCopy),
    Failed(String),
}

pub struct Reconciler {
    cache: Arc<dyn ClusterCache>,
    store: Arc<dyn BackupStore>,
    copier: Arc<dyn Copier>,
    credentials: Arc<dyn CredentialSource>,

    /// This agent's node identity; fixed at startup, never re-read.
    node: String,
    host_pods_root: PathBuf,

    /// Attempts whose terminal commit (Completed or Failed) has not been
    /// accepted by the store yet. Keeping the outcome lets a redelivery
    /// retry only the bookkeeping write instead of being swallowed by the
    /// InProgress gate. In-process only: a restart loses it and the task
    /// stays InProgress, as the store is the single authority on phase.
    pending_results: Mutex<HashMap<ObjectKey, PendingOutcome>>,
}

impl Reconciler {
    pub fn new(
        node: impl Into<String>,
        cache: Arc<dyn ClusterCache>,
        store: Arc<dyn BackupStore>,
        copier: Arc<dyn Copier>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            cache,
            store,
            copier,
            credentials,
            node: node.into(),
            host_pods_root: PathBuf::from(DEFAULT_HOST_PODS_ROOT),
            pending_results: Mutex::new(HashMap::new()),
        }
    }

    /// Overrides the host mount prefix (tests point this at a tempdir).
    pub fn with_host_pods_root(mut self, root: PathBuf) -> Self {
        self.host_pods_root = root;
        self
    }

    /// One reconciliation attempt for `key`.
    ///
    /// Returns `Ok(())` for every ignorable condition (object gone, not
    /// ours, already claimed or terminal) and for task-terminal failures,
    /// which are committed into the object instead. `Err` means a
    /// transient store problem the dispatcher should retry.
    pub async fn sync(&self, key: &ObjectKey) -> Result<(), SyncError> {
        let Some(backup) = self.cache.backup(key).await else {
            debug!(%key, "backup no longer exists, nothing to do");
            self.forget_pending(key);
            return Ok(());
        };

        match backup.status.phase {
            BackupPhase::New => {}
            BackupPhase::InProgress => {
                // The one resumable case: our own attempt is decided but
                // its terminal commit failed. Anything else in progress
                // was claimed by another writer (or an earlier life of
                // this process) and is not ours to touch.
                if backup.spec.node == self.node
                    && let Some(outcome) = self.peek_pending(key)
                {
                    debug!(%key, "retrying terminal commit for decided attempt");
                    return match outcome {
                        PendingOutcome::Completed(done) => {
                            self.commit_completed(backup, done).await
                        }
                        PendingOutcome::Failed(message) => {
                            self.commit_failed(backup, message).await
                        }
                    };
                }
                return Ok(());
            }
            phase => {
                debug!(%key, ?phase, "phase is terminal, ignoring");
                return Ok(());
            }
        }

        if backup.spec.node != self.node {
            debug!(%key, owner = %backup.spec.node, "owned by another node, ignoring");
            return Ok(());
        }

        // The cache handed us a snapshot copy; from here on `backup` is
        // mutated only through the commit protocol.
        self.process(backup).await
    }

    async fn process(&self, backup: VolumeBackup) -> Result<(), SyncError> {
        let key = backup.key();
        info!(%key, "claiming backup");

        // Claim: New -> InProgress. Losing this write fails the attempt
        // and the dispatcher retries the whole key.
        let backup = self
            .patch_backup(backup, |b| {
                b.status.phase = BackupPhase::InProgress;
                b.status.started_at = Some(Utc::now());
            })
            .await?;

        let pod_ref = backup.spec.pod.clone();
        let Some(pod) = self.cache.pod(&pod_ref.namespace, &pod_ref.name).await else {
            let msg = format!("error getting pod {}/{}", pod_ref.namespace, pod_ref.name);
            return self.fail(backup, msg).await;
        };

        let volume_dir =
            match volume_directory(self.cache.as_ref(), &pod, &backup.spec.volume).await {
                Ok(dir) => dir,
                Err(e) => {
                    let msg = format!("error getting volume directory name: {e}");
                    return self.fail(backup, msg).await;
                }
            };

        // Exactly one on-host directory may match; zero means the volume
        // is not mounted (yet), more than one is ambiguous.
        let pattern = format!(
            "{}/{}/volumes/*/{}",
            self.host_pods_root.display(),
            pod.uid,
            volume_dir
        );
        let path = match single_path_match(&pattern) {
            Ok(path) => path,
            Err(e) => {
                let msg = format!("error getting volume path on host: {e}");
                return self.fail(backup, msg).await;
            }
        };

        // Credentials live exactly as long as this attempt; the handle
        // removes the file on every exit path below.
        let creds = match self.credentials.materialize(&pod_ref.namespace).await {
            Ok(creds) => creds,
            Err(e) => {
                let msg = format!("error creating temp credentials file: {e}");
                return self.fail(backup, msg).await;
            }
        };

        let request = CopyRequest {
            repo_prefix: backup.spec.repo_prefix.clone(),
            namespace: pod_ref.namespace.clone(),
            credentials_path: creds.path().to_path_buf(),
            target_path: path.clone(),
            tags: backup.spec.tags.clone(),
        };

        if let Err(e) = self.copier.backup(&request).await {
            return self.fail(backup, format!("error running backup: {e}")).await;
        }

        let snapshot_id = match self.copier.snapshot_id(&request).await {
            Ok(id) => id,
            Err(e) => {
                let msg = format!("error getting snapshot id: {e}");
                return self.fail(backup, msg).await;
            }
        };

        let done = FinishedCopy {
            path: path.display().to_string(),
            snapshot_id,
        };
        // The copy succeeded; remember the result before attempting the
        // commit so a failed write can be retried without redoing it.
        self.record_pending(&key, PendingOutcome::Completed(done.clone()));
        self.commit_completed(backup, done).await
    }

    async fn commit_completed(
        &self,
        backup: VolumeBackup,
        done: FinishedCopy,
    ) -> Result<(), SyncError> {
        let key = backup.key();
        self.patch_backup(backup, |b| {
            b.status.phase = BackupPhase::Completed;
            b.status.path = Some(done.path.clone());
            b.status.snapshot_id = Some(done.snapshot_id.clone());
            b.status.completed_at = Some(Utc::now());
        })
        .await?;

        self.forget_pending(&key);
        info!(%key, snapshot_id = %done.snapshot_id, "backup completed");
        Ok(())
    }

    /// Commits phase=Failed with `message`. The message is recorded as a
    /// pending outcome first, so a store error here is resumed on
    /// redelivery exactly like a failed Completed commit.
    async fn fail(&self, backup: VolumeBackup, message: String) -> Result<(), SyncError> {
        let key = backup.key();
        warn!(%key, %message, "marking backup failed");
        self.record_pending(&key, PendingOutcome::Failed(message.clone()));
        self.commit_failed(backup, message).await
    }

    async fn commit_failed(&self, backup: VolumeBackup, message: String) -> Result<(), SyncError> {
        let key = backup.key();
        self.patch_backup(backup, |b| {
            b.status.phase = BackupPhase::Failed;
            b.status.message = Some(message.clone());
            b.status.completed_at = Some(Utc::now());
        })
        .await?;
        self.forget_pending(&key);
        Ok(())
    }

    /// Read-modify-diff-patch commit: serialize the object before and
    /// after `mutate`, send only the difference, and adopt the store's
    /// authoritative result. Fields this mutation never touched cannot be
    /// clobbered, even from a stale snapshot.
    async fn patch_backup<F>(&self, backup: VolumeBackup, mutate: F) -> Result<VolumeBackup, SyncError>
    where
        F: FnOnce(&mut VolumeBackup),
    {
        let before = serde_json::to_value(&backup)?;
        let mut updated = backup;
        mutate(&mut updated);
        let after = serde_json::to_value(&updated)?;

        let patch = diff_merge_patch(&before, &after);
        let body = serde_json::to_vec(&patch)?;

        let fresh = self.store.patch(&updated.key(), &body).await?;
        Ok(fresh)
    }

    fn record_pending(&self, key: &ObjectKey, outcome: PendingOutcome) {
        self.pending_results
            .lock()
            .expect("pending results lock poisoned")
            .insert(key.clone(), outcome);
    }

    fn peek_pending(&self, key: &ObjectKey) -> Option<PendingOutcome> {
        self.pending_results
            .lock()
            .expect("pending results lock poisoned")
            .get(key)
            .cloned()
    }

    fn forget_pending(&self, key: &ObjectKey) {
        self.pending_results
            .lock()
            .expect("pending results lock poisoned")
            .remove(key);
    }
}
