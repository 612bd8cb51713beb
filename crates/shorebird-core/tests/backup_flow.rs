//! End-to-end reconciliation scenarios against the in-memory cluster.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use shorebird_core::agent::{Agent, EnqueueEvents};
use shorebird_core::creds::{CREDENTIALS_KEY, CREDENTIALS_SECRET, SecretCredentialSource};
use shorebird_core::domain::{
    BackupPhase, BackupSpec, ObjectKey, ObjectMeta, Pod, PodRef, PodVolume, Secret, VolumeBackup,
    VolumeClaim, VolumeSource,
};
use shorebird_core::error::{CopyError, SyncError};
use shorebird_core::impls::InMemoryCluster;
use shorebird_core::ports::{BackupStore, Copier, CopyRequest};
use shorebird_core::queue::{RetryPolicy, WorkQueue};
use shorebird_core::reconcile::Reconciler;

const POD_UID: &str = "8f3a1c2e";

struct ScriptedCopier {
    backups: AtomicUsize,
    requests: std::sync::Mutex<Vec<CopyRequest>>,
}

impl ScriptedCopier {
    fn new() -> Self {
        Self {
            backups: AtomicUsize::new(0),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn backup_runs(&self) -> usize {
        self.backups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Copier for ScriptedCopier {
    async fn backup(&self, req: &CopyRequest) -> Result<(), CopyError> {
        self.backups.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(req.clone());
        Ok(())
    }

    async fn snapshot_id(&self, _req: &CopyRequest) -> Result<String, CopyError> {
        Ok("snap-abc".to_string())
    }
}

struct Fixture {
    cluster: Arc<InMemoryCluster>,
    copier: Arc<ScriptedCopier>,
    reconciler: Arc<Reconciler>,
    host_path: std::path::PathBuf,
    _dir: tempfile::TempDir,
}

/// A cluster where `ns/a` is resolvable to exactly one host path:
/// a claim-backed volume bound to `pv-1`, mounted under the pod's uid.
fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let cluster = Arc::new(InMemoryCluster::new());

    cluster.insert_pod(Pod {
        metadata: ObjectMeta {
            namespace: "ns".into(),
            name: "web-0".into(),
        },
        uid: POD_UID.into(),
        volumes: vec![PodVolume {
            name: "data".into(),
            source: VolumeSource::Claim {
                claim_name: "data-claim".into(),
            },
        }],
    });
    cluster.insert_claim(VolumeClaim {
        metadata: ObjectMeta {
            namespace: "ns".into(),
            name: "data-claim".into(),
        },
        bound_volume: "pv-1".into(),
    });

    let mut data = BTreeMap::new();
    data.insert(CREDENTIALS_KEY.to_string(), "pw".to_string());
    cluster.insert_secret(Secret {
        metadata: ObjectMeta {
            namespace: "ns".into(),
            name: CREDENTIALS_SECRET.into(),
        },
        data,
    });

    let pods_root = dir.path().join("pods");
    let host_path = pods_root.join(POD_UID).join("volumes/hostpath/pv-1");
    std::fs::create_dir_all(&host_path).unwrap();

    let copier = Arc::new(ScriptedCopier::new());
    let credentials = Arc::new(
        SecretCredentialSource::new(cluster.clone()).with_dir(dir.path().to_path_buf()),
    );
    let reconciler = Arc::new(
        Reconciler::new(
            "node1",
            cluster.clone(),
            cluster.clone(),
            copier.clone(),
            credentials,
        )
        .with_host_pods_root(pods_root),
    );

    Fixture {
        cluster,
        copier,
        reconciler,
        host_path,
        _dir: dir,
    }
}

fn new_backup(node: &str) -> VolumeBackup {
    let mut tags = BTreeMap::new();
    tags.insert("backup".to_string(), "nightly".to_string());
    VolumeBackup {
        metadata: ObjectMeta {
            namespace: "ns".into(),
            name: "a".into(),
        },
        spec: BackupSpec {
            node: node.into(),
            pod: PodRef {
                namespace: "ns".into(),
                name: "web-0".into(),
                uid: POD_UID.into(),
            },
            volume: "data".into(),
            repo_prefix: "s3:s3.example.com/bucket".into(),
            tags,
        },
        status: Default::default(),
    }
}

fn key() -> ObjectKey {
    ObjectKey::new("ns", "a")
}

#[tokio::test]
async fn happy_path_ends_completed_with_path_and_snapshot() {
    let fx = fixture();
    fx.cluster.create_backup(new_backup("node1"));

    fx.reconciler.sync(&key()).await.unwrap();

    let stored = fx.cluster.get(&key()).await.unwrap();
    assert_eq!(stored.status.phase, BackupPhase::Completed);
    assert_eq!(
        stored.status.path.as_deref(),
        Some(fx.host_path.to_str().unwrap())
    );
    assert_eq!(stored.status.snapshot_id.as_deref(), Some("snap-abc"));
    assert!(stored.status.started_at.is_some());
    assert!(stored.status.completed_at.is_some());
    assert!(stored.status.message.is_none());

    // Claim plus completion, nothing else.
    assert_eq!(fx.cluster.patch_count(), 2);
    assert_eq!(fx.copier.backup_runs(), 1);

    // The copy request carried the resolved path and the spec's tags.
    let requests = fx.copier.requests.lock().unwrap();
    assert_eq!(requests[0].target_path, fx.host_path);
    assert_eq!(requests[0].repo(), "s3:s3.example.com/bucket/ns");
    assert_eq!(requests[0].tags.get("backup").unwrap(), "nightly");
}

#[tokio::test]
async fn unmounted_volume_fails_with_count_zero() {
    let fx = fixture();
    std::fs::remove_dir_all(&fx.host_path).unwrap();
    fx.cluster.create_backup(new_backup("node1"));

    fx.reconciler.sync(&key()).await.unwrap();

    let stored = fx.cluster.get(&key()).await.unwrap();
    assert_eq!(stored.status.phase, BackupPhase::Failed);
    let msg = stored.status.message.unwrap();
    assert!(msg.contains("got 0"), "message was: {msg}");
    assert!(msg.contains("path"), "message was: {msg}");
    assert_eq!(fx.copier.backup_runs(), 0);
}

#[tokio::test]
async fn ambiguous_mount_fails_without_running_the_copy() {
    let fx = fixture();
    std::fs::create_dir_all(
        fx.host_path
            .parent()
            .unwrap()
            .parent()
            .unwrap()
            .join("other/pv-1"),
    )
    .unwrap();
    fx.cluster.create_backup(new_backup("node1"));

    fx.reconciler.sync(&key()).await.unwrap();

    let stored = fx.cluster.get(&key()).await.unwrap();
    assert_eq!(stored.status.phase, BackupPhase::Failed);
    assert!(stored.status.message.unwrap().contains("got 2"));
    assert_eq!(fx.copier.backup_runs(), 0);
}

#[tokio::test]
async fn foreign_node_issues_zero_patches() {
    let fx = fixture();
    fx.cluster.create_backup(new_backup("node2"));

    fx.reconciler.sync(&key()).await.unwrap();

    assert_eq!(fx.cluster.patch_count(), 0);
    let stored = fx.cluster.get(&key()).await.unwrap();
    assert_eq!(stored.status.phase, BackupPhase::New);
}

#[tokio::test]
async fn terminal_backup_issues_zero_patches() {
    let fx = fixture();
    fx.cluster.create_backup(new_backup("node1"));
    fx.reconciler.sync(&key()).await.unwrap();
    assert_eq!(fx.cluster.patch_count(), 2);

    // A redelivery after completion must not patch again.
    fx.reconciler.sync(&key()).await.unwrap();
    assert_eq!(fx.cluster.patch_count(), 2);
}

#[tokio::test]
async fn failed_completion_commit_is_resumed_without_a_second_copy() {
    let fx = fixture();
    fx.cluster.create_backup(new_backup("node1"));

    // Accept the InProgress claim, reject the Completed commit.
    fx.cluster.fail_patches_after(1, 1);

    let err = fx.reconciler.sync(&key()).await.unwrap_err();
    assert!(matches!(err, SyncError::Store(_)));
    let stored = fx.cluster.get(&key()).await.unwrap();
    assert_eq!(stored.status.phase, BackupPhase::InProgress);
    assert_eq!(fx.copier.backup_runs(), 1);

    // The dispatcher redelivers; only the bookkeeping write reruns.
    fx.reconciler.sync(&key()).await.unwrap();
    let stored = fx.cluster.get(&key()).await.unwrap();
    assert_eq!(stored.status.phase, BackupPhase::Completed);
    assert_eq!(stored.status.snapshot_id.as_deref(), Some("snap-abc"));
    assert_eq!(fx.copier.backup_runs(), 1);
}

#[tokio::test]
async fn failed_fail_commit_is_resumed_with_its_message() {
    let fx = fixture();
    std::fs::remove_dir_all(&fx.host_path).unwrap();
    fx.cluster.create_backup(new_backup("node1"));

    // Accept the InProgress claim, reject the Failed commit.
    fx.cluster.fail_patches_after(1, 1);

    let err = fx.reconciler.sync(&key()).await.unwrap_err();
    assert!(matches!(err, SyncError::Store(_)));
    let stored = fx.cluster.get(&key()).await.unwrap();
    assert_eq!(stored.status.phase, BackupPhase::InProgress);

    // The dispatcher redelivers; only the Failed commit reruns and the
    // original diagnostic survives.
    fx.reconciler.sync(&key()).await.unwrap();
    let stored = fx.cluster.get(&key()).await.unwrap();
    assert_eq!(stored.status.phase, BackupPhase::Failed);
    let msg = stored.status.message.unwrap();
    assert!(msg.contains("got 0"), "message was: {msg}");
    assert_eq!(fx.copier.backup_runs(), 0);
}

#[tokio::test]
async fn failed_claim_leaves_the_backup_new_for_a_retry() {
    let fx = fixture();
    fx.cluster.create_backup(new_backup("node1"));
    fx.cluster.fail_next_patches(1);

    let err = fx.reconciler.sync(&key()).await.unwrap_err();
    assert!(matches!(err, SyncError::Store(_)));
    assert_eq!(fx.copier.backup_runs(), 0);

    // Retry claims and completes normally.
    fx.reconciler.sync(&key()).await.unwrap();
    let stored = fx.cluster.get(&key()).await.unwrap();
    assert_eq!(stored.status.phase, BackupPhase::Completed);
}

#[tokio::test]
async fn agent_drives_a_created_backup_to_completion() {
    let fx = fixture();

    let queue = Arc::new(WorkQueue::new(RetryPolicy {
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(100),
        multiplier: 2.0,
        jitter: 0.0,
    }));
    fx.cluster.register(Arc::new(EnqueueEvents::new(queue.clone())));
    let agent = Agent::spawn(2, queue, fx.reconciler.clone());

    // Creation flows through the watch into the queue.
    fx.cluster.create_backup(new_backup("node1"));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let stored = fx.cluster.get(&key()).await.unwrap();
        if stored.status.phase.is_terminal() {
            assert_eq!(stored.status.phase, BackupPhase::Completed);
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "backup never reached a terminal phase"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    agent.shutdown_and_join().await;
    assert_eq!(fx.copier.backup_runs(), 1);
}

#[tokio::test]
async fn agent_retries_transient_store_failures_until_success() {
    let fx = fixture();
    fx.cluster.fail_next_patches(2);

    let queue = Arc::new(WorkQueue::new(RetryPolicy {
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        multiplier: 2.0,
        jitter: 0.0,
    }));
    fx.cluster.register(Arc::new(EnqueueEvents::new(queue.clone())));
    let agent = Agent::spawn(1, queue, fx.reconciler.clone());

    fx.cluster.create_backup(new_backup("node1"));

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let stored = fx.cluster.get(&key()).await.unwrap();
        if stored.status.phase == BackupPhase::Completed {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "backup never completed after transient failures"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    agent.shutdown_and_join().await;
    assert_eq!(fx.copier.backup_runs(), 1);
}
