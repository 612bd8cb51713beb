//! Demo agent: wires shorebird-core against the in-memory cluster and
//! drives one backup end to end.
//!
//! Node identity comes from `SHOREBIRD_NODE` (default `node1`) and the
//! copy tool from `SHOREBIRD_RESTIC` (default `restic`). Without a real
//! restic on PATH the backup lands in Failed with the launch error in its
//! message, which is the honest outcome.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::info;

use shorebird_core::agent::{Agent, EnqueueEvents};
use shorebird_core::creds::{CREDENTIALS_KEY, CREDENTIALS_SECRET, SecretCredentialSource};
use shorebird_core::domain::{
    BackupSpec, ObjectKey, ObjectMeta, Pod, PodRef, PodVolume, Secret, VolumeBackup, VolumeSource,
};
use shorebird_core::impls::InMemoryCluster;
use shorebird_core::ports::BackupStore;
use shorebird_core::queue::{RetryPolicy, WorkQueue};
use shorebird_core::reconcile::Reconciler;
use shorebird_core::restic::ResticCopier;

const POD_UID: &str = "01demo9pod";

fn seed_cluster(cluster: &InMemoryCluster, node: &str) {
    cluster.insert_pod(Pod {
        metadata: ObjectMeta {
            namespace: "demo".into(),
            name: "web-0".into(),
        },
        uid: POD_UID.into(),
        volumes: vec![PodVolume {
            name: "data".into(),
            source: VolumeSource::Other,
        }],
    });

    let mut data = BTreeMap::new();
    data.insert(CREDENTIALS_KEY.to_string(), "demo-password".to_string());
    cluster.insert_secret(Secret {
        metadata: ObjectMeta {
            namespace: "demo".into(),
            name: CREDENTIALS_SECRET.into(),
        },
        data,
    });

    cluster.create_backup(VolumeBackup {
        metadata: ObjectMeta {
            namespace: "demo".into(),
            name: "web-0-data".into(),
        },
        spec: BackupSpec {
            node: node.into(),
            pod: PodRef {
                namespace: "demo".into(),
                name: "web-0".into(),
                uid: POD_UID.into(),
            },
            volume: "data".into(),
            repo_prefix: std::env::var("SHOREBIRD_REPO_PREFIX")
                .unwrap_or_else(|_| "local:/tmp/shorebird-repo".into()),
            tags: BTreeMap::new(),
        },
        status: Default::default(),
    });
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    let node = std::env::var("SHOREBIRD_NODE").unwrap_or_else(|_| "node1".into());
    let restic = std::env::var("SHOREBIRD_RESTIC").unwrap_or_else(|_| "restic".into());

    // A fake host mount for the demo pod's volume, with one file in it.
    let pods_root = std::env::temp_dir().join("shorebird-demo-pods");
    let volume_dir = pods_root.join(POD_UID).join("volumes/hostpath/data");
    std::fs::create_dir_all(&volume_dir).expect("create demo volume dir");
    std::fs::write(volume_dir.join("hello.txt"), "demo payload\n").expect("write demo file");

    let cluster = Arc::new(InMemoryCluster::new());
    let queue = Arc::new(WorkQueue::new(RetryPolicy::default_dispatch()));
    cluster.register(Arc::new(EnqueueEvents::new(queue.clone())));

    let reconciler = Arc::new(
        Reconciler::new(
            node.clone(),
            cluster.clone(),
            cluster.clone(),
            Arc::new(ResticCopier::new(restic)),
            Arc::new(SecretCredentialSource::new(cluster.clone())),
        )
        .with_host_pods_root(pods_root),
    );

    let agent = Agent::spawn(2, queue, reconciler);
    info!(%node, "agent started");

    // Creating the backup after registration sends it through the watch
    // into the queue, exactly as an external creator would.
    seed_cluster(&cluster, &node);

    let key = ObjectKey::new("demo", "web-0-data");
    loop {
        let backup = cluster.get(&key).await.expect("demo backup exists");
        if backup.status.phase.is_terminal() {
            println!(
                "final state: phase={:?} path={:?} snapshot={:?} message={:?}",
                backup.status.phase,
                backup.status.path,
                backup.status.snapshot_id,
                backup.status.message,
            );
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }

    agent.shutdown_and_join().await;
}
