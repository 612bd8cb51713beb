use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{BackupPhase, ObjectKey};

/// Object identity as stored alongside the object itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub namespace: String,
    pub name: String,
}

/// Reference to the pod whose volume is being backed up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodRef {
    pub namespace: String,
    pub name: String,
    /// The pod's unique identifier; part of the on-host volume path.
    pub uid: String,
}

/// Desired state: which node copies which pod volume to which repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupSpec {
    /// Node whose agent owns this backup. Ownership gating compares this
    /// against the agent's configured node identity.
    pub node: String,
    pub pod: PodRef,
    /// Logical volume name within the pod.
    pub volume: String,
    /// Repository location prefix; the namespace is appended to scope it.
    pub repo_prefix: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

/// Observed state, written exclusively by the owning node's reconciler.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupStatus {
    #[serde(default)]
    pub phase: BackupPhase,

    /// Resolved host path the copy ran against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Content-addressed identifier of the completed copy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_id: Option<String>,

    /// Human-readable failure detail; only meaningful in phase Failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// The unit of work: one node-local volume backup and its lifecycle.
///
/// Created externally in phase New; mutated only through merge patches so
/// concurrent writers touching other fields are never clobbered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeBackup {
    pub metadata: ObjectMeta,
    pub spec: BackupSpec,
    #[serde(default)]
    pub status: BackupStatus,
}

impl VolumeBackup {
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.metadata.namespace, &self.metadata.name)
    }
}
