//! Cluster collaborator objects, read-only and cache-backed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ObjectMeta;

/// Where a pod volume's data actually comes from.
///
/// Claim-backed volumes are mounted on the host under the claim's bound
/// volume name; everything else is mounted under the pod volume name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeSource {
    Claim { claim_name: String },
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PodVolume {
    pub name: String,
    pub source: VolumeSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pod {
    pub metadata: ObjectMeta,
    pub uid: String,
    pub volumes: Vec<PodVolume>,
}

impl Pod {
    pub fn volume(&self, name: &str) -> Option<&PodVolume> {
        self.volumes.iter().find(|v| v.name == name)
    }
}

/// Opaque key/value secret; the credential provisioner reads one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    pub metadata: ObjectMeta,
    pub data: BTreeMap<String, String>,
}

/// A volume claim and the volume it is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeClaim {
    pub metadata: ObjectMeta,
    pub bound_volume: String,
}
