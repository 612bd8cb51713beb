use async_trait::async_trait;

use crate::domain::{ObjectKey, Pod, Secret, VolumeBackup, VolumeClaim};

/// Read access to the locally-mirrored cluster state.
///
/// Every lookup returns an owned snapshot copy, never a reference into
/// shared cache storage, so callers can mutate freely without defensive
/// locking. `None` means the object does not (or no longer does) exist,
/// which is usually not an error to the caller.
#[async_trait]
pub trait ClusterCache: Send + Sync {
    async fn backup(&self, key: &ObjectKey) -> Option<VolumeBackup>;

    async fn pod(&self, namespace: &str, name: &str) -> Option<Pod>;

    async fn secret(&self, namespace: &str, name: &str) -> Option<Secret>;

    async fn claim(&self, namespace: &str, name: &str) -> Option<VolumeClaim>;
}
