//! Resolves a pod's logical volume name to the directory the kubelet
//! mounts it under on the host.

use crate::domain::{Pod, VolumeSource};
use crate::error::VolumeError;
use crate::ports::ClusterCache;

/// Claim-backed volumes live under the claim's bound volume name; any
/// other volume lives under its own name.
pub async fn volume_directory(
    cache: &dyn ClusterCache,
    pod: &Pod,
    volume: &str,
) -> Result<String, VolumeError> {
    let pod_volume = pod.volume(volume).ok_or_else(|| VolumeError::VolumeMissing {
        pod: format!("{}/{}", pod.metadata.namespace, pod.metadata.name),
        volume: volume.to_string(),
    })?;

    match &pod_volume.source {
        VolumeSource::Claim { claim_name } => {
            let claim = cache
                .claim(&pod.metadata.namespace, claim_name)
                .await
                .ok_or_else(|| VolumeError::ClaimMissing {
                    namespace: pod.metadata.namespace.clone(),
                    name: claim_name.clone(),
                })?;
            Ok(claim.bound_volume)
        }
        VolumeSource::Other => Ok(pod_volume.name.clone()),
    }
}
