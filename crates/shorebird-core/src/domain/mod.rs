//! Domain model: keys, the backup object, phases, and the cluster
//! collaborator objects the reconciler reads.

mod backup;
mod key;
mod objects;
mod phase;

pub use backup::{BackupSpec, BackupStatus, ObjectMeta, PodRef, VolumeBackup};
pub use key::{InvalidKey, ObjectKey};
pub use objects::{Pod, PodVolume, Secret, VolumeClaim, VolumeSource};
pub use phase::BackupPhase;
