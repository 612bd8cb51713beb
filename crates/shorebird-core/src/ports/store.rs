use async_trait::async_trait;

use crate::domain::{ObjectKey, VolumeBackup};
use crate::error::StoreError;

/// Write access to the shared store, addressed by object identity.
///
/// The store is the sole arbiter of write conflicts; this side only ever
/// sends field-level merge patches, never whole-object replacements.
#[async_trait]
pub trait BackupStore: Send + Sync {
    async fn get(&self, key: &ObjectKey) -> Result<VolumeBackup, StoreError>;

    /// Applies an RFC 7386 merge patch and returns the store's
    /// authoritative post-update object, which may contain concurrent
    /// changes to fields this patch never touched.
    async fn patch(&self, key: &ObjectKey, patch: &[u8]) -> Result<VolumeBackup, StoreError>;
}
