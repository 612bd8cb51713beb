use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::CopyError;

/// Everything one copy-tool invocation needs. Built once per
/// reconciliation attempt and shared by the backup run and the snapshot
/// lookup so both are scoped identically.
#[derive(Debug, Clone)]
pub struct CopyRequest {
    pub repo_prefix: String,
    /// Namespace scope; appended to the prefix to form the repository URL.
    pub namespace: String,
    pub credentials_path: PathBuf,
    pub target_path: PathBuf,
    pub tags: BTreeMap<String, String>,
}

impl CopyRequest {
    /// Repository URL: `<prefix>/<namespace>`.
    pub fn repo(&self) -> String {
        format!("{}/{}", self.repo_prefix.trim_end_matches('/'), self.namespace)
    }
}

/// The external copy tool, behind a seam so tests can script outcomes.
#[async_trait]
pub trait Copier: Send + Sync {
    /// Runs the copy. A nonzero exit surfaces as `CopyError::Backup`
    /// carrying the tool's stderr.
    async fn backup(&self, req: &CopyRequest) -> Result<(), CopyError>;

    /// Looks up the content-addressed identifier of the copy that just
    /// completed under `req`'s repository, namespace and tags.
    async fn snapshot_id(&self, req: &CopyRequest) -> Result<String, CopyError>;
}
