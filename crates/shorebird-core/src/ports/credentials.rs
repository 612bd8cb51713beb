use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;

use crate::error::CredentialError;

/// Materializes short-lived repository credentials into a file the copy
/// tool can read. The caller owns deletion, which `TempCredentials`
/// performs on drop.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn materialize(&self, namespace: &str) -> Result<TempCredentials, CredentialError>;
}

/// Handle to an ephemeral credentials file.
///
/// The file is removed when this handle drops, on every exit path of the
/// reconciliation that created it. Removal is best effort: a failure is
/// logged and never escalated, since the content is pathname-safe text
/// that the tool has already consumed.
#[derive(Debug)]
pub struct TempCredentials {
    path: PathBuf,
}

impl TempCredentials {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempCredentials {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %self.path.display(), error = %e, "failed to remove temp credentials file");
        }
    }
}
