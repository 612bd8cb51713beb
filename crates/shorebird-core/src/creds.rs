//! Secret-backed credential provisioner.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use ulid::Ulid;

use crate::error::CredentialError;
use crate::ports::{ClusterCache, CredentialSource, TempCredentials};

/// Name of the per-namespace secret holding repository credentials.
pub const CREDENTIALS_SECRET: &str = "backup-repo-credentials";

/// Key within that secret containing the repository password.
pub const CREDENTIALS_KEY: &str = "repository-password";

/// Reads the repository password from the cache-backed secret in the
/// pod's namespace and writes it to a uniquely named temp file.
pub struct SecretCredentialSource {
    cache: Arc<dyn ClusterCache>,
    dir: PathBuf,
}

impl SecretCredentialSource {
    pub fn new(cache: Arc<dyn ClusterCache>) -> Self {
        Self {
            cache,
            dir: std::env::temp_dir(),
        }
    }

    /// Overrides the directory credentials files are written to.
    pub fn with_dir(mut self, dir: PathBuf) -> Self {
        self.dir = dir;
        self
    }
}

#[async_trait]
impl CredentialSource for SecretCredentialSource {
    async fn materialize(&self, namespace: &str) -> Result<TempCredentials, CredentialError> {
        let secret = self
            .cache
            .secret(namespace, CREDENTIALS_SECRET)
            .await
            .ok_or_else(|| CredentialError::SecretMissing {
                namespace: namespace.to_string(),
                name: CREDENTIALS_SECRET.to_string(),
            })?;

        let password =
            secret
                .data
                .get(CREDENTIALS_KEY)
                .ok_or_else(|| CredentialError::KeyMissing {
                    namespace: namespace.to_string(),
                    name: CREDENTIALS_SECRET.to_string(),
                    key: CREDENTIALS_KEY.to_string(),
                })?;

        // Ulid keeps concurrent attempts in the same namespace from
        // colliding on the file name.
        let path = self.dir.join(format!("creds-{}-{}", namespace, Ulid::new()));
        tokio::fs::write(&path, password).await?;
        Ok(TempCredentials::new(path))
    }
}
