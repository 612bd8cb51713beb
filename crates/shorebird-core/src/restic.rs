//! Copy tool adapter: command construction and result lookup for a
//! restic-style tool.
//!
//! The argv builders are pure functions over the request so command
//! construction is testable without ever launching a process.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::error::CopyError;
use crate::exec::run_command;
use crate::ports::{Copier, CopyRequest};

/// Argv for the backup invocation. Each tag becomes its own `--tag` so the
/// tool records all of them on the new snapshot.
pub fn backup_args(req: &CopyRequest) -> Vec<String> {
    let mut args = vec![
        "backup".to_string(),
        format!("--repo={}", req.repo()),
        format!("--password-file={}", req.credentials_path.display()),
    ];
    for (k, v) in &req.tags {
        args.push(format!("--tag={k}={v}"));
    }
    args.push(req.target_path.display().to_string());
    args
}

/// Argv for the snapshot lookup. The tag set is comma-joined into a single
/// filter (all tags must match) and `--last` narrows the listing to the
/// most recent snapshot, which is the one the preceding backup created.
pub fn snapshots_args(req: &CopyRequest) -> Vec<String> {
    let mut args = vec![
        "snapshots".to_string(),
        format!("--repo={}", req.repo()),
        format!("--password-file={}", req.credentials_path.display()),
        "--json".to_string(),
        "--last".to_string(),
    ];
    if !req.tags.is_empty() {
        let filter: Vec<String> = req.tags.iter().map(|(k, v)| format!("{k}={v}")).collect();
        args.push(format!("--tag={}", filter.join(",")));
    }
    args
}

#[derive(Debug, Deserialize)]
struct SnapshotRecord {
    short_id: String,
}

/// Extracts the snapshot identifier from the tool's JSON listing.
/// With `--last` and a full tag filter the listing must contain exactly
/// one record.
pub fn parse_snapshot_id(listing: &str) -> Result<String, CopyError> {
    let records: Vec<SnapshotRecord> =
        serde_json::from_str(listing).map_err(|e| CopyError::Parse(e.to_string()))?;
    match records.as_slice() {
        [only] => Ok(only.short_id.clone()),
        [] => Err(CopyError::NoSnapshot),
        many => Err(CopyError::Parse(format!(
            "expected one snapshot in listing, got {}",
            many.len()
        ))),
    }
}

/// `Copier` implementation that shells out to the real tool.
pub struct ResticCopier {
    program: String,
}

impl ResticCopier {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for ResticCopier {
    fn default() -> Self {
        Self::new("restic")
    }
}

#[async_trait]
impl Copier for ResticCopier {
    async fn backup(&self, req: &CopyRequest) -> Result<(), CopyError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(backup_args(req));

        let (output, result) = run_command(&mut cmd).await;
        debug!(stdout = %output.stdout, stderr = %output.stderr, "backup command finished");
        result.map_err(|source| CopyError::Backup {
            stderr: output.stderr,
            source,
        })
    }

    async fn snapshot_id(&self, req: &CopyRequest) -> Result<String, CopyError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(snapshots_args(req));

        let (output, result) = run_command(&mut cmd).await;
        result.map_err(|source| CopyError::Snapshots {
            stderr: output.stderr,
            source,
        })?;
        parse_snapshot_id(&output.stdout)
    }
}
