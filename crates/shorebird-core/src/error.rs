//! Error types, grouped by the boundary they cross.

use thiserror::Error;

use crate::domain::ObjectKey;

/// Errors surfaced by the shared object store.
///
/// Conflict and Unavailable are transient from the dispatcher's point of
/// view: the key is requeued and the write retried against a fresh read.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object {0} not found")]
    NotFound(ObjectKey),

    #[error("conflicting concurrent write for {0}")]
    Conflict(ObjectKey),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors from launching or waiting on an external process.
///
/// A nonzero exit is an error here; the captured stdout/stderr travel
/// separately so callers can put them in diagnostics.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        source: std::io::Error,
    },

    #[error("failed waiting for {program}: {source}")]
    Wait {
        program: String,
        source: std::io::Error,
    },

    #[error("{program} exited with {status}")]
    Exit {
        program: String,
        status: std::process::ExitStatus,
    },
}

/// Errors from the copy tool adapter. All of these are task-terminal:
/// the reconciler converts them into a Failed phase, not a retry.
#[derive(Debug, Error)]
pub enum CopyError {
    #[error("error running backup command, stderr={stderr}: {source}")]
    Backup {
        stderr: String,
        source: CommandError,
    },

    #[error("error listing snapshots, stderr={stderr}: {source}")]
    Snapshots {
        stderr: String,
        source: CommandError,
    },

    #[error("unable to parse snapshot listing: {0}")]
    Parse(String),

    #[error("no snapshot found for completed backup")]
    NoSnapshot,
}

/// Errors from materializing temporary repository credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credentials secret {namespace}/{name} not found")]
    SecretMissing { namespace: String, name: String },

    #[error("credentials secret {namespace}/{name} has no {key:?} entry")]
    KeyMissing {
        namespace: String,
        name: String,
        key: String,
    },

    #[error("error writing credentials file: {0}")]
    Io(#[from] std::io::Error),
}

/// Host path resolution errors. The count mismatch carries the observed
/// count so "not mounted yet" (0) and "ambiguous mount" (N>1) read
/// differently in the failure message.
#[derive(Debug, Error)]
pub enum PathMatchError {
    #[error("invalid glob pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        source: glob::PatternError,
    },

    #[error("error reading candidate path: {0}")]
    Read(#[from] glob::GlobError),

    #[error("expected one matching path for {pattern}, got {count}")]
    CountMismatch { pattern: String, count: usize },
}

/// Errors resolving a pod volume to its on-host directory name.
#[derive(Debug, Error)]
pub enum VolumeError {
    #[error("pod {pod} has no volume named {volume:?}")]
    VolumeMissing { pod: String, volume: String },

    #[error("volume claim {namespace}/{name} not found")]
    ClaimMissing { namespace: String, name: String },
}

/// The only errors that cross the reconciler/dispatcher boundary.
///
/// Everything task-terminal is committed into the object's phase and
/// message instead, so the dispatcher never retries work that cannot
/// succeed without outside intervention.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("error serializing object snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),
}
