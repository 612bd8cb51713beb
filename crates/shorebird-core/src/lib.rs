//! shorebird-core
//!
//! Per-node backup reconciliation. The agent on each node watches backup
//! objects in a shared store, claims the ones naming its node, copies the
//! referenced pod volume off the host with an external tool, and commits
//! the outcome back as a minimal merge patch.
//!
//! Module map:
//! - **domain**: keys, phases, the backup object, cluster collaborators
//! - **queue**: deduplicating per-key-serializing work queue with backoff
//! - **reconcile**: the sync handler and commit protocol
//! - **ports**: trait seams (store, cache, events, copier, credentials)
//! - **patch**: JSON merge-patch diff/apply
//! - **exec** / **restic**: external process adapter and tool commands
//! - **pathmatch** / **volume**: host path and volume directory resolution
//! - **agent**: worker group and event-to-queue bridge
//! - **impls**: in-memory cluster for tests and the demo binary

pub mod agent;
pub mod creds;
pub mod domain;
pub mod error;
pub mod exec;
pub mod impls;
pub mod patch;
pub mod pathmatch;
pub mod ports;
pub mod queue;
pub mod reconcile;
pub mod restic;
pub mod volume;
