//! Port traits: the seams between the reconciler and its collaborators.
//!
//! Production wires these to a real cluster store and the actual copy
//! tool; tests and the demo binary wire them to in-memory and scripted
//! implementations.

mod cache;
mod copier;
mod credentials;
mod events;
mod store;

pub use cache::ClusterCache;
pub use copier::{Copier, CopyRequest};
pub use credentials::{CredentialSource, TempCredentials};
pub use events::BackupEvents;
pub use store::BackupStore;
