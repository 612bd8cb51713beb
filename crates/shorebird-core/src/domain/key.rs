use serde::{Deserialize, Serialize};
use std::fmt;

use thiserror::Error;

/// A malformed `"namespace/name"` key.
#[derive(Debug, Error)]
#[error("invalid object key {0:?}, expected namespace/name")]
pub struct InvalidKey(pub String);

/// Identity of an object in the shared store: namespace plus name.
///
/// Keys travel through the work queue as values; equality and hashing are
/// what the queue's dedup set relies on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parses `"namespace/name"`. Both parts must be non-empty.
    pub fn parse(s: &str) -> Result<Self, InvalidKey> {
        match s.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(ns, name))
            }
            _ => Err(InvalidKey(s.to_string())),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
