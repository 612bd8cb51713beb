//! In-memory port implementations for tests and the demo binary.

mod inmem;

pub use inmem::InMemoryCluster;
