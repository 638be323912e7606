//! Cluster identity: deterministic hashing and the hash registry.
//!
//! The cluster hash is the app's handle to "which cluster" for every call
//! after the first one. The registry lets short calls (forwarding a stream,
//! polling output) omit bulky kubeconfig payloads and send only the hash.

mod hash;
mod registry;

pub use hash::{compute_hash, validate_hash};
pub use registry::{ClusterInfo, ClusterRegistry, ResolvedCluster};

#[cfg(test)]
mod tests;
