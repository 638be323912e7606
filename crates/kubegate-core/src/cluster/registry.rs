use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::info;

use super::hash::compute_hash;
use crate::error::{Error, Result};

/// Kubeconfig and context stored for a cluster hash.
#[derive(Debug, Clone)]
pub struct ClusterInfo {
    pub kubeconfig: String,
    pub context: String,
}

/// Cluster identity resolved through the registry policy.
///
/// `hash` is always the hash the daemon will bind sessions to; the
/// kubeconfig and context are whatever the caller sent or the registry
/// remembered for that hash.
#[derive(Debug, Clone)]
pub struct ResolvedCluster {
    pub hash: String,
    pub kubeconfig: String,
    pub context: String,
}

/// Mapping of cluster hash to cluster info.
///
/// The registry never shrinks during the daemon's lifetime; entries are
/// idempotently re-registered on every request that carries or computes a
/// hash. Owned by the daemon state and injected into handlers.
#[derive(Debug, Default)]
pub struct ClusterRegistry {
    clusters: RwLock<HashMap<String, ClusterInfo>>,
}

impl ClusterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the cluster info for a hash. No-op for the empty hash.
    pub async fn register(&self, hash: &str, kubeconfig: &str, context: &str) {
        if hash.is_empty() {
            return;
        }

        self.clusters.write().await.insert(
            hash.to_string(),
            ClusterInfo {
                kubeconfig: kubeconfig.to_string(),
                context: context.to_string(),
            },
        );
    }

    /// Retrieve the cluster info for a hash.
    pub async fn lookup(&self, hash: &str) -> Option<ClusterInfo> {
        if hash.is_empty() {
            return None;
        }
        self.clusters.read().await.get(hash).cloned()
    }

    /// Resolve the cluster identity for a request.
    ///
    /// Policy, in order:
    /// 1. Hash only (no kubeconfig, no context): look it up in the registry.
    ///    A miss means the helper restarted since the app learned the hash —
    ///    the caller must resend kubeconfig and context.
    /// 2. No hash: compute it from kubeconfig/context and register.
    /// 3. Hash plus kubeconfig/context: recompute and require exact
    ///    equality, then register.
    pub async fn resolve(
        &self,
        hash: &str,
        kubeconfig: &str,
        context: &str,
    ) -> Result<ResolvedCluster> {
        if kubeconfig.is_empty() && context.is_empty() && !hash.is_empty() {
            let info = self
                .lookup(hash)
                .await
                .ok_or_else(|| Error::UnknownClusterHash {
                    hash: hash.to_string(),
                })?;
            info!(cluster_hash = %hash, context = %info.context, "resolved cluster from registry");
            return Ok(ResolvedCluster {
                hash: hash.to_string(),
                kubeconfig: info.kubeconfig,
                context: info.context,
            });
        }

        if hash.is_empty() {
            let computed = compute_hash(kubeconfig, context);
            self.register(&computed, kubeconfig, context).await;
            return Ok(ResolvedCluster {
                hash: computed,
                kubeconfig: kubeconfig.to_string(),
                context: context.to_string(),
            });
        }

        let expected = compute_hash(kubeconfig, context);
        if hash != expected {
            return Err(Error::HashMismatch {
                expected,
                provided: hash.to_string(),
            });
        }

        self.register(hash, kubeconfig, context).await;
        Ok(ResolvedCluster {
            hash: hash.to_string(),
            kubeconfig: kubeconfig.to_string(),
            context: context.to_string(),
        })
    }
}
