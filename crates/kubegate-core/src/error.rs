//! Error types for kubegate-core.

use thiserror::Error;
use uuid::Uuid;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// The caller supplied a cluster hash that does not match the
    /// kubeconfig/context it was sent with.
    #[error("cluster hash mismatch: expected {expected}, got {provided}")]
    HashMismatch {
        /// Hash recomputed from the supplied kubeconfig and context
        expected: String,
        /// Hash the caller sent
        provided: String,
    },

    /// A bare cluster hash was presented but the registry has no entry for
    /// it. Happens after a helper restart; the caller must resend the
    /// kubeconfig and context.
    #[error(
        "cluster hash {hash} not found in registry; resend kubeconfig and context in the request"
    )]
    UnknownClusterHash {
        /// The unresolvable hash
        hash: String,
    },

    /// External binary could not be resolved from the effective PATH
    #[error("{0} not found in PATH")]
    BinaryNotFound(String),

    /// OS-level failure to start a child process
    #[error("failed to spawn {program}: {source}")]
    SpawnFailed {
        /// Program that failed to start
        program: String,
        /// Underlying OS error
        #[source]
        source: std::io::Error,
    },

    /// Session id lookup failed
    #[error("session {0} not found")]
    SessionNotFound(Uuid),

    /// Input was sent to a session that has no stdin pipe
    #[error("session does not support input")]
    InputNotSupported,

    /// A command exceeded its deadline
    #[error("command timed out after {0} seconds")]
    Timeout(u64),

    /// File system I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
