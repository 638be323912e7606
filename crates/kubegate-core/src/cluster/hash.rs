use sha2::{Digest, Sha256};

/// Compute the deterministic hash identifying a cluster.
///
/// The hash is the first 16 hex characters of the SHA-256 of
/// `kubeconfig + ":" + context`. Returns the empty string when both inputs
/// are empty (no cluster specified). Requests carrying this hash are never
/// routed to a cluster whose identity hashes differently.
pub fn compute_hash(kubeconfig: &str, context: &str) -> String {
    if kubeconfig.is_empty() && context.is_empty() {
        return String::new();
    }

    let mut hasher = Sha256::new();
    hasher.update(kubeconfig.as_bytes());
    hasher.update(b":");
    hasher.update(context.as_bytes());
    let digest = hasher.finalize();

    // 16 hex chars (64 bits) is the accepted isolation boundary.
    let mut hash = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        hash.push_str(&format!("{:02x}", byte));
    }
    hash
}

/// Validate that a caller-provided hash matches the hash computed from the
/// kubeconfig and context it arrived with.
pub fn validate_hash(provided: &str, kubeconfig: &str, context: &str) -> bool {
    let expected = compute_hash(kubeconfig, context);

    // No hash provided and none expected: valid (no cluster specified).
    if provided.is_empty() && expected.is_empty() {
        return true;
    }

    provided == expected
}
