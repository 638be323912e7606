use super::*;
use crate::error::Error;

#[test]
fn compute_hash_empty_inputs() {
    assert_eq!(compute_hash("", ""), "");
}

#[test]
fn compute_hash_length_and_charset() {
    let cases = [
        ("apiVersion: v1\nkind: Config", ""),
        ("", "prod-cluster"),
        ("apiVersion: v1\nkind: Config", "prod-cluster"),
    ];
    for (kubeconfig, context) in cases {
        let hash = compute_hash(kubeconfig, context);
        assert_eq!(hash.len(), 16, "hash for {:?}/{:?}", kubeconfig, context);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }
}

#[test]
fn compute_hash_deterministic() {
    let kubeconfig = "apiVersion: v1\nkind: Config";
    let context = "prod-cluster";
    assert_eq!(
        compute_hash(kubeconfig, context),
        compute_hash(kubeconfig, context)
    );
}

#[test]
fn compute_hash_distinct_inputs() {
    let h1 = compute_hash("config1", "context1");
    let h2 = compute_hash("config2", "context1");
    let h3 = compute_hash("config1", "context2");
    assert_ne!(h1, h2, "different kubeconfigs produced same hash");
    assert_ne!(h1, h3, "different contexts produced same hash");
    assert_ne!(h2, h3);
}

#[test]
fn validate_hash_cases() {
    let kubeconfig = "apiVersion: v1\nkind: Config";
    let context = "prod-cluster";
    let valid = compute_hash(kubeconfig, context);

    assert!(validate_hash(&valid, kubeconfig, context));
    assert!(!validate_hash("invalid", kubeconfig, context));
    assert!(validate_hash("", "", ""));
    assert!(!validate_hash("", kubeconfig, context));
    assert!(!validate_hash(&valid, "different config", context));
    assert!(!validate_hash(&valid, kubeconfig, "different-context"));
}

// Different clusters must never validate against each other's hash; a
// violation here would let responses cross cluster boundaries.
#[test]
fn cluster_isolation() {
    let prod_config = "apiVersion: v1\nclusters:\n- name: prod";
    let dev_config = "apiVersion: v1\nclusters:\n- name: dev";

    let prod_hash = compute_hash(prod_config, "prod");
    let dev_hash = compute_hash(dev_config, "dev");

    assert_ne!(prod_hash, dev_hash);
    assert!(!validate_hash(&prod_hash, dev_config, "dev"));
    assert!(!validate_hash(&dev_hash, prod_config, "prod"));
}

#[tokio::test]
async fn registry_register_and_lookup() {
    let registry = ClusterRegistry::new();
    registry.register("abc123", "kubeconfig-data", "my-context").await;

    let info = registry.lookup("abc123").await.expect("entry registered");
    assert_eq!(info.kubeconfig, "kubeconfig-data");
    assert_eq!(info.context, "my-context");

    assert!(registry.lookup("unknown").await.is_none());
    assert!(registry.lookup("").await.is_none());
}

#[tokio::test]
async fn registry_ignores_empty_hash() {
    let registry = ClusterRegistry::new();
    registry.register("", "kubeconfig-data", "ctx").await;
    assert!(registry.lookup("").await.is_none());
}

#[tokio::test]
async fn registry_reregistration_overwrites() {
    let registry = ClusterRegistry::new();
    registry.register("h1", "old", "old-ctx").await;
    registry.register("h1", "new", "new-ctx").await;

    let info = registry.lookup("h1").await.unwrap();
    assert_eq!(info.kubeconfig, "new");
    assert_eq!(info.context, "new-ctx");
}

#[tokio::test]
async fn resolve_computes_and_registers_when_hash_absent() {
    let registry = ClusterRegistry::new();
    let resolved = registry.resolve("", "my-config", "minikube").await.unwrap();

    assert_eq!(resolved.hash, compute_hash("my-config", "minikube"));
    assert_eq!(resolved.context, "minikube");

    // Subsequent hash-only call resolves through the registry.
    let again = registry.resolve(&resolved.hash, "", "").await.unwrap();
    assert_eq!(again.kubeconfig, "my-config");
    assert_eq!(again.context, "minikube");
}

#[tokio::test]
async fn resolve_rejects_mismatched_hash() {
    let registry = ClusterRegistry::new();
    let err = registry
        .resolve("0000000000000000", "my-config", "minikube")
        .await
        .unwrap_err();

    match err {
        Error::HashMismatch { expected, provided } => {
            assert_eq!(expected, compute_hash("my-config", "minikube"));
            assert_eq!(provided, "0000000000000000");
        }
        other => panic!("expected HashMismatch, got {other:?}"),
    }
}

#[tokio::test]
async fn resolve_unknown_bare_hash_is_an_error() {
    let registry = ClusterRegistry::new();
    let err = registry.resolve("deadbeefdeadbeef", "", "").await.unwrap_err();
    assert!(matches!(err, Error::UnknownClusterHash { .. }));
}

#[tokio::test]
async fn resolve_all_empty_is_the_empty_identity() {
    let registry = ClusterRegistry::new();
    let resolved = registry.resolve("", "", "").await.unwrap();
    assert_eq!(resolved.hash, "");
    assert_eq!(resolved.kubeconfig, "");
    assert_eq!(resolved.context, "");
}

#[tokio::test]
async fn resolve_valid_hash_registers_for_later_lookup() {
    let registry = ClusterRegistry::new();
    let hash = compute_hash("cfg", "ctx");

    registry.resolve(&hash, "cfg", "ctx").await.unwrap();

    let info = registry.lookup(&hash).await.expect("registered by resolve");
    assert_eq!(info.context, "ctx");
}
