//! Integration tests for the KubeGate helper
//!
//! These tests verify the integration between the core pieces:
//! - cluster identity feeding the port allocator
//! - the session store supervising real child processes via the launcher
//! - teardown leaving no process or temp file behind

use std::time::Duration;

use kubegate_core::{
    assign_port, compute_hash, launch, ClusterRegistry, LaunchSpec, SessionBinding, SessionKind,
    SessionManager, SessionStatus,
};

// ============================================================================
// Cluster identity → port allocator
// ============================================================================

#[test]
fn computed_hashes_map_into_the_proxy_port_range() {
    let corpus = [
        ("apiVersion: v1\nclusters:\n- name: prod", "prod"),
        ("apiVersion: v1\nclusters:\n- name: dev", "dev"),
        ("", "minikube"),
        ("some config", ""),
    ];

    for (kubeconfig, context) in corpus {
        let hash = compute_hash(kubeconfig, context);
        let port = assign_port(&hash);
        assert!(
            (47824..=57823).contains(&port),
            "port {port} for hash {hash} out of range"
        );
        // Deterministic end to end.
        assert_eq!(assign_port(&compute_hash(kubeconfig, context)), port);
    }
}

#[tokio::test]
async fn registry_round_trip_preserves_the_identity_used_for_sessions() {
    let registry = ClusterRegistry::new();
    let resolved = registry
        .resolve("", "apiVersion: v1\nkind: Config", "staging")
        .await
        .unwrap();

    // A later hash-only request (e.g. forwarding a stream) resolves to the
    // same identity.
    let later = registry.resolve(&resolved.hash, "", "").await.unwrap();
    assert_eq!(later.kubeconfig, "apiVersion: v1\nkind: Config");
    assert_eq!(later.context, "staging");
    assert_eq!(later.hash, resolved.hash);
}

// ============================================================================
// Session store + launcher
// ============================================================================

#[tokio::test]
async fn supervised_session_full_lifecycle() {
    let manager = SessionManager::new();
    let hash = compute_hash("integration config", "integration");

    let session = manager
        .create(
            SessionKind::Shell,
            SessionBinding {
                cluster_hash: hash.clone(),
                context: "integration".to_string(),
                shell_command: "echo lifecycle".to_string(),
                ..Default::default()
            },
        )
        .await;

    launch(
        &session,
        LaunchSpec {
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), "echo lifecycle".to_string()],
            kubeconfig: "apiVersion: v1".to_string(),
            attach_stdin: false,
        },
    )
    .await
    .unwrap();

    let temp_file = session.temp_files().await[0].clone();
    assert!(temp_file.exists());

    // The store sees the session under both its id and its cluster hash.
    assert!(manager.get(session.id).await.is_some());
    assert_eq!(manager.find_by_cluster_hash(&hash).await.len(), 1);
    assert!(manager
        .get_with_cluster_validation(session.id, "some-other-hash")
        .await
        .is_none());

    // Wait for the monitor to finish the session.
    for _ in 0..100 {
        if session.status().await != SessionStatus::Running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert_eq!(session.status().await, SessionStatus::Stopped);
    assert_eq!(session.exit_code().await, Some(0));
    assert!(session.read_output().await.contains("lifecycle"));
    assert!(!temp_file.exists(), "temp kubeconfig not unlinked on exit");

    manager.stop(session.id).await;
    assert!(manager.get(session.id).await.is_none());
    assert!(manager.find_by_cluster_hash(&hash).await.is_empty());
    manager.shutdown().await;
}

#[tokio::test]
async fn stopping_a_long_running_session_kills_the_child() {
    let manager = SessionManager::new();
    let session = manager
        .create(SessionKind::PortForward, SessionBinding::default())
        .await;

    launch(
        &session,
        LaunchSpec {
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), "sleep 60".to_string()],
            kubeconfig: String::new(),
            attach_stdin: false,
        },
    )
    .await
    .unwrap();

    manager.stop(session.id).await;
    assert!(manager.get(session.id).await.is_none());

    // The monitor reaps the killed child and records a signal exit.
    for _ in 0..100 {
        if session.exit_code().await.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(session.exit_code().await, Some(-1));
    manager.shutdown().await;
}
