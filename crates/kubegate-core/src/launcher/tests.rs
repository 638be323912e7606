use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use super::*;
use crate::session::{SessionBinding, SessionKind, SessionManager, SessionStatus};

async fn wait_until_stopped(session: &Arc<Session>) {
    for _ in 0..100 {
        if session.status().await != SessionStatus::Running {
            return;
        }
        sleep(Duration::from_millis(50)).await;
    }
    panic!("session {} never stopped", session.id);
}

fn shell_spec(command: &str) -> LaunchSpec {
    LaunchSpec {
        program: "/bin/sh".to_string(),
        args: vec!["-c".to_string(), command.to_string()],
        ..Default::default()
    }
}

#[tokio::test]
async fn captures_output_and_exit_code() {
    let manager = SessionManager::new();
    let session = manager
        .create(SessionKind::Shell, SessionBinding::default())
        .await;

    launch(&session, shell_spec("echo hello")).await.unwrap();
    wait_until_stopped(&session).await;

    assert_eq!(session.status().await, SessionStatus::Stopped);
    assert_eq!(session.exit_code().await, Some(0));
    assert!(session.read_output().await.contains("hello"));
    manager.shutdown().await;
}

#[tokio::test]
async fn records_nonzero_exit_code() {
    let manager = SessionManager::new();
    let session = manager
        .create(SessionKind::Shell, SessionBinding::default())
        .await;

    launch(&session, shell_spec("exit 3")).await.unwrap();
    wait_until_stopped(&session).await;

    assert_eq!(session.exit_code().await, Some(3));
    manager.shutdown().await;
}

#[tokio::test]
async fn captures_stderr_too() {
    let manager = SessionManager::new();
    let session = manager
        .create(SessionKind::Shell, SessionBinding::default())
        .await;

    launch(&session, shell_spec("echo out; echo err 1>&2")).await.unwrap();
    wait_until_stopped(&session).await;

    let output = session.read_output().await;
    assert!(output.contains("out"));
    assert!(output.contains("err"));
    manager.shutdown().await;
}

#[tokio::test]
async fn missing_binary_marks_session_failed() {
    let manager = SessionManager::new();
    let session = manager
        .create(SessionKind::Shell, SessionBinding::default())
        .await;

    let spec = LaunchSpec {
        program: "kubegate-no-such-binary".to_string(),
        ..Default::default()
    };
    let err = launch(&session, spec).await.unwrap_err();

    assert!(matches!(err, Error::BinaryNotFound(_)));
    assert_eq!(session.status().await, SessionStatus::Failed);
    manager.shutdown().await;
}

// Consecutive reads must observe a monotonically growing prefix.
#[tokio::test]
async fn output_grows_monotonically() {
    let manager = SessionManager::new();
    let session = manager
        .create(SessionKind::Shell, SessionBinding::default())
        .await;

    launch(&session, shell_spec("echo one; sleep 0.3; echo two"))
        .await
        .unwrap();

    sleep(Duration::from_millis(150)).await;
    let first = session.read_output().await;
    wait_until_stopped(&session).await;
    let second = session.read_output().await;

    assert!(second.starts_with(&first), "{second:?} does not extend {first:?}");
    assert!(second.contains("one"));
    assert!(second.contains("two"));
    manager.shutdown().await;
}

#[tokio::test]
async fn stdin_sink_reaches_the_child() {
    let manager = SessionManager::new();
    let session = manager
        .create(SessionKind::Exec, SessionBinding::default())
        .await;

    let spec = LaunchSpec {
        program: "/bin/cat".to_string(),
        attach_stdin: true,
        ..Default::default()
    };
    launch(&session, spec).await.unwrap();

    assert!(session.supports_input().await);
    session.write_input("ping\n").await.unwrap();

    let mut echoed = String::new();
    for _ in 0..20 {
        sleep(Duration::from_millis(50)).await;
        echoed = session.read_output().await;
        if echoed.contains("ping") {
            break;
        }
    }
    assert!(echoed.contains("ping"));

    manager.stop(session.id).await;
    assert!(manager.get(session.id).await.is_none());
    manager.shutdown().await;
}

#[tokio::test]
async fn kubeconfig_file_lives_while_the_child_runs() {
    let manager = SessionManager::new();
    let session = manager
        .create(SessionKind::Shell, SessionBinding::default())
        .await;

    let spec = LaunchSpec {
        kubeconfig: "apiVersion: v1\nkind: Config".to_string(),
        ..shell_spec("sleep 10")
    };
    launch(&session, spec).await.unwrap();

    let temp_files = session.temp_files().await;
    assert_eq!(temp_files.len(), 1);
    let path = temp_files[0].clone();
    assert!(path.exists());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    manager.stop(session.id).await;
    assert!(!path.exists(), "temp kubeconfig survived teardown");
    assert!(manager.get(session.id).await.is_none());
    manager.shutdown().await;
}

#[tokio::test]
async fn kubeconfig_file_is_unlinked_after_natural_exit() {
    let manager = SessionManager::new();
    let session = manager
        .create(SessionKind::Shell, SessionBinding::default())
        .await;

    let spec = LaunchSpec {
        kubeconfig: "apiVersion: v1".to_string(),
        ..shell_spec("true")
    };
    launch(&session, spec).await.unwrap();
    let path = session.temp_files().await[0].clone();

    wait_until_stopped(&session).await;
    sleep(Duration::from_millis(100)).await;

    assert!(!path.exists(), "monitor did not unlink the temp kubeconfig");
    // The list is cleared so session teardown cannot double-unlink.
    assert!(session.temp_files().await.is_empty());
    manager.shutdown().await;
}

#[tokio::test]
async fn resolve_program_accepts_paths_verbatim() {
    let env = std::collections::HashMap::new();
    let path = resolve_program("/bin/sh", &env).unwrap();
    assert_eq!(path, std::path::PathBuf::from("/bin/sh"));
}
