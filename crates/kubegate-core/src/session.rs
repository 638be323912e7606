//! Session store: supervised child processes and their lifecycle.
//!
//! A session is the daemon's record of one supervised child (`kubectl
//! port-forward`, `kubectl exec`, `kubectl proxy`, or a bash command): its
//! cluster binding, output buffer, stdin pipe, temp files, and exit state.
//! The [`SessionManager`] owns the map of live sessions and runs a
//! background evictor that removes completed sessions after a grace period
//! and force-stops sessions nobody is reading from.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::{oneshot, Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};

/// The type of supervised process behind a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionKind {
    PortForward,
    Exec,
    Proxy,
    Shell,
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionKind::PortForward => "port-forward",
            SessionKind::Exec => "exec",
            SessionKind::Proxy => "proxy",
            SessionKind::Shell => "shell",
        };
        f.write_str(s)
    }
}

/// Session lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Stopped,
    Failed,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Running => "running",
            SessionStatus::Stopped => "stopped",
            SessionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Everything a session is bound to at creation. Immutable afterwards; in
/// particular the cluster hash never changes for the life of the session.
#[derive(Debug, Clone, Default)]
pub struct SessionBinding {
    pub cluster_hash: String,
    pub context: String,
    pub kubeconfig: String,

    // port-forward
    pub namespace: String,
    pub resource_type: String,
    pub resource_name: String,
    pub service_port: String,
    pub local_port: String,

    // exec
    pub pod_name: String,
    pub container: String,
    pub command: Vec<String>,

    // shell
    pub shell_command: String,

    // proxy
    pub port: u16,
}

/// Write-end of a session's stdin pipe, held by the session until teardown.
#[derive(Clone)]
pub struct StdinSink {
    inner: Arc<Mutex<ChildStdin>>,
}

impl StdinSink {
    pub(crate) fn new(stdin: ChildStdin) -> Self {
        Self {
            inner: Arc::new(Mutex::new(stdin)),
        }
    }

    /// Write bytes to the child's stdin.
    pub async fn write(&self, bytes: &[u8]) -> Result<()> {
        let mut stdin = self.inner.lock().await;
        stdin.write_all(bytes).await?;
        stdin.flush().await?;
        Ok(())
    }
}

/// Mutable session state, guarded as one unit.
#[derive(Debug)]
struct Mutable {
    status: SessionStatus,
    exit_code: Option<i32>,
    last_read_at: DateTime<Utc>,
    pid: Option<u32>,
    temp_files: Vec<PathBuf>,
}

/// One supervised child process and its I/O.
pub struct Session {
    pub id: Uuid,
    pub kind: SessionKind,
    pub started_at: DateTime<Utc>,
    pub binding: SessionBinding,

    state: RwLock<Mutable>,
    output: RwLock<Vec<u8>>,
    stdin: RwLock<Option<StdinSink>>,
}

impl Session {
    fn new(kind: SessionKind, binding: SessionBinding) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            started_at: now,
            binding,
            state: RwLock::new(Mutable {
                status: SessionStatus::Running,
                exit_code: None,
                last_read_at: now,
                pid: None,
                temp_files: Vec::new(),
            }),
            output: RwLock::new(Vec::new()),
            stdin: RwLock::new(None),
        }
    }

    pub async fn status(&self) -> SessionStatus {
        self.state.read().await.status
    }

    pub async fn exit_code(&self) -> Option<i32> {
        self.state.read().await.exit_code
    }

    pub async fn last_read_at(&self) -> DateTime<Utc> {
        self.state.read().await.last_read_at
    }

    /// Read the full accumulated output and mark the session active.
    ///
    /// Semantics are "everything so far, every time": the buffer is
    /// append-only while the session lives, so consecutive reads observe a
    /// monotonically growing prefix.
    pub async fn read_output(&self) -> String {
        let output = String::from_utf8_lossy(&self.output.read().await).into_owned();
        self.state.write().await.last_read_at = Utc::now();
        output
    }

    /// Append child output. Called by the stdout/stderr pumps.
    pub(crate) async fn append_output(&self, bytes: &[u8]) {
        self.output.write().await.extend_from_slice(bytes);
    }

    /// Write input to the child's stdin pipe, if this session has one.
    pub async fn write_input(&self, input: &str) -> Result<()> {
        let sink = self
            .stdin
            .read()
            .await
            .clone()
            .ok_or(Error::InputNotSupported)?;
        sink.write(input.as_bytes()).await
    }

    pub async fn supports_input(&self) -> bool {
        self.stdin.read().await.is_some()
    }

    pub(crate) async fn set_stdin(&self, sink: StdinSink) {
        *self.stdin.write().await = Some(sink);
    }

    pub(crate) async fn record_spawn(&self, pid: Option<u32>) {
        self.state.write().await.pid = pid;
    }

    pub(crate) async fn push_temp_file(&self, path: PathBuf) {
        self.state.write().await.temp_files.push(path);
    }

    /// Snapshot of the temp files registered for this session. Exposed for
    /// teardown verification in tests.
    pub async fn temp_files(&self) -> Vec<PathBuf> {
        self.state.read().await.temp_files.clone()
    }

    pub(crate) async fn set_status(&self, status: SessionStatus) {
        self.state.write().await.status = status;
    }

    /// Mark the session failed before or during launch.
    pub(crate) async fn mark_failed(&self) {
        self.state.write().await.status = SessionStatus::Failed;
    }

    /// Final transition run by the monitor after the child has been reaped:
    /// record the exit code, unlink temp files eagerly, and clear the list
    /// so session-level teardown does not unlink them a second time.
    pub(crate) async fn finish(&self, exit_code: i32) {
        let temp_files = {
            let mut state = self.state.write().await;
            state.exit_code = Some(exit_code);
            state.status = SessionStatus::Stopped;
            std::mem::take(&mut state.temp_files)
        };
        unlink_all(self.id, &temp_files);
        info!(session_id = %self.id, kind = %self.kind, exit_code, "session process exited");
    }

    /// Send SIGKILL to the child if it is still running. Errors (already
    /// reaped, already dead) are logged and ignored.
    async fn kill_process(&self) {
        let (status, pid) = {
            let state = self.state.read().await;
            (state.status, state.pid)
        };
        if status != SessionStatus::Running {
            return;
        }
        if let Some(pid) = pid {
            if let Err(err) = kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                warn!(session_id = %self.id, %err, "failed to kill process");
            }
        }
    }

    /// Teardown path shared by explicit stop, mass cleanup, and eviction:
    /// kill the child, mark stopped, unlink any temp files the monitor has
    /// not already handled. Idempotent.
    async fn teardown(&self) {
        self.kill_process().await;
        let temp_files = {
            let mut state = self.state.write().await;
            if state.status == SessionStatus::Running {
                state.status = SessionStatus::Stopped;
            }
            std::mem::take(&mut state.temp_files)
        };
        unlink_all(self.id, &temp_files);
    }
}

fn unlink_all(session_id: Uuid, paths: &[PathBuf]) {
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => debug!(session_id = %session_id, path = %path.display(), "removed temp file"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(session_id = %session_id, path = %path.display(), %err, "failed to remove temp file");
            }
        }
    }
}

/// Timeouts governing session eviction.
#[derive(Debug, Clone, Copy)]
pub struct SessionTimeouts {
    /// Running sessions with no reads for this long are force-stopped.
    pub inactivity: Duration,
    /// Stopped/failed sessions linger this long so clients can collect
    /// trailing output and exit codes.
    pub completed: Duration,
    /// Evictor wake-up period.
    pub cleanup_interval: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            inactivity: Duration::from_secs(30 * 60),
            completed: Duration::from_secs(5 * 60),
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

/// Registry of all live sessions plus the background evictor.
pub struct SessionManager {
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
    timeouts: SessionTimeouts,
    evictor_stop: Mutex<Option<oneshot::Sender<()>>>,
}

impl SessionManager {
    /// Create a manager with default timeouts and start its evictor.
    pub fn new() -> Arc<Self> {
        Self::with_timeouts(SessionTimeouts::default())
    }

    /// Create a manager with explicit timeouts and start its evictor.
    pub fn with_timeouts(timeouts: SessionTimeouts) -> Arc<Self> {
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let manager = Arc::new(Self {
            sessions: RwLock::new(HashMap::new()),
            timeouts,
            evictor_stop: Mutex::new(Some(stop_tx)),
        });

        let evictor = Arc::clone(&manager);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(evictor.timeouts.cleanup_interval);
            // The first tick completes immediately; skip it so the first
            // sweep happens one full interval after startup.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => evictor.evict_expired().await,
                    _ = &mut stop_rx => break,
                }
            }
            debug!("session evictor stopped");
        });

        manager
    }

    /// Stop the evictor. Called first during graceful shutdown so no new
    /// kills race with the shutdown path.
    pub async fn shutdown(&self) {
        if let Some(tx) = self.evictor_stop.lock().await.take() {
            let _ = tx.send(());
        }
    }

    /// Create and register a session. The binding (including the cluster
    /// hash) is fixed here for the life of the session.
    pub async fn create(&self, kind: SessionKind, binding: SessionBinding) -> Arc<Session> {
        let session = Arc::new(Session::new(kind, binding));
        self.sessions
            .write()
            .await
            .insert(session.id, Arc::clone(&session));
        info!(session_id = %session.id, kind = %kind, "session created");
        session
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&id).cloned()
    }

    /// Get a session only if its stored cluster hash matches the expected
    /// one. A mismatch is reported as "not found" so callers cannot probe
    /// for sessions of other clusters.
    pub async fn get_with_cluster_validation(
        &self,
        id: Uuid,
        expected_hash: &str,
    ) -> Option<Arc<Session>> {
        let session = self.get(id).await?;
        if session.binding.cluster_hash != expected_hash {
            warn!(
                session_id = %id,
                provided_hash = %expected_hash,
                session_hash = %session.binding.cluster_hash,
                "session cluster hash mismatch"
            );
            return None;
        }
        Some(session)
    }

    /// All sessions of a given kind.
    pub async fn list(&self, kind: SessionKind) -> Vec<Arc<Session>> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.kind == kind)
            .cloned()
            .collect()
    }

    /// All sessions bound to a cluster hash, regardless of kind.
    pub async fn find_by_cluster_hash(&self, cluster_hash: &str) -> Vec<Arc<Session>> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| s.binding.cluster_hash == cluster_hash)
            .cloned()
            .collect()
    }

    /// Kill the session's process, clean up its temp files, and remove it.
    /// A missing id is not an error (already stopped).
    pub async fn stop(&self, id: Uuid) {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(&id).cloned() {
            session.teardown().await;
            sessions.remove(&id);
            info!(session_id = %id, "session stopped");
        }
    }

    /// Stop every session. Used on graceful shutdown.
    pub async fn stop_all(&self) {
        let mut sessions = self.sessions.write().await;
        for session in sessions.values() {
            session.teardown().await;
        }
        sessions.clear();
        info!("all sessions stopped");
    }

    /// Stop every session bound to a cluster hash. Returns how many were
    /// removed.
    pub async fn cleanup_by_cluster_hash(&self, cluster_hash: &str) -> usize {
        let mut sessions = self.sessions.write().await;
        let ids: Vec<Uuid> = sessions
            .values()
            .filter(|s| s.binding.cluster_hash == cluster_hash)
            .map(|s| s.id)
            .collect();

        for id in &ids {
            if let Some(session) = sessions.get(id).cloned() {
                session.teardown().await;
                sessions.remove(id);
            }
        }

        ids.len()
    }

    /// One evictor sweep: remove completed sessions past their linger
    /// window and force-stop sessions nobody has read from in too long.
    async fn evict_expired(&self) {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;

        let mut expired: Vec<(Uuid, &'static str)> = Vec::new();
        for session in sessions.values() {
            let (status, last_read_at) = {
                let state = session.state.read().await;
                (state.status, state.last_read_at)
            };
            let idle = (now - last_read_at).to_std().unwrap_or_default();

            let completed = matches!(status, SessionStatus::Stopped | SessionStatus::Failed);
            if completed && idle > self.timeouts.completed {
                expired.push((session.id, "completed session timeout"));
            } else if !completed && idle > self.timeouts.inactivity {
                expired.push((session.id, "inactivity timeout"));
            }
        }

        for (id, reason) in &expired {
            if let Some(session) = sessions.get(id).cloned() {
                info!(
                    session_id = %id,
                    kind = %session.kind,
                    reason,
                    age_secs = (now - session.started_at).num_seconds(),
                    "evicting session"
                );
                session.teardown().await;
                sessions.remove(id);
            }
        }

        if !expired.is_empty() {
            info!(removed = expired.len(), remaining = sessions.len(), "eviction sweep completed");
        }
    }
}
