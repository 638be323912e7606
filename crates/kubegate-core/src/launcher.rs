//! Process launcher: builds and starts supervised children.
//!
//! The launcher resolves the binary against the captured shell PATH, gives
//! the child the shell environment, materializes a per-session kubeconfig
//! file when one was supplied, wires stdout/stderr pumps into the session's
//! output buffer, and spawns a monitor that records the exit code and
//! unlinks the temp files once the child is gone. `kubectl` reads the
//! kubeconfig file lazily, so it must only be unlinked after wait completes.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::env::shell_environment;
use crate::error::{Error, Result};
use crate::session::{Session, StdinSink};

/// How long the monitor lets the output pumps drain after the child exits.
const PUMP_DRAIN_GRACE: Duration = Duration::from_millis(100);

/// What to launch for a session.
#[derive(Debug, Clone, Default)]
pub struct LaunchSpec {
    /// Program name (resolved via PATH) or absolute path.
    pub program: String,
    pub args: Vec<String>,
    /// Kubeconfig bytes to materialize for the child; empty means the
    /// child uses whatever `KUBECONFIG`/default the shell environment has.
    pub kubeconfig: String,
    /// Wire the child's stdin to the session as a write-input sink.
    pub attach_stdin: bool,
}

/// Start the child process for a session.
///
/// On failure the session is marked failed and the error returned; the
/// caller is responsible for removing the session from the store.
pub async fn launch(session: &Arc<Session>, spec: LaunchSpec) -> Result<()> {
    let env = shell_environment().await;

    let program_path = match resolve_program(&spec.program, env) {
        Ok(path) => path,
        Err(err) => {
            session.mark_failed().await;
            return Err(err);
        }
    };

    let mut cmd = Command::new(&program_path);
    cmd.args(&spec.args)
        .env_clear()
        .envs(env)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped());

    if spec.attach_stdin {
        cmd.stdin(std::process::Stdio::piped());
    } else {
        cmd.stdin(std::process::Stdio::null());
    }

    if !spec.kubeconfig.is_empty() {
        let path = std::env::temp_dir().join(format!("kubeconfig-{}", session.id));
        if let Err(err) = write_kubeconfig(&path, &spec.kubeconfig) {
            session.mark_failed().await;
            return Err(err.into());
        }
        cmd.env("KUBECONFIG", &path);
        session.push_temp_file(path.clone()).await;
        debug!(session_id = %session.id, path = %path.display(), "materialized session kubeconfig");
    }

    debug!(
        session_id = %session.id,
        program = %program_path.display(),
        args = ?spec.args,
        "launching session process"
    );

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(source) => {
            session.mark_failed().await;
            return Err(Error::SpawnFailed {
                program: spec.program,
                source,
            });
        }
    };

    session.record_spawn(child.id()).await;

    if spec.attach_stdin {
        if let Some(stdin) = child.stdin.take() {
            session.set_stdin(StdinSink::new(stdin)).await;
        }
    }

    let stdout_pump = child.stdout.take().map(|out| spawn_pump(Arc::clone(session), out));
    let stderr_pump = child.stderr.take().map(|err| spawn_pump(Arc::clone(session), err));

    let monitor_session = Arc::clone(session);
    tokio::spawn(async move {
        let status = child.wait().await;

        // Let the pumps pick up whatever the child flushed on the way out.
        let _ = tokio::time::timeout(PUMP_DRAIN_GRACE, async {
            if let Some(pump) = stdout_pump {
                let _ = pump.await;
            }
            if let Some(pump) = stderr_pump {
                let _ = pump.await;
            }
        })
        .await;

        let exit_code = match status {
            Ok(status) => status.code().unwrap_or(-1),
            Err(err) => {
                warn!(session_id = %monitor_session.id, %err, "failed to wait for session process");
                -1
            }
        };
        monitor_session.finish(exit_code).await;
    });

    Ok(())
}

/// Resolve a program name against the snapshot PATH. Paths containing a
/// separator are used as-is (`/bin/bash`).
pub(crate) fn resolve_program(program: &str, env: &HashMap<String, String>) -> Result<PathBuf> {
    if program.contains('/') {
        return Ok(PathBuf::from(program));
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("/"));
    which::which_in(program, env.get("PATH"), cwd)
        .map_err(|_| Error::BinaryNotFound(program.to_string()))
}

/// Write kubeconfig bytes to `path` with mode 0600.
pub(crate) fn write_kubeconfig(path: &Path, contents: &str) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents.as_bytes())
}

fn spawn_pump<R>(session: Arc<Session>, mut reader: R) -> JoinHandle<()>
where
    R: AsyncReadExt + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = [0u8; 4096];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => session.append_output(&buf[..n]).await,
            }
        }
    })
}

#[cfg(test)]
mod tests;
