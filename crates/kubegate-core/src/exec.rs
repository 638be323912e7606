//! One-shot command execution with captured output.
//!
//! Backs the `/kubectl` and `/exec-auth` pass-through endpoints and the
//! synchronous pod-exec path. Unlike [`crate::launcher`], nothing here
//! outlives the request: the child runs under a deadline, its output is
//! captured in full, and any materialized kubeconfig is unlinked when the
//! call returns.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::env::shell_environment;
use crate::error::{Error, Result};
use crate::launcher::{resolve_program, write_kubeconfig};

/// Captured stdout/stderr of a finished one-shot command.
#[derive(Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Result of a deadline-bounded run with combined output.
#[derive(Debug)]
pub struct CapturedRun {
    /// Interleaved stdout + stderr, everything captured up to exit or
    /// deadline.
    pub output: String,
    pub exit_code: i32,
    pub timed_out: bool,
}

/// Run `kubectl <args>` and capture stdout/stderr separately.
///
/// A non-empty context is injected as a leading `--context` flag; a
/// non-empty kubeconfig is materialized for the duration of the call. On
/// deadline expiry the child is killed and the output reports exit code -1.
pub async fn run_kubectl(
    args: &[String],
    kubeconfig: &str,
    context: &str,
    deadline: Duration,
) -> Result<CommandOutput> {
    let env = shell_environment().await;
    let program = resolve_program("kubectl", env)?;

    let mut full_args: Vec<String> = Vec::with_capacity(args.len() + 2);
    if !context.is_empty() {
        full_args.push("--context".to_string());
        full_args.push(context.to_string());
    }
    full_args.extend_from_slice(args);

    let temp = materialize(kubeconfig, "oneshot")?;

    let mut cmd = Command::new(&program);
    cmd.args(&full_args)
        .env_clear()
        .envs(env)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);
    if let Some(temp) = &temp {
        cmd.env("KUBECONFIG", &temp.path);
    }

    debug!(args = ?full_args, "executing kubectl");

    let child = cmd.spawn().map_err(|source| Error::SpawnFailed {
        program: "kubectl".to_string(),
        source,
    })?;

    match tokio::time::timeout(deadline, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        }),
        Ok(Err(err)) => Err(err.into()),
        Err(_) => Ok(CommandOutput {
            stdout: String::new(),
            stderr: format!("command timed out after {} seconds", deadline.as_secs()),
            exit_code: -1,
        }),
    }
}

/// Run an arbitrary binary (exec-credential helpers) with extra environment
/// entries on top of the shell snapshot.
pub async fn run_command(
    program: &str,
    args: &[String],
    extra_env: &HashMap<String, String>,
    deadline: Duration,
) -> Result<CommandOutput> {
    let env = shell_environment().await;
    let program_path = resolve_program(program, env)?;

    let mut cmd = Command::new(&program_path);
    cmd.args(args)
        .env_clear()
        .envs(env)
        .envs(extra_env)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true);

    debug!(program = %program, args = ?args, "executing command");

    let child = cmd.spawn().map_err(|source| Error::SpawnFailed {
        program: program.to_string(),
        source,
    })?;

    match tokio::time::timeout(deadline, child.wait_with_output()).await {
        Ok(Ok(output)) => Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        }),
        Ok(Err(err)) => Err(err.into()),
        Err(_) => Ok(CommandOutput {
            stdout: String::new(),
            stderr: format!("command timed out after {} seconds", deadline.as_secs()),
            exit_code: -1,
        }),
    }
}

/// Run a program with combined stdout+stderr under a hard deadline.
///
/// The child runs in its own process group; when the deadline fires the
/// whole group is killed and whatever output was captured so far is
/// returned with `timed_out = true`.
pub async fn run_captured(
    program: &str,
    args: &[String],
    kubeconfig: &str,
    deadline: Duration,
) -> Result<CapturedRun> {
    let env = shell_environment().await;
    let program_path = resolve_program(program, env)?;

    let temp = materialize(kubeconfig, "exec")?;

    let mut cmd = Command::new(&program_path);
    cmd.args(args)
        .env_clear()
        .envs(env)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .process_group(0);
    if let Some(temp) = &temp {
        cmd.env("KUBECONFIG", &temp.path);
    }

    let mut child = cmd.spawn().map_err(|source| Error::SpawnFailed {
        program: program.to_string(),
        source,
    })?;

    let pid = child.id();
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let out_pump = child.stdout.take().map(|r| pump_into(Arc::clone(&buffer), r));
    let err_pump = child.stderr.take().map(|r| pump_into(Arc::clone(&buffer), r));

    let (exit_code, timed_out) = match tokio::time::timeout(deadline, child.wait()).await {
        Ok(Ok(status)) => (status.code().unwrap_or(-1), false),
        Ok(Err(err)) => {
            warn!(%err, "failed to wait for exec child");
            (-1, false)
        }
        Err(_) => {
            if let Some(pid) = pid {
                if let Err(err) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                    warn!(%err, "failed to kill exec process group");
                }
            }
            let _ = child.wait().await;
            (-1, true)
        }
    };

    // Pick up trailing output before reporting.
    let _ = tokio::time::timeout(Duration::from_millis(100), async {
        if let Some(pump) = out_pump {
            let _ = pump.await;
        }
        if let Some(pump) = err_pump {
            let _ = pump.await;
        }
    })
    .await;

    let output = String::from_utf8_lossy(&buffer.lock().await).into_owned();
    Ok(CapturedRun {
        output,
        exit_code,
        timed_out,
    })
}

fn pump_into<R>(buffer: Arc<Mutex<Vec<u8>>>, mut reader: R) -> JoinHandle<()>
where
    R: AsyncReadExt + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => buffer.lock().await.extend_from_slice(&chunk[..n]),
            }
        }
    })
}

/// A kubeconfig file that lives only for the duration of one call.
struct TempKubeconfig {
    path: PathBuf,
}

impl Drop for TempKubeconfig {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn materialize(kubeconfig: &str, tag: &str) -> Result<Option<TempKubeconfig>> {
    if kubeconfig.is_empty() {
        return Ok(None);
    }
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let path = std::env::temp_dir().join(format!("kubeconfig-{tag}-{nanos}"));
    write_kubeconfig(&path, kubeconfig)?;
    Ok(Some(TempKubeconfig { path }))
}
