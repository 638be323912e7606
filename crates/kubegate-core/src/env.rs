//! One-time capture of the user's login shell environment.
//!
//! The daemon is started by a service manager with a minimal environment,
//! but the `kubectl` plugins and credential helpers it spawns live in the
//! user's Homebrew/gcloud/asdf PATH. Loading a login+interactive shell once
//! and memoizing the merged result gives children the environment the user
//! sees in a terminal.

use std::collections::HashMap;

use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

static SHELL_ENV: OnceCell<HashMap<String, String>> = OnceCell::const_new();

/// Variables where the shell's value wins over the daemon's own.
const IMPORTANT_VARS: [&str; 11] = [
    "PATH",
    "HOME",
    "USER",
    "SHELL",
    "LANG",
    "LC_ALL",
    "KUBECONFIG",
    "GOOGLE_APPLICATION_CREDENTIALS",
    "AWS_PROFILE",
    "AWS_REGION",
    "AWS_DEFAULT_REGION",
];

/// The merged child environment, loaded on first use and cached for the
/// life of the process.
pub async fn shell_environment() -> &'static HashMap<String, String> {
    SHELL_ENV
        .get_or_init(|| async {
            let base: HashMap<String, String> = std::env::vars().collect();

            let merged = match load_shell_environment().await {
                Some(shell_env) if !shell_env.is_empty() => merge(base, shell_env),
                _ => base,
            };

            if let Some(path) = merged.get("PATH") {
                info!(path = %path, "loaded shell environment");
            }
            merged
        })
        .await
}

/// Load the environment from the user's login shell.
async fn load_shell_environment() -> Option<HashMap<String, String>> {
    let shell = std::env::var("SHELL").unwrap_or_else(|_| "/bin/zsh".to_string());

    // -l loads profile files, -i loads rc files. Try both together first
    // for the most complete environment, then fall back to login-only.
    for flags in [&["-l", "-i", "-c", "env"][..], &["-l", "-c", "env"][..]] {
        let output = Command::new(&shell).args(flags).output().await;
        match output {
            Ok(out) if out.status.success() => {
                let listing = String::from_utf8_lossy(&out.stdout);
                let env = parse_env_listing(&listing);
                debug!(shell = %shell, vars = env.len(), "loaded shell environment listing");
                return Some(env);
            }
            Ok(_) | Err(_) => {
                warn!(shell = %shell, flags = ?flags, "failed to load shell environment, retrying with fewer flags");
            }
        }
    }

    warn!(shell = %shell, "could not load shell environment, using daemon environment");
    None
}

/// Parse `env` output into a map, skipping blank lines and anything that
/// does not look like an assignment (shell init noise).
fn parse_env_listing(listing: &str) -> HashMap<String, String> {
    listing
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() {
                return None;
            }
            line.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
        })
        .collect()
}

/// Merge the shell environment over the daemon's own.
///
/// Shell values win for the allowlisted variables; shell-only variables are
/// added; everything else keeps the daemon's value.
fn merge(
    mut base: HashMap<String, String>,
    shell: HashMap<String, String>,
) -> HashMap<String, String> {
    for key in IMPORTANT_VARS {
        if let Some(value) = shell.get(key) {
            base.insert(key.to_string(), value.clone());
        }
    }

    for (key, value) in shell {
        base.entry(key).or_insert(value);
    }

    base
}
