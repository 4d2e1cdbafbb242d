//! Process supervisor: spawns the MCP server child and stops it again.

use std::process::Stdio;

use mcpbridge_core::config::defaults::ENV_PREFIX;
use mcpbridge_core::config::{ChildCommand, SupervisorSettings};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

use super::lifecycle::{ChildExit, ShutdownPolicy, TerminationStage};
use crate::error::BridgeError;

/// A running child with its three pipes taken out.
pub struct SupervisedChild {
    pub child: Child,
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// Spawn the server process with all three standard streams piped.
///
/// The child inherits the bridge's environment minus the bridge's own
/// `MCPBRIDGE_*` variables, then gets the profile's overrides and the
/// configured `PATH`. On Unix it leads its own process group so the
/// termination signals reach anything it forks.
///
/// # Errors
///
/// `BridgeError::ServerSpawn` when the program cannot be started or a pipe
/// is missing.
pub fn spawn_server(
    server: &str,
    command: &ChildCommand,
    settings: &SupervisorSettings,
) -> Result<SupervisedChild, BridgeError> {
    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    for (key, _) in std::env::vars_os() {
        if key.to_string_lossy().starts_with(ENV_PREFIX) {
            cmd.env_remove(key);
        }
    }
    if let Some(ref path) = settings.child_path {
        cmd.env("PATH", path);
    }
    cmd.envs(&command.env);

    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|e| BridgeError::ServerSpawn {
        server: server.to_string(),
        reason: format!("cannot execute '{}': {e}", command.program),
    })?;

    let missing = |pipe: &str| BridgeError::ServerSpawn {
        server: server.to_string(),
        reason: format!("child {pipe} not captured"),
    };
    let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
    let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
    let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

    tracing::info!(
        server,
        program = %command.program,
        pid = child.id(),
        "server process spawned"
    );

    Ok(SupervisedChild {
        child,
        stdin,
        stdout,
        stderr,
    })
}

/// Stop the child and reap it.
///
/// 1. Wait `stdin_close_grace` (the caller has already closed stdin)
/// 2. SIGTERM the process group (Unix)
/// 3. Wait `sigterm_grace`
/// 4. SIGKILL
/// 5. `wait()` so no zombie is left behind
///
/// An already-exited child returns at step 1 immediately.
pub async fn terminate_server(
    server: &str,
    child: &mut Child,
    policy: &ShutdownPolicy,
) -> Result<ChildExit, BridgeError> {
    match tokio::time::timeout(policy.stdin_close_grace, child.wait()).await {
        Ok(Ok(status)) => {
            tracing::info!(server, code = status.code(), "server exited after stdin close");
            return Ok(ChildExit {
                code: status.code(),
                stage: TerminationStage::StdinClosed,
            });
        }
        Ok(Err(e)) => tracing::error!(server, error = %e, "wait failed after stdin close"),
        Err(_) => tracing::info!(server, "server did not exit within stdin close grace"),
    }

    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            tracing::info!(server, pid, "sending SIGTERM to process group");
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                tracing::warn!(server, pid, error = ?e, "killpg SIGTERM failed");
            }
        }
    }

    match tokio::time::timeout(policy.sigterm_grace, child.wait()).await {
        Ok(Ok(status)) => {
            tracing::info!(server, code = status.code(), "server exited after SIGTERM");
            return Ok(ChildExit {
                code: status.code(),
                stage: TerminationStage::Terminated,
            });
        }
        Ok(Err(e)) => tracing::error!(server, error = %e, "wait failed after SIGTERM"),
        Err(_) => tracing::warn!(server, "server did not exit within SIGTERM grace"),
    }

    tracing::warn!(server, "sending SIGKILL");
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                tracing::debug!(server, pid, error = ?e, "killpg SIGKILL failed");
            }
        }
    }
    if let Err(e) = child.start_kill() {
        tracing::debug!(server, error = %e, "SIGKILL failed");
    }

    let status = child.wait().await.map_err(BridgeError::Io)?;
    tracing::info!(server, code = status.code(), "server exited after SIGKILL");
    Ok(ChildExit {
        code: status.code(),
        stage: TerminationStage::Killed,
    })
}
