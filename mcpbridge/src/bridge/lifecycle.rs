//! Session lifecycle types for a bridged MCP server process.
//!
//! These model why a session ended, how the child finally stopped, and the
//! grace periods used by the termination sequence.

use std::time::Duration;

use mcpbridge_core::config::SupervisorSettings;

/// Why a stdio session is ending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Client closed the bridge's stdin.
    ClientClosed,
    /// Reading the client's input failed.
    ClientFailed,
    /// The server closed its stdout.
    ServerClosed,
    /// The server process exited.
    ServerExited,
    /// The outbound stream broke (overflow or read error).
    ChannelFailed,
    /// SIGINT or SIGTERM was delivered to the bridge.
    Signalled,
}

impl SessionEnd {
    /// Termination grace periods appropriate for this cause.
    ///
    /// After a channel failure the child gets no stdin-close grace: its
    /// output can no longer be relayed, so it is signalled straight away.
    pub fn shutdown_policy(self, settings: &SupervisorSettings) -> ShutdownPolicy {
        let policy = ShutdownPolicy::from(settings);
        match self {
            SessionEnd::ChannelFailed => ShutdownPolicy {
                stdin_close_grace: Duration::ZERO,
                ..policy
            },
            _ => policy,
        }
    }

    /// Exit status for the bridge, given how the child stopped.
    ///
    /// - Broken channels exit 1.
    /// - When the server ended the session, its own exit code propagates
    ///   (1 if it died from a signal nobody here sent).
    /// - When the client or a signal ended it, the child's code propagates
    ///   if it exited on its own after stdin closed; if the bridge had to
    ///   signal it, the bridge exits 0.
    pub fn exit_code(self, exit: &ChildExit) -> i32 {
        match self {
            SessionEnd::ChannelFailed | SessionEnd::ClientFailed => 1,
            SessionEnd::ServerClosed | SessionEnd::ServerExited => exit.code.unwrap_or(1),
            SessionEnd::ClientClosed | SessionEnd::Signalled => match exit.stage {
                TerminationStage::StdinClosed => exit.code.unwrap_or(0),
                TerminationStage::Terminated | TerminationStage::Killed => 0,
            },
        }
    }
}

/// Which step of the termination sequence the child exited at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationStage {
    /// Exited on its own (or after stdin closed) without being signalled.
    StdinClosed,
    /// Exited after SIGTERM to its process group.
    Terminated,
    /// Had to be SIGKILLed.
    Killed,
}

/// How the child process finally stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildExit {
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
    pub stage: TerminationStage,
}

/// Grace periods for the termination sequence.
#[derive(Debug, Clone)]
pub struct ShutdownPolicy {
    pub stdin_close_grace: Duration,
    pub sigterm_grace: Duration,
}

impl From<&SupervisorSettings> for ShutdownPolicy {
    fn from(settings: &SupervisorSettings) -> Self {
        Self {
            stdin_close_grace: settings.stdin_close_grace,
            sigterm_grace: settings.sigterm_grace,
        }
    }
}

/// Resolves when SIGINT or SIGTERM is delivered to the bridge.
///
/// Never resolves if the handlers cannot be installed.
pub async fn termination_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let (Ok(mut sigterm), Ok(mut sigint)) = (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) else {
            tracing::warn!("failed to install signal handlers");
            return std::future::pending().await;
        };

        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM"),
            _ = sigint.recv() => tracing::info!("received SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::warn!("failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    }
}
