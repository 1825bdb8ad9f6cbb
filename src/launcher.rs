use crate::{config::SessionConfig, errors::SessionError};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    process::{Child, Command},
};
use tracing::info;

pub type DebuggerInput = Box<dyn AsyncWrite + Send + Unpin>;
pub type DebuggerOutput = Box<dyn AsyncRead + Send + Unpin>;

/// The streams of a started debugger.
pub struct DebuggerProcess {
    pub stdin: DebuggerInput,
    pub stdout: DebuggerOutput,
    pub stderr: Option<DebuggerOutput>,
    /// Killed when the session terminates. `None` for debuggers that are not
    /// child processes.
    pub child: Option<Child>,
}

/// Starts the process a [`crate::Session`] talks to.
#[async_trait]
pub trait Launcher {
    async fn spawn(&self, config: &SessionConfig) -> Result<DebuggerProcess, SessionError>;
}

/// Spawns the configured shell. The session then writes the bootstrap
/// commands that compile the app and start `mdd` inside it.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShellLauncher;

#[async_trait]
impl Launcher for ShellLauncher {
    async fn spawn(&self, config: &SessionConfig) -> Result<DebuggerProcess, SessionError> {
        info!("Spawning `{} {}`.", config.shell, config.shell_args.join(" "));
        let mut child = Command::new(&config.shell)
            .args(&config.shell_args)
            .current_dir(&config.launch.project_path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SessionError::Spawn {
                program: config.shell.clone(),
                source,
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            return Err(SessionError::ProcessExited);
        };
        let stderr = child
            .stderr
            .take()
            .map(|it| Box::new(it) as DebuggerOutput);
        Ok(DebuggerProcess {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr,
            child: Some(child),
        })
    }
}
