use crate::error::CommandError;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Runs the network start and end commands.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &str) -> Result<(), CommandError>;
}

/// Executes commands through a system shell, `sh -c <command>` by default.
#[derive(Clone, Debug)]
pub struct ShellExecutor {
    shell: String,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new("sh")
    }
}

impl ShellExecutor {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(&self, command: &str) -> Result<(), CommandError> {
        info!("Executing \"{command}\"");

        let output = Command::new(&self.shell)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| CommandError::Spawn {
                command: command.to_string(),
                source,
            })?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            info!("{line}");
        }
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            warn!("{line}");
        }

        if output.status.success() {
            debug!("\"{command}\" finished");
            Ok(())
        } else {
            Err(CommandError::Status {
                command: command.to_string(),
                status: output.status,
            })
        }
    }
}
