//! Running shell commands locally or over ssh with a timeout.

use std::{future::Future, path::PathBuf, process::Stdio, time::Duration};

use log::debug;
use tokio::process::Command;

/// Captured result of one command.
///
/// `exit_status` is `None` when the command could not be started, was killed
/// by a signal, or ran past its timeout; `stderr` then explains why.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_status: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == Some(0)
    }

    fn failed(reason: String) -> Self {
        Self {
            stdout: String::new(),
            stderr: reason,
            exit_status: None,
        }
    }
}

/// Something that can run a shell command line.
pub trait CommandExecutor {
    fn run(&self, cmd: &str, timeout: Duration) -> impl Future<Output = CommandOutput> + Send;
}

/// Runs commands through `sh -c` on this machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalShell;

impl CommandExecutor for LocalShell {
    fn run(&self, cmd: &str, timeout: Duration) -> impl Future<Output = CommandOutput> + Send {
        let mut command = Command::new("sh");
        command.arg("-c").arg(cmd);
        run_with_timeout(command, timeout)
    }
}

/// Runs commands on a remote host through `ssh`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshShell {
    /// `host` or `user@host`.
    pub host: String,
    /// Private key passed as `ssh -i`.
    pub key_path: Option<PathBuf>,
}

impl SshShell {
    pub fn new(host: impl Into<String>, key_path: Option<PathBuf>) -> Self {
        Self {
            host: host.into(),
            key_path,
        }
    }

    fn command(&self, cmd: &str) -> Command {
        let mut command = Command::new("ssh");
        command.args(["-o", "StrictHostKeyChecking=no", "-o", "BatchMode=yes"]);
        if let Some(key) = &self.key_path {
            command.arg("-i").arg(key);
        }
        command.arg(&self.host).arg(cmd);
        command
    }
}

impl CommandExecutor for SshShell {
    fn run(&self, cmd: &str, timeout: Duration) -> impl Future<Output = CommandOutput> + Send {
        run_with_timeout(self.command(cmd), timeout)
    }
}

async fn run_with_timeout(mut command: Command, timeout: Duration) -> CommandOutput {
    debug!("exec {:?}", command.as_std());
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = match command.spawn() {
        Ok(child) => child,
        Err(e) => return CommandOutput::failed(format!("can't spawn command: {e}")),
    };

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_status: output.status.code(),
        },
        Ok(Err(e)) => CommandOutput::failed(format!("can't read command output: {e}")),
        Err(_) => CommandOutput::failed(format!("timeout after {timeout:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_both_streams_and_status() {
        let out = LocalShell
            .run("echo out; echo err >&2; exit 3", Duration::from_secs(5))
            .await;
        assert_eq!(out.stdout, "out\n");
        assert_eq!(out.stderr, "err\n");
        assert_eq!(out.exit_status, Some(3));
        assert!(!out.success());
    }

    #[tokio::test]
    async fn kills_commands_that_run_too_long() {
        let started = std::time::Instant::now();
        let out = LocalShell.run("sleep 5", Duration::from_millis(100)).await;
        assert!(started.elapsed() < Duration::from_secs(4));
        assert_eq!(out.exit_status, None);
        assert!(out.stderr.starts_with("timeout"), "{}", out.stderr);
    }

    #[test]
    fn ssh_command_line() {
        let shell = SshShell::new("root@validator", Some(PathBuf::from("/keys/id_ed25519")));
        let cmd = shell.command("solana slot");
        let args: Vec<_> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(cmd.as_std().get_program(), "ssh");
        assert_eq!(
            args,
            [
                "-o",
                "StrictHostKeyChecking=no",
                "-o",
                "BatchMode=yes",
                "-i",
                "/keys/id_ed25519",
                "root@validator",
                "solana slot"
            ]
        );
    }
}
