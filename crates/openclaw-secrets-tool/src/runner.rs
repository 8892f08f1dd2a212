//! The opaque subprocess runner `openclaw-secrets-tool` wraps. Kept behind a
//! trait so the driver can be exercised in tests without actually shelling
//! out, the same way filesystem/network collaborators are isolated behind
//! small traits elsewhere in this workspace.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use tokio::io::AsyncReadExt as _;
use tokio::process::Command;

/// Output of a finished subprocess, with stdout bounded to the caller's
/// requested maximum.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Why a subprocess invocation failed before producing an exit status.
#[derive(Debug)]
pub enum RunError {
    /// The binary could not be found on `PATH` (`ENOENT`-like).
    NotFound,
    /// stdout exceeded the caller's bound.
    OutputTooLarge { limit: usize },
    Other(anyhow::Error),
}

impl std::fmt::Display for RunError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunError::NotFound => write!(f, "binary not found"),
            RunError::OutputTooLarge { limit } => {
                write!(f, "subprocess output exceeded {limit} bytes")
            }
            RunError::Other(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for RunError {}

pub trait SubprocessRunner: Send + Sync {
    /// Spawns `program` with `args`, waits for it to exit, and returns its
    /// output with stdout capped at `max_stdout_bytes`. Does not itself apply
    /// a timeout — callers race this future against `tokio::time::timeout`.
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [String],
        max_stdout_bytes: usize,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutput, RunError>> + Send + 'a>>;
}

/// Production runner backed by `tokio::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSubprocessRunner;

impl SubprocessRunner for TokioSubprocessRunner {
    fn run<'a>(
        &'a self,
        program: &'a str,
        args: &'a [String],
        max_stdout_bytes: usize,
    ) -> Pin<Box<dyn Future<Output = Result<CommandOutput, RunError>> + Send + 'a>> {
        Box::pin(async move {
            let mut child = Command::new(program)
                .args(args)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|err| {
                    if err.kind() == std::io::ErrorKind::NotFound {
                        RunError::NotFound
                    } else {
                        RunError::Other(err.into())
                    }
                })?;

            let mut stdout_pipe = child.stdout.take().expect("stdout piped");
            let mut stderr_pipe = child.stderr.take().expect("stderr piped");

            let stdout_task = async {
                let mut buf = Vec::new();
                let mut limited = (&mut stdout_pipe).take(max_stdout_bytes as u64 + 1);
                limited.read_to_end(&mut buf).await.map_err(|e| RunError::Other(e.into()))?;
                if buf.len() > max_stdout_bytes {
                    return Err(RunError::OutputTooLarge { limit: max_stdout_bytes });
                }
                Ok(buf)
            };
            let stderr_task = async {
                let mut buf = Vec::new();
                stderr_pipe
                    .read_to_end(&mut buf)
                    .await
                    .map_err(|e| RunError::Other(e.into()))?;
                Ok::<_, RunError>(buf)
            };

            let (stdout, stderr) = tokio::try_join!(stdout_task, stderr_task)?;

            let status = child.wait().await.map_err(|e| RunError::Other(e.into()))?;

            Ok(CommandOutput { success: status.success(), stdout, stderr })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_is_reported() {
        let runner = TokioSubprocessRunner;
        let err = runner
            .run("definitely-not-a-real-binary-xyz", &[], 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::NotFound));
    }

    #[tokio::test]
    async fn captures_stdout_and_exit_status() {
        let runner = TokioSubprocessRunner;
        let args = vec!["-c".to_string(), "echo hi".to_string()];
        let out = runner.run("sh", &args, 1024).await.unwrap();
        assert!(out.success);
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hi");
    }

    #[tokio::test]
    async fn bounds_stdout_size() {
        let runner = TokioSubprocessRunner;
        let args = vec!["-c".to_string(), "head -c 100 /dev/zero".to_string()];
        let err = runner.run("sh", &args, 10).await.unwrap_err();
        assert!(matches!(err, RunError::OutputTooLarge { limit: 10 }));
    }
}
