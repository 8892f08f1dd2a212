//! Typed façade over the opaque subprocess runner: `decrypt`/`encrypt` a
//! JSON document through the external `sops` binary with a bounded timeout
//! and bounded output size.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::warn;

use crate::runner::{CommandOutput, RunError, SubprocessRunner, TokioSubprocessRunner};

/// Minimum bound on decrypted output accepted from the tool.
pub const MIN_OUTPUT_BYTES: usize = 10 * 1024 * 1024;

const DEFAULT_BINARY: &str = "sops";

#[derive(Clone)]
pub struct ToolDriver {
    runner: Arc<dyn SubprocessRunner>,
    binary: String,
    max_output_bytes: usize,
}

impl Default for ToolDriver {
    fn default() -> Self {
        Self::new(Arc::new(TokioSubprocessRunner), DEFAULT_BINARY, MIN_OUTPUT_BYTES)
    }
}

impl ToolDriver {
    pub fn new(runner: Arc<dyn SubprocessRunner>, binary: impl Into<String>, max_output_bytes: usize) -> Self {
        Self { runner, binary: binary.into(), max_output_bytes }
    }

    fn build_config_arg(config_path: Option<&Path>) -> Vec<String> {
        match config_path {
            Some(path) if !path.as_os_str().is_empty() => {
                vec!["--config".to_string(), path.display().to_string()]
            }
            _ => Vec::new(),
        }
    }

    /// Decrypts `path` and parses stdout as an opaque JSON value.
    pub async fn decrypt(
        &self,
        path: &Path,
        timeout_ms: u64,
        missing_binary_message: &str,
        config_path: Option<&Path>,
    ) -> Result<Value, anyhow::Error> {
        let mut args = Self::build_config_arg(config_path);
        args.extend([
            "--decrypt".to_string(),
            "--output-type".to_string(),
            "json".to_string(),
            path.display().to_string(),
        ]);

        let output = self
            .invoke("decrypt", &args, timeout_ms, missing_binary_message, path)
            .await?;

        serde_json::from_slice(&output.stdout)
            .map_err(|err| anyhow::anyhow!("sops decrypt failed for {}: {err}", path.display()))
    }

    /// Writes `payload` to a `0600` plaintext tempfile, encrypts it through
    /// the tool, and atomically renames the result over `path`.
    pub async fn encrypt(
        &self,
        path: &Path,
        payload: &Value,
        timeout_ms: u64,
        missing_binary_message: &str,
        config_path: Option<&Path>,
    ) -> Result<(), anyhow::Error> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        tokio::fs::create_dir_all(dir).await?;

        let plain_path = reserve_tempfile(dir, "plain")?;
        let bytes = serde_json::to_vec(payload)?;
        tokio::fs::write(&plain_path, &bytes).await?;
        set_secret_permissions(&plain_path).await?;

        let enc_path = reserve_tempfile(dir, "enc")?;

        let mut args = Self::build_config_arg(config_path);
        args.extend([
            "--encrypt".to_string(),
            "--input-type".to_string(),
            "json".to_string(),
            "--output-type".to_string(),
            "json".to_string(),
            "--output".to_string(),
            enc_path.display().to_string(),
            plain_path.display().to_string(),
        ]);

        let result = self.invoke("encrypt", &args, timeout_ms, missing_binary_message, path).await;

        // Both tempfiles are removed on every exit path, success or failure.
        let cleanup_plain = tokio::fs::remove_file(&plain_path).await;
        if let Err(err) = cleanup_plain {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %plain_path.display(), %err, "failed to remove plaintext tempfile");
            }
        }

        if result.is_err() {
            let cleanup_enc = tokio::fs::remove_file(&enc_path).await;
            if let Err(err) = cleanup_enc {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %enc_path.display(), %err, "failed to remove encrypted tempfile");
                }
            }
        }
        result?;

        tokio::fs::rename(&enc_path, path).await?;
        set_secret_permissions(path).await?;
        Ok(())
    }

    async fn invoke(
        &self,
        op: &str,
        args: &[String],
        timeout_ms: u64,
        missing_binary_message: &str,
        path: &Path,
    ) -> Result<CommandOutput, anyhow::Error> {
        let fut = self.runner.run(&self.binary, args, self.max_output_bytes);
        let outcome = tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await;

        let output = match outcome {
            Err(_elapsed) => {
                anyhow::bail!("sops {op} timed out after {timeout_ms}ms for {}", path.display());
            }
            Ok(Err(RunError::NotFound)) => {
                anyhow::bail!("{missing_binary_message}");
            }
            Ok(Err(other)) => {
                anyhow::bail!("sops {op} failed for {}: {other}", path.display());
            }
            Ok(Ok(output)) => output,
        };

        if !output.success {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("sops {op} failed for {}: {}", path.display(), stderr.trim());
        }

        Ok(output)
    }
}

/// Reserves a unique tempfile path in `dir` without holding it open, so the
/// child process can write to it. The reservation (and the empty file it
/// points at) is deleted on drop unless the caller later replaces the path
/// via rename, which matches "removed on every exit path".
fn reserve_tempfile(dir: &Path, kind: &str) -> Result<PathBuf, anyhow::Error> {
    let pid = std::process::id();
    let path = tempfile::Builder::new()
        .prefix(&format!(".sops-{kind}-{pid}-"))
        .suffix(".json")
        .tempfile_in(dir)?
        .into_temp_path();
    // Leak the `TempPath` so its own drop-time deletion doesn't race the
    // caller's explicit cleanup/rename; ownership of removal is explicit.
    Ok(path.keep()?)
}

#[cfg(unix)]
async fn set_secret_permissions(path: &Path) -> Result<(), anyhow::Error> {
    use std::os::unix::fs::PermissionsExt as _;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_secret_permissions(_path: &Path) -> Result<(), anyhow::Error> {
    Ok(())
}
