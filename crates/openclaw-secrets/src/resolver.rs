//! `resolveSecretRefValue`/`resolveSecretRefString`: given a `SecretRef` and
//! a resolution context, produce a plaintext value.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use openclaw_secrets_core::pointer::{self, OnMissing};
use openclaw_secrets_core::{SecretRef, SecretsConfig};
use openclaw_secrets_tool::ToolDriver;
use serde_json::Value;
use tokio::sync::OnceCell;

/// Memoizes the decrypted file-secrets payload for the duration of one
/// resolution pass, so concurrent file-ref resolutions share a single
/// `sops decrypt` invocation.
#[derive(Default)]
pub struct SecretRefResolveCache {
    file_secrets: OnceCell<Value>,
}

impl SecretRefResolveCache {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct ResolutionContext<'a> {
    pub config: &'a SecretsConfig,
    /// Overrides the process environment for `source = "env"` refs; falls
    /// back to `std::env::var` when absent.
    pub env: Option<&'a HashMap<String, String>>,
    pub cache: &'a SecretRefResolveCache,
    pub tool: &'a ToolDriver,
    pub sops_config_path: Option<&'a Path>,
    pub missing_binary_message: &'a str,
}

/// Resolves `secret_ref` to its opaque JSON value.
pub async fn resolve_secret_ref_value(
    secret_ref: &SecretRef,
    ctx: &ResolutionContext<'_>,
) -> Result<Value, anyhow::Error> {
    match secret_ref {
        SecretRef::Env { id } => resolve_env(id, ctx.env),
        SecretRef::File { id } => resolve_file(id, ctx).await,
    }
}

/// As [`resolve_secret_ref_value`], additionally requiring the result to be
/// a non-empty string.
pub async fn resolve_secret_ref_string(
    secret_ref: &SecretRef,
    ctx: &ResolutionContext<'_>,
) -> Result<String, anyhow::Error> {
    let value = resolve_secret_ref_value(secret_ref, ctx).await?;
    match value.as_str() {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => anyhow::bail!(
            "Secret reference \"{}:{}\" resolved to a non-string or empty value.",
            secret_ref.source_tag(),
            secret_ref.id(),
        ),
    }
}

fn resolve_env(id: &str, env: Option<&HashMap<String, String>>) -> Result<Value, anyhow::Error> {
    let from_override = env.and_then(|m| m.get(id).cloned());
    let value = match from_override {
        Some(v) => Some(v),
        None => std::env::var(id).ok(),
    };
    match value {
        Some(v) if !v.is_empty() => Ok(Value::String(v)),
        _ => anyhow::bail!("Environment variable \"{id}\" is missing or empty."),
    }
}

async fn resolve_file(id: &str, ctx: &ResolutionContext<'_>) -> Result<Value, anyhow::Error> {
    let file_source = match &ctx.config.sources.file {
        Some(source) if source.is_sops() => source,
        Some(source) => {
            anyhow::bail!(
                "secret reference requires config.secrets.sources.file.type = \"sops\", found \"{}\"",
                source.kind
            );
        }
        None => {
            anyhow::bail!(
                "secret reference requires config.secrets.sources.file to be configured, but no file secrets source is set"
            );
        }
    };

    let path: PathBuf = openclaw_secrets_config::expand_user_path(&file_source.path)?;
    let timeout_ms = file_source.normalized_timeout_ms();

    let payload = ctx
        .cache
        .file_secrets
        .get_or_try_init(|| async {
            let decrypted = ctx
                .tool
                .decrypt(&path, timeout_ms, ctx.missing_binary_message, ctx.sops_config_path)
                .await?;
            if !decrypted.is_object() {
                anyhow::bail!("sops decrypt failed: decrypted payload is not a JSON object");
            }
            Ok::<_, anyhow::Error>(decrypted)
        })
        .await?;

    let value = pointer::read(payload, id, OnMissing::Throw)?
        .expect("OnMissing::Throw guarantees Some on success")
        .clone();
    Ok(value)
}
