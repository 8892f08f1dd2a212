//! `prepareSnapshot`: walk a validated config and a set of
//! auth stores, replace every `SecretRef` with its resolved plaintext, and
//! return a fully-materialized [`RuntimeSnapshot`]. Never writes to disk.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use openclaw_secrets_core::field_site::{AuthProfileKind, AuthProfileSite, FieldSite};
use openclaw_secrets_core::pointer::{self, OnMissing};
use openclaw_secrets_core::secret_ref::SecretRef;
use openclaw_secrets_core::{ResolvedAuthStore, RuntimeSnapshot, SecretsConfig, SnapshotWarning};
use openclaw_secrets_tool::ToolDriver;
use serde_json::Value;

use crate::resolver::{resolve_secret_ref_string, ResolutionContext, SecretRefResolveCache};

/// Loads a per-agent auth store document. Returns `None` when the agent has
/// no store on disk — the builder emits no entry for it, rather than an
/// error.
pub trait AuthStoreLoader: Send + Sync {
    fn load<'a>(
        &'a self,
        agent_dir: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Value>, anyhow::Error>> + Send + 'a>>;
}

pub struct SnapshotBuildInput<'a> {
    pub config: &'a Value,
    pub secrets_config: &'a SecretsConfig,
    pub env: Option<&'a HashMap<String, String>>,
    pub agent_dirs: &'a [String],
    pub loader: &'a dyn AuthStoreLoader,
    pub tool: &'a ToolDriver,
    pub sops_config_path: Option<&'a Path>,
    pub missing_binary_message: &'a str,
}

/// Builds a [`RuntimeSnapshot`] from `input`. `resolved_at` is a caller-
/// supplied monotonic timestamp, since this crate never calls the clock
/// itself (leaving that to the caller keeps this function pure apart from
/// the resolver's I/O).
pub async fn prepare_snapshot(
    input: &SnapshotBuildInput<'_>,
    resolved_at: i128,
) -> Result<RuntimeSnapshot, anyhow::Error> {
    let mut config = input.config.clone();
    let mut warnings = Vec::new();
    let cache = SecretRefResolveCache::new();
    let ctx = ResolutionContext {
        config: input.secrets_config,
        env: input.env,
        cache: &cache,
        tool: input.tool,
        sops_config_path: input.sops_config_path,
        missing_binary_message: input.missing_binary_message,
    };

    for site in FieldSite::discover(&config) {
        resolve_field_site(&mut config, &site, &ctx, &mut warnings).await?;
    }

    let mut auth_stores = Vec::new();
    for agent_dir in input.agent_dirs {
        let Some(mut store) = input.loader.load(agent_dir).await? else {
            continue;
        };
        for site in AuthProfileSite::discover(&store) {
            resolve_auth_profile_site(&mut store, &site, &ctx, &mut warnings).await?;
        }
        auth_stores.push(ResolvedAuthStore { agent_dir: agent_dir.clone(), store });
    }

    Ok(RuntimeSnapshot { config, auth_stores, warnings, resolved_at })
}

/// Resolves one config-level site. Provider and skill sites reuse their own
/// field for both plaintext and ref, so the ref's location and the config
/// pointer coincide; Google Chat sites keep the ref in a distinct `...Ref`
/// sibling, which is deleted once resolved so no `SecretRef` value survives
/// in the snapshot.
async fn resolve_field_site(
    config: &mut Value,
    site: &FieldSite,
    ctx: &ResolutionContext<'_>,
    warnings: &mut Vec<SnapshotWarning>,
) -> Result<(), anyhow::Error> {
    let config_pointer = site.config_pointer();
    let ref_pointer = site.ref_pointer();
    let distinct_ref_field = ref_pointer.is_some();
    let ref_at = ref_pointer.unwrap_or_else(|| config_pointer.clone());

    let Some(current_ref) = pointer::read(config, &ref_at, OnMissing::Undefined)?
        .and_then(SecretRef::try_from_value)
    else {
        return Ok(());
    };

    let has_plaintext_sibling = distinct_ref_field
        && pointer::read(config, &config_pointer, OnMissing::Undefined)?.is_some_and(|v| !v.is_null());

    let resolved = resolve_secret_ref_string(&current_ref, ctx).await?;

    if has_plaintext_sibling {
        warnings.push(SnapshotWarning::ref_overrides_plaintext(site.label()));
    }

    pointer::set(config, &config_pointer, Value::String(resolved))?;
    if distinct_ref_field {
        pointer::delete(config, &ref_at)?;
    }
    Ok(())
}

/// Resolves one auth-profile site. Unlike config sites, `keyRef`/`tokenRef`
/// are left in place until migration runs; only the literal `key`/`token`
/// field needs to carry the resolved value.
async fn resolve_auth_profile_site(
    store: &mut Value,
    site: &AuthProfileSite,
    ctx: &ResolutionContext<'_>,
    warnings: &mut Vec<SnapshotWarning>,
) -> Result<(), anyhow::Error> {
    let ref_pointer = site.ref_pointer();
    let plaintext_pointer = site.plaintext_pointer();

    let Some(current_ref) = pointer::read(store, &ref_pointer, OnMissing::Undefined)?
        .and_then(SecretRef::try_from_value)
    else {
        return Ok(());
    };

    let has_plaintext_sibling =
        pointer::read(store, &plaintext_pointer, OnMissing::Undefined)?.is_some_and(|v| !v.is_null());

    let resolved = resolve_secret_ref_string(&current_ref, ctx).await?;

    if has_plaintext_sibling {
        let field = match site.kind {
            AuthProfileKind::ApiKey => "key",
            AuthProfileKind::Token => "token",
        };
        warnings.push(SnapshotWarning::ref_overrides_plaintext(format!(
            "profiles.{}.{field}",
            site.profile_id
        )));
    }

    pointer::set(store, &plaintext_pointer, Value::String(resolved))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use openclaw_secrets_tool::{CommandOutput, RunError, SubprocessRunner};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct NoStores;
    impl AuthStoreLoader for NoStores {
        fn load<'a>(
            &'a self,
            _agent_dir: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<Option<Value>, anyhow::Error>> + Send + 'a>> {
            Box::pin(async { Ok(None) })
        }
    }

    struct OneStore(Value);
    impl AuthStoreLoader for OneStore {
        fn load<'a>(
            &'a self,
            _agent_dir: &'a str,
        ) -> Pin<Box<dyn Future<Output = Result<Option<Value>, anyhow::Error>> + Send + 'a>> {
            let store = self.0.clone();
            Box::pin(async move { Ok(Some(store)) })
        }
    }

    struct CountingRunner {
        calls: Arc<AtomicUsize>,
        payload: Value,
    }

    impl SubprocessRunner for CountingRunner {
        fn run<'a>(
            &'a self,
            _program: &'a str,
            _args: &'a [String],
            _max_stdout_bytes: usize,
        ) -> Pin<Box<dyn Future<Output = Result<CommandOutput, RunError>> + Send + 'a>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let stdout = serde_json::to_vec(&self.payload).unwrap();
            Box::pin(async move { Ok(CommandOutput { success: true, stdout, stderr: Vec::new() }) })
        }
    }

    #[tokio::test]
    async fn env_resolve_scenario_has_no_warnings() {
        let config = json!({
            "models": {"providers": {"openai": {"apiKey": {"source": "env", "id": "OPENAI_API_KEY"}}}}
        });
        let mut env = HashMap::new();
        env.insert("OPENAI_API_KEY".to_string(), "sk-env-openai".to_string());

        let secrets_config = SecretsConfig::default();
        let tool = ToolDriver::default();
        let loader = NoStores;
        let input = SnapshotBuildInput {
            config: &config,
            secrets_config: &secrets_config,
            env: Some(&env),
            agent_dirs: &[],
            loader: &loader,
            tool: &tool,
            sops_config_path: None,
            missing_binary_message: "missing",
        };

        let snapshot = prepare_snapshot(&input, 1).await.unwrap();
        assert_eq!(
            snapshot.config.pointer("/models/providers/openai/apiKey").unwrap(),
            "sk-env-openai"
        );
        assert!(snapshot.warnings.is_empty());
    }

    #[tokio::test]
    async fn profile_override_scenario_emits_warning_and_sets_key() {
        let config = json!({});
        let store = json!({
            "profiles": {
                "p1": {
                    "type": "api_key",
                    "key": "old",
                    "keyRef": {"source": "env", "id": "OPENAI_API_KEY"}
                }
            }
        });
        let mut env = HashMap::new();
        env.insert("OPENAI_API_KEY".to_string(), "sk-env-openai".to_string());

        let secrets_config = SecretsConfig::default();
        let tool = ToolDriver::default();
        let loader = OneStore(store);
        let input = SnapshotBuildInput {
            config: &config,
            secrets_config: &secrets_config,
            env: Some(&env),
            agent_dirs: &["agent-a".to_string()],
            loader: &loader,
            tool: &tool,
            sops_config_path: None,
            missing_binary_message: "missing",
        };

        let snapshot = prepare_snapshot(&input, 1).await.unwrap();
        assert_eq!(snapshot.auth_stores.len(), 1);
        let resolved_key = snapshot.auth_stores[0].store.pointer("/profiles/p1/key").unwrap();
        assert_eq!(resolved_key, "sk-env-openai");
        assert_eq!(snapshot.warnings.len(), 1);
        assert_eq!(snapshot.warnings[0].site, "profiles.p1.key");
    }

    #[tokio::test]
    async fn file_refs_share_a_single_decrypt_invocation() {
        let calls = Arc::new(AtomicUsize::new(0));
        let runner = Arc::new(CountingRunner {
            calls: calls.clone(),
            payload: json!({
                "providers": {"openai": {"apiKey": "sk-a"}},
                "skills": {"entries": {"review-pr": {"apiKey": "sk-b"}}}
            }),
        });
        let tool = ToolDriver::new(runner, "sops", openclaw_secrets_tool::MIN_OUTPUT_BYTES);

        let config = json!({
            "models": {"providers": {"openai": {"apiKey": {"source": "file", "id": "/providers/openai/apiKey"}}}},
            "skills": {"entries": {"review-pr": {"apiKey": {"source": "file", "id": "/skills/entries/review-pr/apiKey"}}}}
        });
        let secrets_config: SecretsConfig = serde_json::from_value(json!({
            "sources": {"file": {"type": "sops", "path": "/tmp/secrets.enc.json"}}
        }))
        .unwrap();
        let loader = NoStores;
        let input = SnapshotBuildInput {
            config: &config,
            secrets_config: &secrets_config,
            env: None,
            agent_dirs: &[],
            loader: &loader,
            tool: &tool,
            sops_config_path: None,
            missing_binary_message: "missing sops",
        };

        let snapshot = prepare_snapshot(&input, 1).await.unwrap();
        assert_eq!(
            snapshot.config.pointer("/models/providers/openai/apiKey").unwrap(),
            "sk-a"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn googlechat_ref_sibling_is_removed_after_resolution() {
        let config = json!({
            "channels": {"googlechat": {
                "serviceAccount": "stale-plaintext",
                "serviceAccountRef": {"source": "env", "id": "GOOGLECHAT_SA"}
            }}
        });
        let mut env = HashMap::new();
        env.insert("GOOGLECHAT_SA".to_string(), "{\"type\":\"service_account\"}".to_string());

        let secrets_config = SecretsConfig::default();
        let tool = ToolDriver::default();
        let loader = NoStores;
        let input = SnapshotBuildInput {
            config: &config,
            secrets_config: &secrets_config,
            env: Some(&env),
            agent_dirs: &[],
            loader: &loader,
            tool: &tool,
            sops_config_path: None,
            missing_binary_message: "missing",
        };

        let snapshot = prepare_snapshot(&input, 1).await.unwrap();
        assert!(snapshot
            .config
            .pointer("/channels/googlechat/serviceAccountRef")
            .is_none());
        assert_eq!(snapshot.warnings.len(), 1);
        assert_eq!(snapshot.warnings[0].code, "SECRETS_REF_OVERRIDES_PLAINTEXT");
    }
}
