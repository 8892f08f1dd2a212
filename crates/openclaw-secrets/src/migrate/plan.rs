//! `buildMigrationPlan`: produces a [`MigrationPlan`] describing every
//! intended change without touching disk, aside from the reads needed to
//! see the current state.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use openclaw_secrets_core::config::{FileSource, SecretsConfig};
use openclaw_secrets_core::field_site::{AuthProfileSite, FieldSite};
use openclaw_secrets_core::pointer::{self, OnMissing};
use openclaw_secrets_core::secret_ref::SecretRef;
use openclaw_secrets_tool::ToolDriver;
use serde_json::{json, Value};

use super::env_scrub::scrub_env_file;
use super::types::{AuthStorePlan, EnvFilePlan, MigrationCounters, MigrationPlan};

pub struct MigrationPlanInput<'a> {
    pub config_path: &'a Path,
    pub config: &'a Value,
    pub config_dir: &'a Path,
    pub state_dir: &'a Path,
    /// Per-agent auth-profile stores named explicitly by the resolved
    /// config, in addition to the canonical store and `<stateDir>/agents/*`
    /// discovery.
    pub explicit_auth_store_paths: &'a [PathBuf],
    /// The default encrypted-payload path to use when no `sources.file` is
    /// configured (`<stateDir>/secrets.enc.json` or its explicit-override
    /// variant — resolved by the caller via `openclaw-secrets-config`).
    pub default_payload_path: &'a Path,
    pub env_file_path: &'a Path,
    pub env_allowlist: &'a [String],
    pub scrub_env: bool,
    pub tool: &'a ToolDriver,
    pub missing_binary_message: &'a str,
    pub decrypt_timeout_ms: u64,
}

pub async fn build_migration_plan(input: &MigrationPlanInput<'_>) -> Result<MigrationPlan, anyhow::Error> {
    validate_config(input.config)?;

    let secrets_config: SecretsConfig =
        serde_json::from_value(input.config.get("secrets").cloned().unwrap_or(json!({})))
            .map_err(|err| anyhow::anyhow!("invalid config at /secrets: {err}"))?;
    let file_source_was_configured = secrets_config.sources.file.as_ref().is_some_and(FileSource::is_sops);

    let payload_path = match &secrets_config.sources.file {
        Some(file) if file.is_sops() => openclaw_secrets_config::expand_user_path(&file.path)?,
        _ => input.default_payload_path.to_path_buf(),
    };
    let sops_config_path = openclaw_secrets_config::discover_sops_config(input.config_dir);

    let original_payload = load_payload(
        &payload_path,
        input.tool,
        input.missing_binary_message,
        sops_config_path.as_deref(),
        input.decrypt_timeout_ms,
    )
    .await?;
    let mut next_payload = original_payload.clone();

    let mut next_config = input.config.clone();
    let mut counters = MigrationCounters::default();
    let mut migrated_values: HashSet<String> = HashSet::new();

    for site in FieldSite::discover(&next_config) {
        migrate_field_site(&mut next_config, &mut next_payload, &site, &mut counters, &mut migrated_values)?;
    }

    let store_paths = discover_auth_store_paths(input.state_dir, input.explicit_auth_store_paths);
    let mut auth_stores = Vec::new();
    for path in store_paths {
        let Some(original) = read_json_if_present(&path).await? else {
            continue;
        };
        let scope = auth_store_scope(input.state_dir, &path);
        let mut next = original.clone();
        let mut store_changed = false;
        for site in AuthProfileSite::discover(&next) {
            let mutated =
                migrate_auth_profile_site(&mut next, &mut next_payload, &site, &scope, &mut counters, &mut migrated_values)?;
            store_changed |= mutated;
        }
        if store_changed {
            counters.auth_stores_changed += 1;
        }
        auth_stores.push(AuthStorePlan { path, scope, original, next, changed: store_changed });
    }

    if counters.secrets_written > 0 && !file_source_was_configured {
        pointer::set(
            &mut next_config,
            "/secrets/sources/file",
            json!({ "type": "sops", "path": payload_path.display().to_string(), "timeoutMs": 5000 }),
        )?;
    }

    let config_changed = next_config != *input.config;
    let payload_changed = next_payload != original_payload;

    let env_file = if input.scrub_env && !migrated_values.is_empty() {
        match tokio::fs::read_to_string(input.env_file_path).await {
            Ok(original_contents) => {
                let (next_contents, removed) =
                    scrub_env_file(&original_contents, &migrated_values, input.env_allowlist);
                counters.env_entries_removed = removed;
                let changed = next_contents != original_contents;
                Some(EnvFilePlan {
                    path: input.env_file_path.to_path_buf(),
                    original_contents,
                    next_contents,
                    changed,
                })
            }
            Err(_) => None,
        }
    } else {
        None
    };

    let mut backup_targets = Vec::new();
    if payload_changed {
        backup_targets.push(payload_path.clone());
    }
    if config_changed {
        backup_targets.push(input.config_path.to_path_buf());
    }
    for store in &auth_stores {
        if store.changed {
            backup_targets.push(store.path.clone());
        }
    }
    if let Some(env_plan) = &env_file {
        if env_plan.changed {
            backup_targets.push(env_plan.path.clone());
        }
    }

    let changed = config_changed
        || payload_changed
        || auth_stores.iter().any(|s| s.changed)
        || env_file.as_ref().is_some_and(|e| e.changed);

    Ok(MigrationPlan {
        config_path: input.config_path.to_path_buf(),
        next_config,
        config_changed,
        payload_path,
        sops_config_path,
        file_source_was_configured,
        next_payload,
        payload_changed,
        auth_stores,
        env_file,
        counters,
        changed,
        backup_targets,
    })
}

async fn load_payload(
    path: &Path,
    tool: &ToolDriver,
    missing_binary_message: &str,
    sops_config_path: Option<&Path>,
    timeout_ms: u64,
) -> Result<Value, anyhow::Error> {
    if !path.exists() {
        return Ok(json!({}));
    }
    let decrypted = tool.decrypt(path, timeout_ms, missing_binary_message, sops_config_path).await?;
    if !decrypted.is_object() {
        anyhow::bail!("sops decrypt failed: decrypted payload is not a JSON object");
    }
    Ok(decrypted)
}

async fn read_json_if_present(path: &Path) -> Result<Option<Value>, anyhow::Error> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Minimal structural validation of the config subtree this engine reads.
/// Full schema validation is the gateway's config loader's job; this only
/// guards the shapes this module assumes.
fn validate_config(config: &Value) -> Result<(), anyhow::Error> {
    let mut issues = Vec::new();
    for pointer_str in [
        "/models/providers",
        "/skills/entries",
        "/channels/googlechat",
        "/channels/googlechat/accounts",
    ] {
        if let Some(value) = config.pointer(pointer_str) {
            if !value.is_object() {
                issues.push(format!("{pointer_str}: expected an object"));
            }
        }
    }
    if !issues.is_empty() {
        anyhow::bail!("invalid config:\n{}", issues.join("\n"));
    }
    Ok(())
}

/// Discovers every auth-profile store: the canonical default, every
/// `<stateDir>/agents/*/agent/auth-profiles.json`, and the caller-supplied
/// explicit paths — de-duplicated by canonicalized absolute path.
fn discover_auth_store_paths(state_dir: &Path, explicit_paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut seen = HashSet::new();

    push_unique(&mut found, &mut seen, state_dir.join("auth-profiles.json"));

    let agents_dir = state_dir.join("agents");
    if let Ok(entries) = std::fs::read_dir(&agents_dir) {
        let mut agent_dirs: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        agent_dirs.sort();
        for agent_dir in agent_dirs {
            push_unique(&mut found, &mut seen, agent_dir.join("agent").join("auth-profiles.json"));
        }
    }

    for explicit in explicit_paths {
        push_unique(&mut found, &mut seen, explicit.clone());
    }

    found
}

fn push_unique(found: &mut Vec<PathBuf>, seen: &mut HashSet<PathBuf>, path: PathBuf) {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
    if seen.insert(canonical) {
        found.push(path);
    }
}

/// The auth-store scope used to namespace its pointers under the encrypted
/// payload: the agent directory name under the standard `<stateDir>/agents`
/// layout, else `path-<sha1(pathname)[0..8]>`.
pub fn auth_store_scope(state_dir: &Path, path: &Path) -> String {
    if let Ok(rel) = path.strip_prefix(state_dir.join("agents")) {
        if let Some(agent_name) = rel.components().next() {
            return agent_name.as_os_str().to_string_lossy().into_owned();
        }
    }
    let digest = sha1_hex(&path.to_string_lossy());
    format!("path-{}", &digest[..8])
}

fn sha1_hex(input: &str) -> String {
    use sha1::{Digest, Sha1};
    let mut hasher = Sha1::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Migrates one config-level [`FieldSite`] in place.
fn migrate_field_site(
    config: &mut Value,
    payload: &mut Value,
    site: &FieldSite,
    counters: &mut MigrationCounters,
    migrated_values: &mut HashSet<String>,
) -> Result<(), anyhow::Error> {
    let config_pointer = site.config_pointer();
    let ref_pointer = site.ref_pointer();

    if let Some(ref_ptr) = &ref_pointer {
        let already_ref = pointer::read(config, ref_ptr, OnMissing::Undefined)?
            .is_some_and(SecretRef::looks_like_ref);
        if already_ref {
            let has_plaintext = pointer::read(config, &config_pointer, OnMissing::Undefined)?
                .is_some_and(|v| !v.is_null());
            if has_plaintext {
                pointer::delete(config, &config_pointer)?;
                counters.plaintext_removed += 1;
            }
            return Ok(());
        }
    }

    let Some(current) = pointer::read(config, &config_pointer, OnMissing::Undefined)?.cloned() else {
        return Ok(());
    };
    if SecretRef::looks_like_ref(&current) {
        return Ok(());
    }

    let (desired_value, migrated_text) = match &current {
        Value::String(s) if !s.trim().is_empty() => {
            let trimmed = s.trim().to_string();
            (Value::String(trimmed.clone()), Some(trimmed))
        }
        Value::Object(obj) if !obj.is_empty() => (current.clone(), None),
        _ => return Ok(()),
    };

    let payload_pointer = site.payload_pointer();
    write_payload_if_changed(payload, &payload_pointer, desired_value, counters)?;
    if let Some(text) = migrated_text {
        migrated_values.insert(text);
    }

    let secret_ref = SecretRef::File { id: payload_pointer };
    match &ref_pointer {
        Some(ref_ptr) => {
            pointer::set(config, ref_ptr, secret_ref.to_value())?;
            pointer::delete(config, &config_pointer)?;
        }
        None => {
            pointer::set(config, &config_pointer, secret_ref.to_value())?;
        }
    }
    counters.config_refs += 1;
    Ok(())
}

/// Migrates one auth-profile secret field in place. Returns whether the
/// store was mutated.
fn migrate_auth_profile_site(
    store: &mut Value,
    payload: &mut Value,
    site: &AuthProfileSite,
    scope: &str,
    counters: &mut MigrationCounters,
    migrated_values: &mut HashSet<String>,
) -> Result<bool, anyhow::Error> {
    let ref_pointer = site.ref_pointer();
    let plaintext_pointer = site.plaintext_pointer();

    let already_ref =
        pointer::read(store, &ref_pointer, OnMissing::Undefined)?.is_some_and(SecretRef::looks_like_ref);
    if already_ref {
        let has_plaintext = pointer::read(store, &plaintext_pointer, OnMissing::Undefined)?
            .is_some_and(|v| !v.is_null());
        if has_plaintext {
            pointer::delete(store, &plaintext_pointer)?;
            counters.plaintext_removed += 1;
            return Ok(true);
        }
        return Ok(false);
    }

    let current = pointer::read(store, &plaintext_pointer, OnMissing::Undefined)?.cloned();
    let Some(Value::String(raw)) = current else {
        return Ok(false);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(false);
    }
    let trimmed = trimmed.to_string();

    let payload_pointer = site.payload_pointer(scope);
    write_payload_if_changed(payload, &payload_pointer, Value::String(trimmed.clone()), counters)?;
    migrated_values.insert(trimmed);

    let secret_ref = SecretRef::File { id: payload_pointer };
    pointer::set(store, &ref_pointer, secret_ref.to_value())?;
    pointer::delete(store, &plaintext_pointer)?;
    counters.auth_profile_refs += 1;
    Ok(true)
}

fn write_payload_if_changed(
    payload: &mut Value,
    pointer_str: &str,
    desired: Value,
    counters: &mut MigrationCounters,
) -> Result<(), anyhow::Error> {
    let unchanged = pointer::read(payload, pointer_str, OnMissing::Undefined)?.is_some_and(|v| v == &desired);
    if unchanged {
        return Ok(());
    }
    pointer::set(payload, pointer_str, desired)?;
    counters.secrets_written += 1;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use openclaw_secrets_tool::{CommandOutput, RunError, SubprocessRunner};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct StaticRunner(Value);
    impl SubprocessRunner for StaticRunner {
        fn run<'a>(
            &'a self,
            _program: &'a str,
            _args: &'a [String],
            _max_stdout_bytes: usize,
        ) -> Pin<Box<dyn Future<Output = Result<CommandOutput, RunError>> + Send + 'a>> {
            let stdout = serde_json::to_vec(&self.0).unwrap();
            Box::pin(async move { Ok(CommandOutput { success: true, stdout, stderr: Vec::new() }) })
        }
    }

    #[tokio::test]
    async fn full_round_trip_scenario_migrates_every_site() {
        let state_dir = TempDir::new().unwrap();
        let config_dir = TempDir::new().unwrap();
        let config_path = config_dir.path().join("config.json");
        let env_path = config_dir.path().join(".env");
        tokio::fs::write(
            &env_path,
            "OPENAI_API_KEY=sk-openai-plaintext\nSKILL_KEY=sk-skill-plaintext\nUNRELATED=value\n",
        )
        .await
        .unwrap();

        let config = json!({
            "models": {"providers": {"openai": {"apiKey": "sk-openai-plaintext"}}},
            "skills": {"entries": {"review-pr": {"apiKey": "sk-skill-plaintext"}}},
            "channels": {"googlechat": {"serviceAccount": "sk-gchat-plaintext"}}
        });

        // No payload exists yet; the file source isn't configured either.
        let payload_path = state_dir.path().join("secrets.enc.json");
        let tool = ToolDriver::new(Arc::new(StaticRunner(json!({}))), "sops", openclaw_secrets_tool::MIN_OUTPUT_BYTES);

        let allowlist = vec!["OPENAI_API_KEY".to_string()];
        let input = MigrationPlanInput {
            config_path: &config_path,
            config: &config,
            config_dir: config_dir.path(),
            state_dir: state_dir.path(),
            explicit_auth_store_paths: &[],
            default_payload_path: &payload_path,
            env_file_path: &env_path,
            env_allowlist: &allowlist,
            scrub_env: true,
            tool: &tool,
            missing_binary_message: "missing sops",
            decrypt_timeout_ms: 5000,
        };

        let plan = build_migration_plan(&input).await.unwrap();

        assert!(plan.changed);
        assert_eq!(plan.counters.config_refs, 3);
        assert_eq!(plan.counters.secrets_written, 3);
        assert_eq!(
            plan.next_config.pointer("/models/providers/openai/apiKey").unwrap(),
            &json!({"source": "file", "id": "/providers/openai/apiKey"})
        );
        assert_eq!(
            plan.next_config.pointer("/channels/googlechat/serviceAccountRef").unwrap(),
            &json!({"source": "file", "id": "/channels/googlechat/serviceAccount"})
        );
        assert!(plan.next_config.pointer("/channels/googlechat/serviceAccount").is_none());
        assert_eq!(
            plan.next_config.pointer("/secrets/sources/file/type").unwrap(),
            "sops"
        );

        let env_plan = plan.env_file.unwrap();
        assert!(!env_plan.next_contents.contains("OPENAI_API_KEY"));
        assert!(env_plan.next_contents.contains("SKILL_KEY=sk-skill-plaintext"));
        assert!(env_plan.next_contents.contains("UNRELATED=value"));
        assert_eq!(plan.counters.env_entries_removed, 1);
    }

    #[tokio::test]
    async fn fully_migrated_tree_plans_no_changes() {
        let state_dir = TempDir::new().unwrap();
        let config_dir = TempDir::new().unwrap();
        let config_path = config_dir.path().join("config.json");
        let payload_path = state_dir.path().join("secrets.enc.json");
        tokio::fs::write(&payload_path, b"{}").await.unwrap();

        let config = json!({
            "models": {"providers": {"openai": {"apiKey": {"source": "file", "id": "/providers/openai/apiKey"}}}},
            "secrets": {"sources": {"file": {"type": "sops", "path": payload_path.display().to_string()}}}
        });

        let tool = ToolDriver::new(
            Arc::new(StaticRunner(json!({"providers": {"openai": {"apiKey": "sk-openai-plaintext"}}}))),
            "sops",
            openclaw_secrets_tool::MIN_OUTPUT_BYTES,
        );
        let env_path = config_dir.path().join(".env");
        let allowlist: Vec<String> = Vec::new();

        let input = MigrationPlanInput {
            config_path: &config_path,
            config: &config,
            config_dir: config_dir.path(),
            state_dir: state_dir.path(),
            explicit_auth_store_paths: &[],
            default_payload_path: &payload_path,
            env_file_path: &env_path,
            env_allowlist: &allowlist,
            scrub_env: true,
            tool: &tool,
            missing_binary_message: "missing sops",
            decrypt_timeout_ms: 5000,
        };

        let plan = build_migration_plan(&input).await.unwrap();
        assert!(!plan.changed);
        assert_eq!(plan.counters, MigrationCounters::default());
    }
}
