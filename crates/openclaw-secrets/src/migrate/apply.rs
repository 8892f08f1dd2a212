//! Applies a [`MigrationPlan`] atomically and rolls back by backup id.

use std::path::Path;

use openclaw_secrets_core::BackupManifest;
use openclaw_secrets_tool::ToolDriver;

use crate::atomic_fs::{write_json_atomic, write_text_atomic};

use super::backup::{allocate_backup_id, create_backup, prune_backups, restore_from_manifest};
use super::types::{ApplyOutcome, MigrationPlan, RollbackOutcome};

/// Writes every changed artifact from `plan`. If the plan touches nothing,
/// returns immediately without creating a backup. Any write failure rolls
/// the filesystem back to the pre-apply backup before returning the error.
pub async fn apply_migration_plan(
    plan: &MigrationPlan,
    backups_root: &Path,
    tool: &ToolDriver,
    timeout_ms: u64,
    missing_binary_message: &str,
) -> Result<ApplyOutcome, anyhow::Error> {
    if !plan.changed {
        return Ok(ApplyOutcome { changed: false, backup_id: None, counters: plan.counters.clone() });
    }

    let backup_id = allocate_backup_id(backups_root)?;
    let backup_dir = backups_root.join(&backup_id);
    let manifest = create_backup(&backup_dir, &backup_id, &plan.backup_targets).await?;

    match write_plan(plan, tool, timeout_ms, missing_binary_message).await {
        Ok(()) => {
            prune_backups(backups_root).await?;
            Ok(ApplyOutcome { changed: true, backup_id: Some(backup_id), counters: plan.counters.clone() })
        }
        Err(err) => {
            restore_from_manifest(&backup_dir, &manifest).await?;
            Err(anyhow::anyhow!("Secrets migration failed and was rolled back from backup {backup_id}: {err}"))
        }
    }
}

/// Writes the payload first (the riskiest step, since it shells out to the
/// external tool), then config, then auth stores, then the env file — so a
/// mid-apply failure never leaves a config pointing at secrets that were
/// never written.
async fn write_plan(
    plan: &MigrationPlan,
    tool: &ToolDriver,
    timeout_ms: u64,
    missing_binary_message: &str,
) -> Result<(), anyhow::Error> {
    if plan.payload_changed {
        tool.encrypt(
            &plan.payload_path,
            &plan.next_payload,
            timeout_ms,
            missing_binary_message,
            plan.sops_config_path.as_deref(),
        )
        .await?;
    }

    if plan.config_changed {
        write_json_atomic(&plan.config_path, &plan.next_config, 0o600).await?;
    }

    for store in &plan.auth_stores {
        if store.changed {
            write_json_atomic(&store.path, &store.next, 0o600).await?;
        }
    }

    if let Some(env_plan) = &plan.env_file {
        if env_plan.changed {
            write_text_atomic(&env_plan.path, &env_plan.next_contents, 0o600).await?;
        }
    }

    Ok(())
}

/// Restores every file recorded under `backup_id`'s manifest.
pub async fn rollback(backups_root: &Path, backup_id: &str) -> Result<RollbackOutcome, anyhow::Error> {
    let backup_dir = backups_root.join(backup_id);
    let manifest_path = backup_dir.join("manifest.json");
    let bytes = tokio::fs::read(&manifest_path)
        .await
        .map_err(|err| anyhow::anyhow!("no backup named \"{backup_id}\" was found: {err}"))?;
    let manifest: BackupManifest = serde_json::from_slice(&bytes)?;

    let (restored_files, deleted_files) = restore_from_manifest(&backup_dir, &manifest).await?;
    Ok(RollbackOutcome { backup_id: backup_id.to_string(), restored_files, deleted_files })
}

#[cfg(test)]
mod tests {
    use super::*;
    use openclaw_secrets_tool::{CommandOutput, RunError, SubprocessRunner};
    use serde_json::json;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct StaticRunner;
    impl SubprocessRunner for StaticRunner {
        fn run<'a>(
            &'a self,
            _program: &'a str,
            _args: &'a [String],
            _max_stdout_bytes: usize,
        ) -> Pin<Box<dyn Future<Output = Result<CommandOutput, RunError>> + Send + 'a>> {
            Box::pin(async move { Ok(CommandOutput { success: true, stdout: Vec::new(), stderr: Vec::new() }) })
        }
    }

    struct FailingRunner;
    impl SubprocessRunner for FailingRunner {
        fn run<'a>(
            &'a self,
            _program: &'a str,
            _args: &'a [String],
            _max_stdout_bytes: usize,
        ) -> Pin<Box<dyn Future<Output = Result<CommandOutput, RunError>> + Send + 'a>> {
            Box::pin(async move {
                Ok(CommandOutput { success: false, stdout: Vec::new(), stderr: b"denied".to_vec() })
            })
        }
    }

    fn minimal_plan(root: &Path, config_changed: bool) -> MigrationPlan {
        use super::super::types::MigrationCounters;
        MigrationPlan {
            config_path: root.join("config.json"),
            next_config: json!({"a": 1}),
            config_changed,
            payload_path: root.join("secrets.enc.json"),
            sops_config_path: None,
            file_source_was_configured: true,
            next_payload: json!({}),
            payload_changed: false,
            auth_stores: Vec::new(),
            env_file: None,
            counters: MigrationCounters::default(),
            changed: config_changed,
            backup_targets: if config_changed { vec![root.join("config.json")] } else { Vec::new() },
        }
    }

    #[tokio::test]
    async fn no_op_plan_skips_backup_creation() {
        let root = TempDir::new().unwrap();
        let plan = minimal_plan(root.path(), false);
        let tool = ToolDriver::new(Arc::new(StaticRunner), "sops", openclaw_secrets_tool::MIN_OUTPUT_BYTES);
        let outcome = apply_migration_plan(&plan, &root.path().join("backups"), &tool, 5000, "missing").await.unwrap();
        assert!(!outcome.changed);
        assert!(outcome.backup_id.is_none());
        assert!(!root.path().join("backups").exists());
    }

    #[tokio::test]
    async fn successful_apply_writes_config_and_creates_backup() {
        let root = TempDir::new().unwrap();
        tokio::fs::write(root.path().join("config.json"), b"{\"a\":0}").await.unwrap();
        let plan = minimal_plan(root.path(), true);
        let tool = ToolDriver::new(Arc::new(StaticRunner), "sops", openclaw_secrets_tool::MIN_OUTPUT_BYTES);
        let backups_root = root.path().join("backups");
        let outcome = apply_migration_plan(&plan, &backups_root, &tool, 5000, "missing").await.unwrap();
        assert!(outcome.changed);
        let backup_id = outcome.backup_id.unwrap();
        assert!(backups_root.join(&backup_id).join("manifest.json").exists());

        let written: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(root.path().join("config.json")).await.unwrap()).unwrap();
        assert_eq!(written, json!({"a": 1}));
    }

    #[tokio::test]
    async fn failed_encrypt_rolls_back_and_preserves_backup() {
        let root = TempDir::new().unwrap();
        tokio::fs::write(root.path().join("config.json"), b"{\"a\":0}").await.unwrap();
        let mut plan = minimal_plan(root.path(), true);
        plan.payload_changed = true;
        plan.backup_targets.push(plan.payload_path.clone());

        let tool = ToolDriver::new(Arc::new(FailingRunner), "sops", openclaw_secrets_tool::MIN_OUTPUT_BYTES);
        let backups_root = root.path().join("backups");
        let err = apply_migration_plan(&plan, &backups_root, &tool, 5000, "missing").await.unwrap_err();
        assert!(err.to_string().contains("rolled back from backup"));

        let preserved = tokio::fs::read(root.path().join("config.json")).await.unwrap();
        assert_eq!(preserved, b"{\"a\":0}");
    }

    #[tokio::test]
    async fn rollback_restores_files_from_named_backup() {
        let root = TempDir::new().unwrap();
        tokio::fs::write(root.path().join("config.json"), b"{\"a\":0}").await.unwrap();
        let plan = minimal_plan(root.path(), true);
        let tool = ToolDriver::new(Arc::new(StaticRunner), "sops", openclaw_secrets_tool::MIN_OUTPUT_BYTES);
        let backups_root = root.path().join("backups");
        let outcome = apply_migration_plan(&plan, &backups_root, &tool, 5000, "missing").await.unwrap();
        let backup_id = outcome.backup_id.unwrap();

        tokio::fs::write(root.path().join("config.json"), b"{\"a\":99}").await.unwrap();
        let rollback_outcome = rollback(&backups_root, &backup_id).await.unwrap();
        assert_eq!(rollback_outcome.restored_files, vec![root.path().join("config.json")]);

        let restored = tokio::fs::read(root.path().join("config.json")).await.unwrap();
        assert_eq!(restored, b"{\"a\":0}");
    }

    #[tokio::test]
    async fn rollback_with_unknown_backup_id_is_an_error() {
        let root = TempDir::new().unwrap();
        let err = rollback(&root.path().join("backups"), "does-not-exist").await.unwrap_err();
        assert!(err.to_string().contains("no backup named"));
    }
}
