use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use clap::Parser;
use openclaw_secrets::cli::{Cli, Command, MigrateArgs, ReloadArgs, StatusArgs, DEFAULT_ENV_ALLOWLIST};
use openclaw_secrets::migrate::{apply_migration_plan, build_migration_plan, rollback, MigrationPlanInput};
use openclaw_secrets::snapshot::{AuthStoreLoader, SnapshotBuildInput};
use openclaw_secrets::{logging, prepare_snapshot, ActivationPhase, SecretsConfig, SnapshotActivator, ToolDriver};
use serde_json::{json, Value};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    logging::init(cli.log.as_deref())?;

    let state_dir = openclaw_secrets_config::resolve_state_dir(cli.state_dir.clone())?;
    let config_path = cli.config.clone().unwrap_or_else(|| state_dir.join("config.json"));

    match cli.command {
        Command::Reload(args) => run_reload(&state_dir, &config_path, args).await,
        Command::Migrate(args) => run_migrate(&state_dir, &config_path, args).await,
        Command::Status(args) => run_status(args),
    }
}

async fn run_reload(state_dir: &Path, config_path: &Path, args: ReloadArgs) -> Result<(), anyhow::Error> {
    let config = read_config(config_path).await?;
    let secrets_config: SecretsConfig =
        serde_json::from_value(config.pointer("/secrets").cloned().unwrap_or(json!({})))
            .map_err(|err| anyhow::anyhow!("invalid config at /secrets: {err}"))?;

    let tool = ToolDriver::default();
    let sops_config_path = openclaw_secrets_config::discover_sops_config(
        config_path.parent().unwrap_or_else(|| Path::new(".")),
    );
    let loader = FilesystemAuthStoreLoader { state_dir: state_dir.to_path_buf() };
    let agent_dirs = discover_agent_dirs(state_dir);

    let input = SnapshotBuildInput {
        config: &config,
        secrets_config: &secrets_config,
        env: None,
        agent_dirs: &agent_dirs,
        loader: &loader,
        tool: &tool,
        sops_config_path: sops_config_path.as_deref(),
        missing_binary_message: "sops was not found on PATH; install sops >= 3.9.0",
    };

    info!(agent_dirs = agent_dirs.len(), "building runtime snapshot");
    let outcome = prepare_snapshot(&input, now_nanos()).await;
    let warning_count = outcome.as_ref().map(|s| s.warnings.len()).unwrap_or(0);
    let activation = SnapshotActivator::global().activate(ActivationPhase::Startup, outcome);

    match activation {
        Ok(()) => {
            if args.json {
                println!("{}", json!({ "activated": true, "warningCount": warning_count }));
            } else {
                println!("secrets reloaded ({warning_count} warning(s))");
            }
            Ok(())
        }
        Err(err) => Err(err),
    }
}

async fn run_migrate(state_dir: &Path, config_path: &Path, args: MigrateArgs) -> Result<(), anyhow::Error> {
    if let Some(backup_id) = &args.rollback {
        let outcome = rollback(&state_dir.join("backups").join("secrets-migrate"), backup_id).await?;
        if args.json {
            println!(
                "{}",
                json!({
                    "backupId": outcome.backup_id,
                    "restoredFiles": outcome.restored_files,
                    "deletedFiles": outcome.deleted_files,
                })
            );
        } else {
            println!(
                "rolled back backup {}: restored {} file(s), deleted {} file(s)",
                outcome.backup_id,
                outcome.restored_files.len(),
                outcome.deleted_files.len()
            );
        }
        return Ok(());
    }

    let config = read_config(config_path).await?;
    let config_dir = config_path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
    let default_payload_path = openclaw_secrets_config::default_secrets_file_path(Some(state_dir.to_path_buf()))?;
    let env_file_path = config_dir.join(".env");

    let mut allowlist: Vec<String> = DEFAULT_ENV_ALLOWLIST.iter().map(|s| s.to_string()).collect();
    allowlist.extend(args.env_allowlist.iter().cloned());

    let tool = ToolDriver::default();
    let input = MigrationPlanInput {
        config_path,
        config: &config,
        config_dir: &config_dir,
        state_dir,
        explicit_auth_store_paths: &[],
        default_payload_path: &default_payload_path,
        env_file_path: &env_file_path,
        env_allowlist: &allowlist,
        scrub_env: !args.no_scrub_env,
        tool: &tool,
        missing_binary_message: "sops was not found on PATH; install sops >= 3.9.0",
        decrypt_timeout_ms: args.timeout_ms.unwrap_or(openclaw_secrets_core::config::DEFAULT_TIMEOUT_MS),
    };

    let plan = build_migration_plan(&input).await?;

    if !args.write {
        print_plan_summary(&plan, args.json);
        return Ok(());
    }

    let backups_root = state_dir.join("backups").join("secrets-migrate");
    let outcome = apply_migration_plan(
        &plan,
        &backups_root,
        &tool,
        args.timeout_ms.unwrap_or(openclaw_secrets_core::config::DEFAULT_TIMEOUT_MS),
        "sops was not found on PATH; install sops >= 3.9.0",
    )
    .await?;

    if args.json {
        println!(
            "{}",
            json!({
                "changed": outcome.changed,
                "backupId": outcome.backup_id,
                "counters": counters_to_json(&outcome.counters),
            })
        );
    } else if outcome.changed {
        println!("migration applied, backup {}", outcome.backup_id.unwrap_or_default());
        print_counters(&outcome.counters);
    } else {
        println!("nothing to migrate");
    }
    Ok(())
}

fn run_status(args: StatusArgs) -> Result<(), anyhow::Error> {
    let activator = SnapshotActivator::global();
    let active = activator.get_active();
    let degraded = activator.is_degraded();

    if args.json {
        println!(
            "{}",
            json!({
                "active": active.is_some(),
                "resolvedAt": active.as_ref().map(|s| s.resolved_at.to_string()),
                "degraded": degraded,
                "warningCount": active.as_ref().map(|s| s.warnings.len()).unwrap_or(0),
            })
        );
    } else {
        match active {
            Some(snapshot) => println!(
                "snapshot active (resolvedAt={}, degraded={}, warnings={})",
                snapshot.resolved_at,
                degraded,
                snapshot.warnings.len()
            ),
            None => println!("no snapshot active"),
        }
    }
    Ok(())
}

fn print_plan_summary(plan: &openclaw_secrets::migrate::MigrationPlan, json_out: bool) {
    if json_out {
        println!(
            "{}",
            json!({
                "mode": "dry-run",
                "changed": plan.changed,
                "counters": counters_to_json(&plan.counters),
            })
        );
    } else if plan.changed {
        println!("migration plan would change the following:");
        print_counters(&plan.counters);
    } else {
        println!("nothing to migrate");
    }
}

fn print_counters(counters: &openclaw_secrets::migrate::MigrationCounters) {
    println!("  configRefs: {}", counters.config_refs);
    println!("  authProfileRefs: {}", counters.auth_profile_refs);
    println!("  plaintextRemoved: {}", counters.plaintext_removed);
    println!("  secretsWritten: {}", counters.secrets_written);
    println!("  envEntriesRemoved: {}", counters.env_entries_removed);
    println!("  authStoresChanged: {}", counters.auth_stores_changed);
}

fn counters_to_json(counters: &openclaw_secrets::migrate::MigrationCounters) -> Value {
    json!({
        "configRefs": counters.config_refs,
        "authProfileRefs": counters.auth_profile_refs,
        "plaintextRemoved": counters.plaintext_removed,
        "secretsWritten": counters.secrets_written,
        "envEntriesRemoved": counters.env_entries_removed,
        "authStoresChanged": counters.auth_stores_changed,
    })
}

async fn read_config(path: &Path) -> Result<Value, anyhow::Error> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|err| anyhow::anyhow!("failed to read config at {}: {err}", path.display()))?;
    serde_json::from_slice(&bytes).map_err(|err| anyhow::anyhow!("invalid JSON in {}: {err}", path.display()))
}

fn discover_agent_dirs(state_dir: &Path) -> Vec<String> {
    let agents_dir = state_dir.join("agents");
    let Ok(entries) = std::fs::read_dir(&agents_dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

fn now_nanos() -> i128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as i128)
        .unwrap_or(0)
}

struct FilesystemAuthStoreLoader {
    state_dir: PathBuf,
}

impl AuthStoreLoader for FilesystemAuthStoreLoader {
    fn load<'a>(
        &'a self,
        agent_dir: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Value>, anyhow::Error>> + Send + 'a>> {
        Box::pin(async move {
            let path = self.state_dir.join("agents").join(agent_dir).join("agent").join("auth-profiles.json");
            match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(err) => Err(err.into()),
            }
        })
    }
}

