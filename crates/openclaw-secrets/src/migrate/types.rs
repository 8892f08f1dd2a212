//! Shared types produced by [`super::plan::build_migration_plan`] and
//! consumed by [`super::apply`].

use std::path::PathBuf;

use serde_json::Value;

/// Mutation counters accumulated during planning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationCounters {
    pub config_refs: u32,
    pub auth_profile_refs: u32,
    pub plaintext_removed: u32,
    pub secrets_written: u32,
    pub env_entries_removed: u32,
    pub auth_stores_changed: u32,
}

#[derive(Debug, Clone)]
pub struct AuthStorePlan {
    pub path: PathBuf,
    pub scope: String,
    pub original: Value,
    pub next: Value,
    pub changed: bool,
}

#[derive(Debug, Clone)]
pub struct EnvFilePlan {
    pub path: PathBuf,
    pub original_contents: String,
    pub next_contents: String,
    pub changed: bool,
}

/// Everything needed to apply (or merely report) a planned migration.
/// Planning never touches disk beyond reads; [`super::apply::apply_migration_plan`]
/// is the only function in this module that writes.
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    pub config_path: PathBuf,
    pub next_config: Value,
    pub config_changed: bool,

    pub payload_path: PathBuf,
    pub sops_config_path: Option<PathBuf>,
    pub file_source_was_configured: bool,
    pub next_payload: Value,
    pub payload_changed: bool,

    pub auth_stores: Vec<AuthStorePlan>,
    pub env_file: Option<EnvFilePlan>,

    pub counters: MigrationCounters,
    pub changed: bool,
    pub backup_targets: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub changed: bool,
    pub backup_id: Option<String>,
    pub counters: MigrationCounters,
}

#[derive(Debug, Clone)]
pub struct RollbackOutcome {
    pub backup_id: String,
    pub restored_files: Vec<PathBuf>,
    pub deleted_files: Vec<PathBuf>,
}
