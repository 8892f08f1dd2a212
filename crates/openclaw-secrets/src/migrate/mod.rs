//! Plaintext-to-reference migration engine: plan a rewrite of config, auth
//! stores, and the encrypted payload, then apply it with a
//! backup-manifest-backed atomic commit and rollback.

pub mod apply;
pub mod backup;
pub mod env_scrub;
pub mod plan;
pub mod types;

pub use apply::{apply_migration_plan, rollback};
pub use backup::{allocate_backup_id, create_backup, prune_backups, restore_from_manifest};
pub use plan::{auth_store_scope, build_migration_plan, MigrationPlanInput};
pub use types::{ApplyOutcome, AuthStorePlan, EnvFilePlan, MigrationCounters, MigrationPlan, RollbackOutcome};
