//! Secrets runtime and migration core for the Openclaw gateway CLI: resolves
//! `SecretRef`s into a `RuntimeSnapshot`, activates snapshots process-wide,
//! and migrates plaintext credentials into reference form.

pub mod atomic_fs;
pub mod cli;
pub mod logging;
pub mod migrate;
pub mod resolver;
pub mod snapshot;

pub use openclaw_secrets_core::{
    AuthProfileKind, AuthProfileSite, BackupEntry, BackupManifest, FieldSite, ResolvedAuthStore, RuntimeSnapshot,
    SecretRef, SecretsConfig, SnapshotWarning,
};
pub use openclaw_secrets_tool::ToolDriver;

pub use resolver::{resolve_secret_ref_string, resolve_secret_ref_value, ResolutionContext, SecretRefResolveCache};
pub use snapshot::{
    prepare_snapshot, ActivationEvent, ActivationPhase, AuthStoreLoader, SnapshotActivator, SnapshotBuildInput,
};
