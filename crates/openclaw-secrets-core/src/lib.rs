//! Leaf data model and JSON Pointer codec for the gateway's secrets runtime
//! and migration core. No I/O lives here.

pub mod config;
pub mod field_site;
pub mod manifest;
pub mod pointer;
pub mod secret_ref;
pub mod snapshot;

pub use config::SecretsConfig;
pub use field_site::{AuthProfileKind, AuthProfileSite, FieldSite};
pub use manifest::{BackupEntry, BackupManifest};
pub use secret_ref::SecretRef;
pub use snapshot::{ResolvedAuthStore, RuntimeSnapshot, SnapshotWarning};
