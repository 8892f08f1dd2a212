//! The immutable, fully-resolved `RuntimeSnapshot` produced by the snapshot
//! builder and consumed by the activator.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const WARNING_REF_OVERRIDES_PLAINTEXT: &str = "SECRETS_REF_OVERRIDES_PLAINTEXT";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotWarning {
    pub code: String,
    pub message: String,
    pub site: String,
}

impl SnapshotWarning {
    pub fn ref_overrides_plaintext(site: impl Into<String>) -> Self {
        let site = site.into();
        Self {
            code: WARNING_REF_OVERRIDES_PLAINTEXT.to_string(),
            message: format!("secret reference at \"{site}\" overrides a plaintext sibling value"),
            site,
        }
    }
}

/// A per-agent auth store after `keyRef`/`tokenRef` fields have been
/// resolved to literal `key`/`token` fields in the copy. Mutations live only
/// in the snapshot; the builder never persists this back to disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedAuthStore {
    pub agent_dir: String,
    pub store: Value,
}

/// Immutable once built. No value reachable from `config` or `auth_stores`
/// may structurally equal a `SecretRef`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuntimeSnapshot {
    pub config: Value,
    pub auth_stores: Vec<ResolvedAuthStore>,
    pub warnings: Vec<SnapshotWarning>,
    /// Monotonic timestamp (nanoseconds since an arbitrary epoch) used only
    /// for ordering activations, never for wall-clock display.
    pub resolved_at: i128,
}
