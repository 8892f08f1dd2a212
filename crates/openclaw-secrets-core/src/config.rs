//! The `secrets` subtree of the gateway config.

use serde::{Deserialize, Serialize};

pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretsConfig {
    #[serde(default)]
    pub sources: SecretsSources,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecretsSources {
    #[serde(default)]
    pub env: Option<EnvSource>,
    #[serde(default)]
    pub file: Option<FileSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvSource {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub path: String,
    #[serde(default, rename = "timeoutMs")]
    pub timeout_ms: Option<u64>,
}

impl FileSource {
    /// `timeoutMs` normalized by clamping to a positive integer, defaulting
    /// to [`DEFAULT_TIMEOUT_MS`] when absent or non-positive.
    pub fn normalized_timeout_ms(&self) -> u64 {
        match self.timeout_ms {
            Some(0) | None => DEFAULT_TIMEOUT_MS,
            Some(ms) => ms,
        }
    }

    pub fn is_sops(&self) -> bool {
        self.kind == "sops"
    }
}
