//! `BackupManifest` — record of files backed up (or marked absent) before a
//! migration write, enabling deterministic rollback.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupEntry {
    pub path: String,
    /// `false` means the file was absent at backup time; restoring such an
    /// entry deletes the current file rather than copying anything back.
    pub existed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupManifest {
    pub version: u32,
    pub backup_id: String,
    pub created_at: String,
    pub entries: Vec<BackupEntry>,
}

impl BackupManifest {
    pub const FORMAT_VERSION: u32 = 1;

    pub fn new(backup_id: impl Into<String>, created_at: impl Into<String>) -> Self {
        Self {
            version: Self::FORMAT_VERSION,
            backup_id: backup_id.into(),
            created_at: created_at.into(),
            entries: Vec::new(),
        }
    }
}
