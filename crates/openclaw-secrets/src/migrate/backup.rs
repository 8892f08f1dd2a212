//! Backup manifest creation, restoration, and retention pruning.

use std::path::{Path, PathBuf};

use openclaw_secrets_core::{BackupEntry, BackupManifest};

use crate::atomic_fs::write_json_atomic;

/// Allocates a unique `YYYYMMDDThhmmssZ` backup id under `backups_root`,
/// appending a short disambiguator on collision.
pub fn allocate_backup_id(backups_root: &Path) -> Result<String, anyhow::Error> {
    let base = format_backup_timestamp(time::OffsetDateTime::now_utc())?;
    allocate_unique(backups_root, &base)
}

fn allocate_unique(backups_root: &Path, base: &str) -> Result<String, anyhow::Error> {
    if !backups_root.join(base).exists() {
        return Ok(base.to_string());
    }
    for suffix in 2..1000 {
        let candidate = format!("{base}-{suffix}");
        if !backups_root.join(&candidate).exists() {
            return Ok(candidate);
        }
    }
    anyhow::bail!("unable to allocate a unique backup id for {base}")
}

fn format_backup_timestamp(now: time::OffsetDateTime) -> Result<String, anyhow::Error> {
    use time::macros::format_description;
    let format = format_description!("[year][month][day]T[hour][minute][second]Z");
    Ok(now.format(&format)?)
}

fn now_rfc3339() -> Result<String, anyhow::Error> {
    Ok(time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339)?)
}

/// Copies every target into `backup_dir`, recording a manifest entry for
/// each — `existed: true` with a preserved-mode copy, or `existed: false`
/// when the target is absent, so rollback knows to delete it.
pub async fn create_backup(backup_dir: &Path, backup_id: &str, targets: &[PathBuf]) -> Result<BackupManifest, anyhow::Error> {
    tokio::fs::create_dir_all(backup_dir).await?;
    let mut manifest = BackupManifest::new(backup_id.to_string(), now_rfc3339()?);

    for (index, target) in targets.iter().enumerate() {
        match tokio::fs::metadata(target).await {
            Ok(meta) => {
                let backup_name = format!("{index}-{}", file_name_or(target));
                tokio::fs::copy(target, backup_dir.join(&backup_name)).await?;
                manifest.entries.push(BackupEntry {
                    path: target.display().to_string(),
                    existed: true,
                    backup_path: Some(backup_name),
                    mode: file_mode(&meta),
                });
            }
            Err(_) => {
                manifest.entries.push(BackupEntry {
                    path: target.display().to_string(),
                    existed: false,
                    backup_path: None,
                    mode: None,
                });
            }
        }
    }

    write_json_atomic(&backup_dir.join("manifest.json"), &serde_json::to_value(&manifest)?, 0o600).await?;
    Ok(manifest)
}

fn file_name_or(path: &Path) -> String {
    path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "file".to_string())
}

#[cfg(unix)]
fn file_mode(meta: &std::fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt as _;
    Some(meta.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn file_mode(_meta: &std::fs::Metadata) -> Option<u32> {
    None
}

/// Restores every manifest entry: copies the backup copy back over existing
/// targets, or deletes targets recorded as absent. Safe to call twice.
pub async fn restore_from_manifest(
    backup_dir: &Path,
    manifest: &BackupManifest,
) -> Result<(Vec<PathBuf>, Vec<PathBuf>), anyhow::Error> {
    let mut restored = Vec::new();
    let mut deleted = Vec::new();

    for entry in &manifest.entries {
        let target = PathBuf::from(&entry.path);
        if entry.existed {
            let backup_name = entry
                .backup_path
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("manifest entry for {} is missing its backup_path", entry.path))?;
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::copy(backup_dir.join(backup_name), &target).await?;
            if let Some(mode) = entry.mode {
                set_mode(&target, mode).await?;
            }
            restored.push(target);
        } else {
            match tokio::fs::remove_file(&target).await {
                Ok(()) => deleted.push(target),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => deleted.push(target),
                Err(err) => return Err(err.into()),
            }
        }
    }

    Ok((restored, deleted))
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> Result<(), anyhow::Error> {
    use std::os::unix::fs::PermissionsExt as _;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> Result<(), anyhow::Error> {
    Ok(())
}

/// Keeps the most recent 20 backups by `backupId` sort order, deleting the
/// rest.
pub async fn prune_backups(backups_root: &Path) -> Result<(), anyhow::Error> {
    const RETAIN: usize = 20;

    let mut read_dir = match tokio::fs::read_dir(backups_root).await {
        Ok(rd) => rd,
        Err(_) => return Ok(()),
    };

    let mut ids = Vec::new();
    while let Some(entry) = read_dir.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            ids.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    ids.sort();

    if ids.len() > RETAIN {
        for stale in &ids[..ids.len() - RETAIN] {
            let _ = tokio::fs::remove_dir_all(backups_root.join(stale)).await;
        }
    }
    Ok(())
}
