//! Tempfile-then-rename writes, shared by the migration engine's config/auth
//! store/env-file/manifest writes.

use std::path::Path;

use serde_json::Value;

pub async fn write_json_atomic(path: &Path, value: &Value, mode: u32) -> Result<(), anyhow::Error> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes, mode).await
}

pub async fn write_text_atomic(path: &Path, contents: &str, mode: u32) -> Result<(), anyhow::Error> {
    write_atomic(path, contents.as_bytes(), mode).await
}

pub async fn write_atomic(path: &Path, bytes: &[u8], mode: u32) -> Result<(), anyhow::Error> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir).await?;

    let pid = std::process::id();
    let tmp_path = tempfile::Builder::new()
        .prefix(&format!(".openclaw-write-{pid}-"))
        .suffix(".tmp")
        .tempfile_in(dir)?
        .into_temp_path()
        .keep()?;

    let result: Result<(), anyhow::Error> = async {
        tokio::fs::write(&tmp_path, bytes).await?;
        set_mode(&tmp_path, mode).await?;
        tokio::fs::rename(&tmp_path, path).await?;
        Ok(())
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&tmp_path).await;
    }
    result
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
