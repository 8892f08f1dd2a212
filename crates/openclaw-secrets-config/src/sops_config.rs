//! Discovery of the `sops` configuration file alongside the gateway config,
//! so every tool invocation behaves the same regardless of the process's
//! current working directory.

use std::path::{Path, PathBuf};

const CANDIDATES: [&str; 2] = [".sops.yaml", ".sops.yml"];

/// Returns the first of `<config_dir>/.sops.yaml`, `<config_dir>/.sops.yml`
/// that exists, or `None` if neither does.
pub fn discover_sops_config(config_dir: &Path) -> Option<PathBuf> {
    CANDIDATES
        .iter()
        .map(|name| config_dir.join(name))
        .find(|path| path.is_file())
}

/// Expands a leading `~` in a user-supplied path (e.g. a `sources.file.path`
/// value) to the current user's home directory.
pub fn expand_user_path(path: &str) -> Result<PathBuf, anyhow::Error> {
    let expanded = shellexpand::tilde(path);
    Ok(PathBuf::from(expanded.into_owned()))
}
