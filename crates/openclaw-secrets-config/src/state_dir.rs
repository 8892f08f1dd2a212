//! Resolution of the gateway's state directory: explicit override, then an
//! environment variable, then a canonical fallback under the user's home
//! directory.

use std::{env, path::PathBuf};

pub const STATE_DIR_ENV: &str = "OPENCLAW_STATE_DIR";
const CANONICAL_DIR_NAME: &str = ".openclaw";

/// Resolves the directory under which the gateway keeps its encrypted
/// secrets file, backups, and per-agent state. Does not create the
/// directory — callers create it lazily when they need to write into it.
pub fn resolve_state_dir(cli_override: Option<PathBuf>) -> Result<PathBuf, anyhow::Error> {
    resolve_state_dir_inner(cli_override, env::var(STATE_DIR_ENV).ok())
}

fn resolve_state_dir_inner(
    cli_override: Option<PathBuf>,
    env_override: Option<String>,
) -> Result<PathBuf, anyhow::Error> {
    if let Some(path) = cli_override {
        return Ok(path);
    }
    if let Some(path) = env_override {
        if path.trim().is_empty() {
            anyhow::bail!("{STATE_DIR_ENV} must not be empty");
        }
        return Ok(PathBuf::from(path));
    }
    canonical_state_dir()
}

/// `~/.openclaw`, used both as the default state dir and as the default
/// location of the encrypted secrets file when no explicit state-dir
/// override is configured.
pub fn canonical_state_dir() -> Result<PathBuf, anyhow::Error> {
    let home = directories::UserDirs::new()
        .ok_or_else(|| anyhow::anyhow!("unable to determine the current user's home directory"))?;
    Ok(home.home_dir().join(CANONICAL_DIR_NAME))
}

/// True when an explicit state-dir override is configured (either via CLI or
/// `OPENCLAW_STATE_DIR`), distinguishing `<stateDir>/secrets.enc.json` from
/// the canonical `~/.openclaw/secrets.enc.json` default path.
pub fn has_explicit_override(cli_override: &Option<PathBuf>) -> bool {
    cli_override.is_some() || env::var(STATE_DIR_ENV).is_ok_and(|v| !v.trim().is_empty())
}

/// Default location of the encrypted secrets payload:
/// `<stateDir>/secrets.enc.json` when an explicit state-dir override is
/// configured, else the canonical `~/.openclaw/secrets.enc.json`.
pub fn default_secrets_file_path(cli_override: Option<PathBuf>) -> Result<PathBuf, anyhow::Error> {
    let explicit = has_explicit_override(&cli_override);
    let state_dir = resolve_state_dir(cli_override)?;
    let _ = explicit;
    Ok(state_dir.join("secrets.enc.json"))
}
