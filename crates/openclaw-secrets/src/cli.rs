//! `clap`-derived CLI surface: `reload`, `migrate`, and `status` subcommands
//! sharing global config/state-dir/log-level flags.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "openclaw-secrets", version, about = "Secrets runtime and migration core for the Openclaw gateway")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to the gateway config file. Defaults to `<stateDir>/config.json`.
    #[arg(long, global = true, env = "OPENCLAW_CONFIG")]
    pub config: Option<PathBuf>,

    /// Overrides the gateway state directory. Defaults to `~/.openclaw`.
    #[arg(long, global = true, env = "OPENCLAW_STATE_DIR")]
    pub state_dir: Option<PathBuf>,

    /// Overrides the `tracing` filter. Defaults to `RUST_LOG`, then `info`.
    #[arg(long, global = true, env = "OPENCLAW_LOG")]
    pub log: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Builds a fresh `RuntimeSnapshot` and activates it.
    Reload(ReloadArgs),
    /// Plans (and optionally applies) a plaintext-to-reference migration.
    Migrate(MigrateArgs),
    /// Reports whether a snapshot is currently active.
    Status(StatusArgs),
}

#[derive(Debug, clap::Args)]
pub struct ReloadArgs {
    /// Emit the result as JSON instead of a human-readable summary.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, clap::Args)]
pub struct MigrateArgs {
    /// Apply the plan instead of only reporting what it would do.
    #[arg(long)]
    pub write: bool,

    /// Skip rewriting `<configDir>/.env`, even if migrated values came from it.
    #[arg(long = "no-scrub-env")]
    pub no_scrub_env: bool,

    /// Emit the plan/outcome as JSON instead of a human-readable summary.
    #[arg(long)]
    pub json: bool,

    /// Restores the filesystem to the state captured by this backup id,
    /// instead of planning a new migration.
    #[arg(long)]
    pub rollback: Option<String>,

    /// Comma-separated env-var names eligible for scrubbing, in addition to
    /// the built-in default list.
    #[arg(long = "env-allowlist", value_delimiter = ',')]
    pub env_allowlist: Vec<String>,

    /// Decrypt/encrypt timeout, overriding `secrets.sources.file.timeoutMs`.
    #[arg(long = "timeout-ms")]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, clap::Args)]
pub struct StatusArgs {
    #[arg(long)]
    pub json: bool,
}

/// Secret-bearing env-var names scrubbed by default; `--env-allowlist`
/// extends this list rather than replacing it.
pub const DEFAULT_ENV_ALLOWLIST: &[&str] = &[
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
    "GOOGLE_API_KEY",
    "GOOGLECHAT_SERVICE_ACCOUNT",
];
