//! State-directory and `sops`-config-file resolution for the gateway's
//! secrets runtime and migration core.

pub mod sops_config;
pub mod state_dir;

pub use sops_config::{discover_sops_config, expand_user_path};
pub use state_dir::{canonical_state_dir, default_secrets_file_path, resolve_state_dir, STATE_DIR_ENV};
