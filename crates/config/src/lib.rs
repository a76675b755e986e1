//! Configuration loading, validation and env substitution.
//!
//! Config files: `vkbridge.toml`, `vkbridge.yaml` or `vkbridge.json`.
//! Searched in `./` then `~/.config/vkbridge/`.
//!
//! Supports `${ENV_VAR}` substitution in all string values.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{apply_env_overrides, config_dir, discover_and_load, find_config_file, load_config},
    schema::{BridgeConfig, PollingConfig, StateConfig, VkAccountConfig, WAIT_HINT_SECS},
    validate::{Diagnostic, Severity, ValidationResult, validate, validate_config},
};
