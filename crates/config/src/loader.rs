use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::BridgeConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "vkbridge.toml",
    "vkbridge.yaml",
    "vkbridge.yml",
    "vkbridge.json",
];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<BridgeConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./vkbridge.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/vkbridge/vkbridge.{toml,yaml,yml,json}` (user-global)
///
/// Returns `BridgeConfig::default()` if no config file is found. Env
/// overrides are applied in every case.
pub fn discover_and_load() -> BridgeConfig {
    let mut config = match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                BridgeConfig::default()
            })
        },
        None => {
            debug!("no config file found, using defaults");
            BridgeConfig::default()
        },
    };
    apply_env_overrides(&mut config);
    config
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES.iter().map(PathBuf::from);
    let global = config_dir()
        .into_iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)));
    local.chain(global).find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/vkbridge/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "vkbridge").map(|d| d.config_dir().to_path_buf())
}

/// Apply `VKBRIDGE_TOKEN` and `VKBRIDGE_GROUP_ID` from the environment.
pub fn apply_env_overrides(config: &mut BridgeConfig) {
    apply_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_overrides_with(config: &mut BridgeConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(token) = lookup("VKBRIDGE_TOKEN").filter(|t| !t.is_empty()) {
        config.vk.token = Secret::new(token);
    }
    if let Some(raw) = lookup("VKBRIDGE_GROUP_ID") {
        match raw.trim().parse::<u64>() {
            Ok(id) => config.vk.polling.group_id = Some(id),
            Err(e) => warn!(value = %raw, error = %e, "ignoring invalid VKBRIDGE_GROUP_ID"),
        }
    }
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<BridgeConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
