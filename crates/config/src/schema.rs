/// Config schema types (VK account, long-poll tuning, cursor state).
use std::{path::PathBuf, time::Duration};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Public VK API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.vk.com";

/// VK API version sent as `v=` on every method call.
pub const DEFAULT_API_VERSION: &str = "5.131";

/// How long the long-poll server may hold a request open (seconds). Sent as
/// `wait=` on every poll; request timeouts must exceed it.
pub const WAIT_HINT_SECS: u64 = 25;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub vk: VkAccountConfig,
    pub state: StateConfig,
}

impl BridgeConfig {
    /// Copy of the config with the access token masked, for display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.vk.token.expose_secret().is_empty() {
            copy.vk.token = Secret::new("[REDACTED]".into());
        }
        copy
    }
}

/// A single VK account (user or community token).
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VkAccountConfig {
    /// Access token for the VK API.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    /// Base URL of the VK API, without the `/method` suffix.
    pub api_url: String,

    /// API version passed as `v=`.
    pub api_version: String,

    /// Long-poll transport tuning.
    pub polling: PollingConfig,
}

impl std::fmt::Debug for VkAccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VkAccountConfig")
            .field("token", &"[REDACTED]")
            .field("api_url", &self.api_url)
            .field("api_version", &self.api_version)
            .field("polling", &self.polling)
            .finish()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for VkAccountConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            api_url: DEFAULT_API_URL.into(),
            api_version: DEFAULT_API_VERSION.into(),
            polling: PollingConfig::default(),
        }
    }
}

/// Long-poll transport options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PollingConfig {
    /// Delay between session reacquisition attempts (ms).
    pub wait_ms: u64,

    /// Consecutive transient failures tolerated before the session is
    /// rebuilt from scratch.
    pub retry_limit: u32,

    /// Poll on behalf of this community. `None` polls the account itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<u64>,

    /// Delay before retrying after a transient failure (ms).
    pub retry_backoff_ms: u64,

    /// Upper bound for a single poll request (seconds). Must exceed the
    /// 25 second wait hint sent to the server.
    pub request_timeout_secs: u64,

    /// How long idle pooled connections are kept (seconds).
    pub pool_idle_timeout_secs: u64,

    /// Maximum idle pooled connections per host.
    pub pool_max_idle_per_host: usize,

    /// Callback API secret. Accepted for compatibility, not used by the
    /// long-poll transport.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_secret: Option<String>,

    /// Callback API confirmation string. Accepted for compatibility, not
    /// used by the long-poll transport.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_confirmation: Option<String>,
}

impl PollingConfig {
    #[must_use]
    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }

    #[must_use]
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub fn pool_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.pool_idle_timeout_secs)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            wait_ms: 3_000,
            retry_limit: 3,
            group_id: None,
            retry_backoff_ms: 3_000,
            request_timeout_secs: 30,
            pool_idle_timeout_secs: 90,
            pool_max_idle_per_host: 4,
            webhook_secret: None,
            webhook_confirmation: None,
        }
    }
}

/// Where the last delivered cursor is persisted between runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl StateConfig {
    /// Configured path, or `cursor.json` in the user data directory.
    #[must_use]
    pub fn resolved_path(&self) -> PathBuf {
        if let Some(ref path) = self.path {
            return path.clone();
        }
        directories::ProjectDirs::from("", "", "vkbridge")
            .map(|d| d.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
            .join("cursor.json")
    }
}
