//! Configuration validation.
//!
//! Parses a config file and reports semantic problems that would keep the
//! long-poll transport from running, or that silently change its behaviour.

use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;

use crate::{
    loader,
    schema::{BridgeConfig, WAIT_HINT_SECS},
};

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "missing", "timing", "ignored"
    pub category: &'static str,
    /// Dotted path, e.g. "vk.polling.retry_limit"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Load the config at `path` (or the discovered one) and validate it.
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = path
        .map(Path::to_path_buf)
        .or_else(loader::find_config_file);

    let Some(ref file) = config_path else {
        let mut config = BridgeConfig::default();
        loader::apply_env_overrides(&mut config);
        return validate_config(&config);
    };

    match loader::load_config(file) {
        Ok(mut config) => {
            loader::apply_env_overrides(&mut config);
            let mut result = validate_config(&config);
            result.config_path = config_path;
            result
        },
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: e.to_string(),
            }],
            config_path,
        },
    }
}

/// Validate an already-parsed config.
#[must_use]
pub fn validate_config(config: &BridgeConfig) -> ValidationResult {
    let mut diagnostics = Vec::new();
    let polling = &config.vk.polling;

    if config.vk.token.expose_secret().trim().is_empty() {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "missing",
            path: "vk.token".into(),
            message: "an access token is required to request a long-poll server".into(),
        });
    }

    if url::Url::parse(&config.vk.api_url).is_err() {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "syntax",
            path: "vk.api_url".into(),
            message: format!("'{}' is not a valid URL", config.vk.api_url),
        });
    }

    if polling.request_timeout_secs <= WAIT_HINT_SECS {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "timing",
            path: "vk.polling.request_timeout_secs".into(),
            message: format!(
                "request timeout ({}s) must exceed the {WAIT_HINT_SECS}s server wait hint",
                polling.request_timeout_secs
            ),
        });
    }

    if polling.retry_limit == 0 {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "timing",
            path: "vk.polling.retry_limit".into(),
            message: "every transient failure will rebuild the long-poll session".into(),
        });
    }

    if polling.wait_ms == 0 {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "timing",
            path: "vk.polling.wait_ms".into(),
            message: "failed session requests will be retried without delay".into(),
        });
    }

    for (field, value) in [
        ("webhook_secret", &polling.webhook_secret),
        ("webhook_confirmation", &polling.webhook_confirmation),
    ] {
        if value.is_some() {
            diagnostics.push(Diagnostic {
                severity: Severity::Info,
                category: "ignored",
                path: format!("vk.polling.{field}"),
                message: "callback delivery is not supported; the value is ignored".into(),
            });
        }
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {super::*, secrecy::Secret};

    fn valid() -> BridgeConfig {
        let mut cfg = BridgeConfig::default();
        cfg.vk.token = Secret::new("vk1.a.token".into());
        cfg
    }

    fn paths(result: &ValidationResult) -> Vec<&str> {
        result.diagnostics.iter().map(|d| d.path.as_str()).collect()
    }

    #[test]
    fn default_with_token_is_clean() {
        let result = validate_config(&valid());
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn missing_token_is_an_error() {
        let result = validate_config(&BridgeConfig::default());
        assert!(result.has_errors());
        assert_eq!(paths(&result), vec!["vk.token"]);
    }

    #[test]
    fn timeout_not_above_wait_hint_is_an_error() {
        let mut cfg = valid();
        cfg.vk.polling.request_timeout_secs = WAIT_HINT_SECS;
        let result = validate_config(&cfg);
        assert!(result.has_errors());
        assert_eq!(paths(&result), vec!["vk.polling.request_timeout_secs"]);

        cfg.vk.polling.request_timeout_secs = WAIT_HINT_SECS + 1;
        assert!(validate_config(&cfg).diagnostics.is_empty());
    }

    #[test]
    fn webhook_fields_are_reported_as_ignored() {
        let mut cfg = valid();
        cfg.vk.polling.webhook_secret = Some("s".into());
        cfg.vk.polling.webhook_confirmation = Some("c".into());
        let result = validate_config(&cfg);
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Info), 2);
    }

    #[test]
    fn zero_retry_limit_warns() {
        let mut cfg = valid();
        cfg.vk.polling.retry_limit = 0;
        let result = validate_config(&cfg);
        assert!(!result.has_errors());
        assert_eq!(result.count(Severity::Warning), 1);
    }

    #[test]
    fn unparsable_file_is_a_syntax_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vkbridge.toml");
        std::fs::write(&path, "[vk\ntoken = ").unwrap();
        let result = validate(Some(&path));
        assert!(result.has_errors());
        assert_eq!(result.diagnostics[0].category, "syntax");
        assert_eq!(result.config_path, Some(path));
    }
}
