//! Engine settings.
//!
//! Settings describe where the engine finds its documents and how it logs.
//! All fields have defaults so a missing or minimal file still works.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming the deployment environment.
pub const ENV_VAR: &str = "ENV";

/// Environment variable overriding the file source root.
pub const SOURCE_ROOT_VAR: &str = "GRAYGATE_SOURCE_ROOT";

/// Errors raised while loading settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Root settings for the engine.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Environment name. Group keys are `env` and `env_<cohort>`.
    pub environment: String,

    /// Document to discover in every group.
    pub document_id: String,

    pub source: SourceSettings,

    pub logging: LoggingSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            environment: "test".to_string(),
            document_id: "gray.json".to_string(),
            source: SourceSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// File source settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourceSettings {
    /// Directory holding one sub-directory per group.
    pub root: PathBuf,

    /// Watcher poll interval, for backends that poll.
    pub poll_interval_secs: u64,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./config"),
            poll_interval_secs: 2,
        }
    }
}

impl SourceSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset (trace, debug, info, warn, error).
    pub level: String,

    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl EngineSettings {
    /// Load and validate settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, SettingsError> {
        let settings: EngineSettings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Apply `ENV` and `GRAYGATE_SOURCE_ROOT` when set and non-empty.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var(ENV_VAR).ok(),
            std::env::var(SOURCE_ROOT_VAR).ok(),
        )
    }

    fn with_overrides(mut self, environment: Option<String>, root: Option<String>) -> Self {
        if let Some(environment) = environment.filter(|v| !v.trim().is_empty()) {
            self.environment = environment.trim().to_string();
        }
        if let Some(root) = root.filter(|v| !v.trim().is_empty()) {
            self.source.root = PathBuf::from(root);
        }
        self
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.environment.trim().is_empty() {
            return Err(SettingsError::Invalid("environment must not be empty".into()));
        }
        if self.environment.contains('_') {
            return Err(SettingsError::Invalid(format!(
                "environment `{}` must not contain `_`",
                self.environment
            )));
        }
        if self.document_id.trim().is_empty() {
            return Err(SettingsError::Invalid("document_id must not be empty".into()));
        }
        if self.source.poll_interval_secs == 0 {
            return Err(SettingsError::Invalid(
                "source.poll_interval_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = EngineSettings::from_toml("").unwrap();
        assert_eq!(settings.environment, "test");
        assert_eq!(settings.document_id, "gray.json");
        assert_eq!(settings.source.poll_interval(), Duration::from_secs(2));
        assert_eq!(settings.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_parse_full() {
        let settings = EngineSettings::from_toml(
            r#"
            environment = "prod"
            document_id = "experiments.json"

            [source]
            root = "/etc/graygate"
            poll_interval_secs = 5

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(settings.environment, "prod");
        assert_eq!(settings.source.root, PathBuf::from("/etc/graygate"));
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(settings.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_settings() {
        for raw in [
            r#"environment = """#,
            r#"environment = "prod_b""#,
            r#"document_id = " ""#,
            "[source]\npoll_interval_secs = 0",
        ] {
            assert!(
                matches!(EngineSettings::from_toml(raw), Err(SettingsError::Invalid(_))),
                "{raw} should be rejected"
            );
        }
        assert!(matches!(
            EngineSettings::from_toml("environment = 3"),
            Err(SettingsError::Parse(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let settings = EngineSettings::default()
            .with_overrides(Some("prod".into()), Some("/srv/gray".into()));
        assert_eq!(settings.environment, "prod");
        assert_eq!(settings.source.root, PathBuf::from("/srv/gray"));

        let untouched = EngineSettings::default().with_overrides(Some("  ".into()), None);
        assert_eq!(untouched.environment, "test");
    }
}
