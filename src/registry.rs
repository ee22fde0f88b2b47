//! Engine registry.
//!
//! Built once at startup and passed to whoever needs decisions. Owns the
//! subscriptions, so updates stop when the registry is dropped.

use std::sync::Arc;

use crate::config::loader::{load_store, ConfigError, LoadedStore};
use crate::config::settings::EngineSettings;
use crate::config::source::ConfigSource;
use crate::config::store::ConfigGroupStore;
use crate::config::watcher::FileSource;
use crate::gray::decision::ExperimentDecision;
use crate::gray::expression::Sandbox;
use crate::gray::gray_hooks;
use crate::gray::schema::GrayConfig;

pub struct GrayRegistry {
    settings: EngineSettings,
    loaded: LoadedStore<GrayConfig>,
    decision: ExperimentDecision,
}

impl GrayRegistry {
    /// Load the gray document from `source` and subscribe to its groups.
    pub fn bootstrap(
        settings: &EngineSettings,
        source: Arc<dyn ConfigSource>,
    ) -> Result<Self, ConfigError> {
        let sandbox = Arc::new(Sandbox::new());
        let loaded = load_store(
            source,
            &settings.document_id,
            &settings.environment,
            gray_hooks(sandbox),
        )?;
        let decision = ExperimentDecision::new(loaded.store().clone());

        tracing::info!(
            environment = %settings.environment,
            document = %settings.document_id,
            groups = ?loaded.store().groups(),
            "Gray registry ready"
        );

        Ok(Self {
            settings: settings.clone(),
            loaded,
            decision,
        })
    }

    /// Bootstrap from files under `settings.source.root`.
    pub fn from_settings(settings: &EngineSettings) -> Result<Self, ConfigError> {
        let source = FileSource::new(&settings.source.root)
            .with_poll_interval(settings.source.poll_interval());
        Self::bootstrap(settings, Arc::new(source))
    }

    /// Handle for making decisions. Cheap to clone and share.
    pub fn decision(&self) -> ExperimentDecision {
        self.decision.clone()
    }

    pub fn store(&self) -> &Arc<ConfigGroupStore<GrayConfig>> {
        self.loaded.store()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }
}

impl std::fmt::Debug for GrayRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrayRegistry")
            .field("environment", &self.settings.environment)
            .field("loaded", &self.loaded)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::source::MemorySource;
    use crate::gray::attributes::RequestAttributes;

    const DOC: &str = r#"{ "shop": { "feature": { "checkout": { "enable": true,
        "rule": [ { "enable": true, "whitelist": ["7"], "targets": { "platform": ["whitelist-only"] },
            "target_group": "b" } ] } } } }"#;

    #[test]
    fn test_bootstrap_and_hot_reload() {
        let source = Arc::new(MemorySource::new());
        source.insert("gray.json", "test", DOC);

        let registry = GrayRegistry::bootstrap(&EngineSettings::default(), source.clone()).unwrap();
        let decision = registry.decision();
        let attrs = RequestAttributes::new("7");
        assert!(decision.gate("shop", "checkout", &attrs));

        source
            .publish(
                "gray.json",
                "test",
                DOC.replace("\"7\"", "\"8\"").as_bytes(),
            )
            .unwrap();
        assert!(!decision.gate("shop", "checkout", &attrs));
    }

    #[test]
    fn test_bootstrap_rejects_invalid_document() {
        let source = Arc::new(MemorySource::new());
        source.insert("gray.json", "test", DOC.replace("\"b\"", "\"a\""));
        let err = GrayRegistry::bootstrap(&EngineSettings::default(), source).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[test]
    fn test_from_settings_reads_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("test")).unwrap();
        std::fs::write(dir.path().join("test").join("gray.json"), DOC).unwrap();

        let mut settings = EngineSettings::default();
        settings.source.root = dir.path().to_path_buf();
        let registry = GrayRegistry::from_settings(&settings).unwrap();
        assert_eq!(registry.store().groups(), vec!["test"]);
        assert_eq!(
            registry.decision().list_enabled_features("shop"),
            vec!["checkout"]
        );
    }
}
