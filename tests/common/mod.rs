//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use graygate::config::settings::EngineSettings;
use graygate::config::source::MemorySource;
use graygate::GrayRegistry;

pub const DOCUMENT: &str = "gray.json";
pub const ENVIRONMENT: &str = "prod";

/// Gray document with one business and a few features.
///
/// Zero rates do not gate, so the checkout whitelist rule carries a target no
/// caller has to keep it exclusive to the listed identity.
pub fn gray_document(checkout_whitelist: &str) -> String {
    format!(
        r#"{{
            "shop": {{
                "feature": {{
                    "checkout": {{
                        "enable": true,
                        "rule": [
                            {{ "enable": true, "whitelist": ["{checkout_whitelist}"], "targets": {{ "platform": ["whitelist-only"] }}, "target_group": "c" }},
                            {{ "enable": true, "rate": 0.5, "targets": {{ "platform": ["ios"] }}, "target_group": "b" }}
                        ]
                    }},
                    "search": {{
                        "enable": true,
                        "rule": [
                            {{ "enable": true, "expresion": "user.role >= 2 && app.version == \"2.0\"", "target_group": "b" }}
                        ]
                    }},
                    "legacy": {{ "enable": false, "rule": [] }}
                }}
            }}
        }}"#
    )
}

pub fn settings() -> EngineSettings {
    EngineSettings {
        environment: ENVIRONMENT.to_string(),
        document_id: DOCUMENT.to_string(),
        ..EngineSettings::default()
    }
}

/// Memory source seeded with a stable group and a `b` group.
pub fn memory_source() -> Arc<MemorySource> {
    let source = Arc::new(MemorySource::new());
    source.insert(DOCUMENT, "prod_a", gray_document("1"));
    source.insert(DOCUMENT, "prod_b", gray_document("2"));
    source
}

pub fn registry(source: &Arc<MemorySource>) -> GrayRegistry {
    GrayRegistry::bootstrap(&settings(), source.clone()).expect("registry bootstraps")
}
