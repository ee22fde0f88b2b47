//! Loading configuration groups from a source and keeping them current.
//!
//! # Data Flow
//! ```text
//! startup:
//!     source.groups(document_id) → keep env / env_<cohort>
//!     → fetch → decode (serde_json) → validate hook → format hook
//!     → ConfigGroupStore (stable group required)
//!     → subscribe every group
//!
//! on change:
//!     unchanged bytes?           → skip
//!     decode / validate failure  → warn, keep last known-good snapshot
//!     transport error            → warn, keep last known-good snapshot
//!     otherwise                  → ConfigCell::set → listeners → on_load hook
//! ```
//!
//! # Design Decisions
//! - Any failure during the initial load is fatal: there is no snapshot yet
//!   to fall back to
//! - The group set is fixed at startup; groups created later are ignored
//! - No lock is held while decoding, publishing or running listeners, so a
//!   slow listener never delays the next update and a listener may publish
//!   to its own group. Concurrent updates race; the last one to finish
//!   decoding is published

use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

use crate::config::cell::ConfigCell;
use crate::config::source::{ConfigSource, SourceError, Subscription};
use crate::config::store::{group_key, parse_group_key, ConfigGroupStore, StoreError};
use crate::config::validation::{join_errors, ValidationError};
use crate::gray::cohort::Cohort;
use crate::observability::metrics;

/// Errors raised while loading configuration groups.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config source error: {0}")]
    Source(#[from] SourceError),

    #[error("failed to parse group `{group}`: {source}")]
    Parse {
        group: String,
        source: serde_json::Error,
    },

    #[error("group `{group}` failed validation: {}", join_errors(.errors))]
    Validation {
        group: String,
        errors: Vec<ValidationError>,
    },

    #[error("document `{document_id}` has no stable group for environment `{environment}`")]
    NoStableGroup {
        environment: String,
        document_id: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type ValidateHook<T> = Arc<dyn Fn(&mut T) -> Result<(), Vec<ValidationError>> + Send + Sync>;
pub type FormatHook<T> = Arc<dyn Fn(&mut T) + Send + Sync>;
pub type LoadHook<T> = Arc<dyn Fn(&str, &T) + Send + Sync>;

/// Optional steps run on every candidate document.
///
/// `validate` may mutate the candidate (normalization, compilation). It runs
/// before `format`. `on_load` sees each snapshot after it is published.
pub struct LoadHooks<T> {
    pub validate: Option<ValidateHook<T>>,
    pub format: Option<FormatHook<T>>,
    pub on_load: Option<LoadHook<T>>,
}

impl<T> LoadHooks<T> {
    pub fn new() -> Self {
        Self {
            validate: None,
            format: None,
            on_load: None,
        }
    }

    pub fn with_validate<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut T) -> Result<(), Vec<ValidationError>> + Send + Sync + 'static,
    {
        self.validate = Some(Arc::new(hook));
        self
    }

    pub fn with_format<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        self.format = Some(Arc::new(hook));
        self
    }

    pub fn with_on_load<F>(mut self, hook: F) -> Self
    where
        F: Fn(&str, &T) + Send + Sync + 'static,
    {
        self.on_load = Some(Arc::new(hook));
        self
    }
}

impl<T> Default for LoadHooks<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for LoadHooks<T> {
    fn clone(&self) -> Self {
        Self {
            validate: self.validate.clone(),
            format: self.format.clone(),
            on_load: self.on_load.clone(),
        }
    }
}

/// Parse, validate and format one candidate document.
pub fn decode<T: DeserializeOwned>(
    group: &str,
    raw: &[u8],
    hooks: &LoadHooks<T>,
) -> Result<T, ConfigError> {
    let mut value: T = serde_json::from_slice(raw).map_err(|source| ConfigError::Parse {
        group: group.to_string(),
        source,
    })?;

    if let Some(validate) = &hooks.validate {
        validate(&mut value).map_err(|errors| ConfigError::Validation {
            group: group.to_string(),
            errors,
        })?;
    }
    if let Some(format) = &hooks.format {
        format(&mut value);
    }
    Ok(value)
}

/// A loaded store plus the subscriptions keeping it current.
///
/// Dropping this stops updates; the store itself stays readable.
pub struct LoadedStore<T> {
    store: Arc<ConfigGroupStore<T>>,
    subscriptions: Vec<Subscription>,
}

impl<T> LoadedStore<T> {
    pub fn store(&self) -> &Arc<ConfigGroupStore<T>> {
        &self.store
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

impl<T> std::fmt::Debug for LoadedStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedStore")
            .field("store", &self.store)
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

/// Load every group of `document_id` for `environment` and subscribe to
/// changes.
pub fn load_store<T>(
    source: Arc<dyn ConfigSource>,
    document_id: &str,
    environment: &str,
    hooks: LoadHooks<T>,
) -> Result<LoadedStore<T>, ConfigError>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    let groups: Vec<String> = source
        .groups(document_id)?
        .into_iter()
        .filter(|key| parse_group_key(environment, key).is_some())
        .collect();

    let keys: HashSet<&str> = groups.iter().map(String::as_str).collect();
    let stable_a = group_key(environment, Some(Cohort::STABLE));
    if !keys.contains(stable_a.as_str()) && !keys.contains(environment) {
        return Err(ConfigError::NoStableGroup {
            environment: environment.to_string(),
            document_id: document_id.to_string(),
        });
    }

    let mut initial = Vec::with_capacity(groups.len());
    let mut digests = Vec::with_capacity(groups.len());
    for group in &groups {
        let raw = source.fetch(document_id, group)?;
        let value = decode(group, &raw, &hooks)?;
        digests.push(xxh3_64(&raw));
        initial.push((group.clone(), value));
    }

    let store = Arc::new(ConfigGroupStore::new(environment, initial)?);

    let mut subscriptions = Vec::with_capacity(groups.len());
    for (group, digest) in groups.iter().zip(digests) {
        let Some(cell) = store.cell_by_key(group).cloned() else {
            continue;
        };
        if let Some(on_load) = &hooks.on_load {
            on_load(group, &cell.get());
        }
        tracing::info!(document = %document_id, group = %group, "Config group loaded");

        let updater = GroupUpdater {
            group: group.clone(),
            cell,
            hooks: hooks.clone(),
            last_digest: AtomicU64::new(digest),
        };
        let subscription = source.subscribe(
            document_id,
            group,
            Arc::new(move |change: Result<Vec<u8>, SourceError>| updater.apply(change)),
        )?;
        subscriptions.push(subscription);
    }

    Ok(LoadedStore {
        store,
        subscriptions,
    })
}

/// Applies incoming changes for one group.
struct GroupUpdater<T> {
    group: String,
    cell: Arc<ConfigCell<T>>,
    hooks: LoadHooks<T>,
    last_digest: AtomicU64,
}

impl<T: DeserializeOwned> GroupUpdater<T> {
    fn apply(&self, change: Result<Vec<u8>, SourceError>) {
        let raw = match change {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(
                    group = %self.group,
                    error = %e,
                    "Config subscription error, keeping current snapshot"
                );
                metrics::record_config_update(&self.group, "transport_error");
                return;
            }
        };

        let digest = xxh3_64(&raw);
        if digest == self.last_digest.load(Ordering::Acquire) {
            self.skip_unchanged();
            return;
        }

        let value = match decode(&self.group, &raw, &self.hooks) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    group = %self.group,
                    error = %e,
                    "Rejected config update, keeping last known-good snapshot"
                );
                metrics::record_config_update(&self.group, "rejected");
                return;
            }
        };

        // Another delivery of the same bytes may have won while decoding.
        if self.last_digest.swap(digest, Ordering::AcqRel) == digest {
            self.skip_unchanged();
            return;
        }

        self.cell.set(value);
        metrics::record_config_update(&self.group, "applied");
        tracing::info!(group = %self.group, "Config group reloaded");
        if let Some(on_load) = &self.hooks.on_load {
            on_load(&self.group, &self.cell.get());
        }
    }

    fn skip_unchanged(&self) {
        tracing::debug!(group = %self.group, "Config update unchanged, skipping");
        metrics::record_config_update(&self.group, "unchanged");
    }
}
