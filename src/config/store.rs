//! Per-cohort configuration cells for one document.
//!
//! # Responsibilities
//! - Hold one `ConfigCell` per group key (`env`, `env_a`, `env_b`, ...)
//! - Resolve a cohort to its cell, falling back to the stable group
//! - Route listener registration to the exact group's cell
//!
//! # Design Decisions
//! - The set of groups is fixed at construction (no locks on lookup)
//! - The stable group must exist; other groups are optional
//! - Registering against a missing group is an error, never a no-op

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::config::cell::ConfigCell;
use crate::gray::cohort::Cohort;

/// Errors from group store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("no configuration group `{key}`")]
    UnknownGroup { key: String },

    #[error("no stable configuration group for environment `{environment}`")]
    MissingStableGroup { environment: String },
}

/// Key of the group holding `cohort`'s configuration.
pub fn group_key(environment: &str, cohort: Option<Cohort>) -> String {
    match cohort {
        Some(cohort) => format!("{environment}_{cohort}"),
        None => environment.to_string(),
    }
}

/// Classify a key: `Some(None)` for the bare environment key,
/// `Some(Some(c))` for `env_c`, `None` for keys of other environments.
pub fn parse_group_key(environment: &str, key: &str) -> Option<Option<Cohort>> {
    if key == environment {
        return Some(None);
    }
    let suffix = key.strip_prefix(environment)?.strip_prefix('_')?;
    Cohort::parse(suffix).map(Some)
}

/// Configuration cells keyed by group.
pub struct ConfigGroupStore<T> {
    environment: String,
    cells: HashMap<String, Arc<ConfigCell<T>>>,
    stable_key: String,
}

impl<T> ConfigGroupStore<T> {
    /// Build a store from the initial snapshot of every group.
    pub fn new<I>(environment: impl Into<String>, groups: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = (String, T)>,
    {
        let environment = environment.into();
        let cells: HashMap<_, _> = groups
            .into_iter()
            .map(|(key, value)| (key, Arc::new(ConfigCell::new(value))))
            .collect();

        let stable_key = [group_key(&environment, Some(Cohort::STABLE)), environment.clone()]
            .into_iter()
            .find(|key| cells.contains_key(key))
            .ok_or_else(|| StoreError::MissingStableGroup {
                environment: environment.clone(),
            })?;

        Ok(Self {
            environment,
            cells,
            stable_key,
        })
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Key of the stable group (`env_a` if present, else `env`).
    pub fn stable_key(&self) -> &str {
        &self.stable_key
    }

    /// All group keys, sorted.
    pub fn groups(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.cells.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Cell for the exact group, without fallback. `None` selects the
    /// stable group.
    pub fn cell(&self, cohort: Option<Cohort>) -> Option<&Arc<ConfigCell<T>>> {
        match cohort {
            Some(cohort) => self.cells.get(&group_key(&self.environment, Some(cohort))),
            None => self.stable(),
        }
    }

    pub(crate) fn cell_by_key(&self, key: &str) -> Option<&Arc<ConfigCell<T>>> {
        self.cells.get(key)
    }

    fn stable(&self) -> Option<&Arc<ConfigCell<T>>> {
        self.cells.get(&self.stable_key)
    }

    /// Snapshot of the stable group.
    pub fn stable_snapshot(&self) -> Option<Arc<T>> {
        self.stable().map(|cell| cell.get())
    }

    /// Register a listener on the exact group's cell.
    pub fn register_listener<F>(
        &self,
        cohort: Option<Cohort>,
        name: impl Into<String>,
        listener: F,
    ) -> Result<(), StoreError>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.require(cohort)?.register_listener(name, listener);
        Ok(())
    }

    /// Remove a listener from the exact group's cell.
    pub fn unregister_listener(&self, cohort: Option<Cohort>, name: &str) -> Result<(), StoreError> {
        self.require(cohort)?.unregister_listener(name);
        Ok(())
    }

    fn require(&self, cohort: Option<Cohort>) -> Result<&Arc<ConfigCell<T>>, StoreError> {
        self.cell(cohort).ok_or_else(|| StoreError::UnknownGroup {
            key: group_key(&self.environment, cohort),
        })
    }
}

impl<T: Default> ConfigGroupStore<T> {
    /// Snapshot for a cohort.
    ///
    /// Resolution: the cohort's own group, then the stable group, then a
    /// default value with `found == false`.
    pub fn get(&self, cohort: Option<Cohort>) -> (Arc<T>, bool) {
        let cell = cohort
            .and_then(|c| self.cells.get(&group_key(&self.environment, Some(c))))
            .or_else(|| self.stable());

        match cell {
            Some(cell) => (cell.get(), true),
            None => (Arc::new(T::default()), false),
        }
    }
}

impl<T> std::fmt::Debug for ConfigGroupStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigGroupStore")
            .field("environment", &self.environment)
            .field("groups", &self.groups())
            .field("stable_key", &self.stable_key)
            .finish()
    }
}
