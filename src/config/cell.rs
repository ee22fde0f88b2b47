//! A hot-swappable configuration snapshot with change listeners.
//!
//! # Design Decisions
//! - Readers load an `Arc<T>` lock-free; they never wait on writers or on
//!   each other
//! - Writers replace the whole value; readers see the old or the new
//!   snapshot, never a mix
//! - Listeners run after the swap, outside any lock, so a slow listener
//!   cannot stall readers or later updates
//! - A panicking listener is logged and skipped; the rest still run

use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Callback invoked with every newly published snapshot.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// One configuration snapshot plus its listeners.
pub struct ConfigCell<T> {
    current: ArcSwap<T>,
    listeners: DashMap<String, Listener<T>>,
}

impl<T> ConfigCell<T> {
    pub fn new(initial: T) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            listeners: DashMap::new(),
        }
    }

    /// Current snapshot.
    pub fn get(&self) -> Arc<T> {
        self.current.load_full()
    }

    /// Publish a new snapshot and notify listeners.
    pub fn set(&self, value: T) {
        let value = Arc::new(value);
        self.current.store(value.clone());

        // Clone the callbacks out so no map shard stays locked while they run.
        let listeners: Vec<(String, Listener<T>)> = self
            .listeners
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        for (name, listener) in listeners {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| listener(&*value))) {
                tracing::error!(
                    listener = %name,
                    reason = %panic_message(panic.as_ref()),
                    "Config listener panicked"
                );
            }
        }
    }

    /// Register a listener, replacing any listener with the same name.
    pub fn register_listener<F>(&self, name: impl Into<String>, listener: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.listeners.insert(name.into(), Arc::new(listener));
    }

    /// Remove a listener. Unknown names are ignored.
    pub fn unregister_listener(&self, name: &str) {
        self.listeners.remove(name);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl<T: Default> Default for ConfigCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> fmt::Debug for ConfigCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigCell")
            .field("listeners", &self.listeners.len())
            .finish_non_exhaustive()
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
