//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! ConfigSource (memory / files)
//!     → loader.rs (fetch, decode, validate & format hooks)
//!     → store.rs (one ConfigCell per group: env, env_a, env_b, ...)
//!     → readers take Arc snapshots from cell.rs
//!
//! On change notification:
//!     source.rs / watcher.rs deliver new bytes
//!     → loader.rs decodes and validates a candidate
//!     → atomic swap in the group's ConfigCell
//!     → listeners observe the new snapshot
//! ```
//!
//! # Design Decisions
//! - Snapshots are immutable once published; changes replace them whole
//! - Validation runs against a candidate before the swap
//! - `settings.rs` configures the engine itself and is read once at startup

pub mod cell;
pub mod loader;
pub mod settings;
pub mod source;
pub mod store;
pub mod validation;
pub mod watcher;

pub use cell::ConfigCell;
pub use loader::{load_store, ConfigError, LoadHooks, LoadedStore};
pub use settings::EngineSettings;
pub use source::{ConfigSource, MemorySource, SourceError, Subscription};
pub use store::{ConfigGroupStore, StoreError};
pub use watcher::FileSource;
