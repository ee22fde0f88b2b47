//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured fields)
//!     → metrics.rs (counters through the `metrics` facade)
//!
//! Consumers:
//!     → logging.rs subscriber (binaries only)
//!     → whatever recorder the embedding service installs
//! ```
//!
//! # Design Decisions
//! - The library never installs a subscriber or a recorder
//! - Counter updates are cheap enough for the request path

pub mod logging;
pub mod metrics;
