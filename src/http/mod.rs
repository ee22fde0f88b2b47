//! HTTP integration.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → middleware.rs (x-gray-* headers → RequestAttributes in extensions)
//!     → handler extracts Attributes
//!     → ExperimentDecision::gate / cohort
//! ```

pub mod middleware;

pub use middleware::{attributes_from_headers, attributes_middleware, Attributes};
