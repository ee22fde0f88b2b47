//! Gray release engine.
//!
//! # Data Flow
//! ```text
//! raw document (JSON)
//!     → schema.rs (GrayConfig)
//!     → GrayConfig::prepare: validate → format → compile expressions
//!     → published snapshot (ConfigCell)
//!
//! per request:
//!     RequestAttributes
//!     → decision.rs (snapshot lookup, fallback policies)
//!     → assignment.rs (first matching rule wins)
//!     → rule.rs (allow/deny → rate → targets → expression → traffic rate)
//!     → Cohort / gate
//! ```
//!
//! # Design Decisions
//! - Evaluation is pure and in-memory; it never blocks or allocates much
//! - Expressions are compiled once per document, never per request
//! - An invalid candidate document never reaches readers

pub mod assignment;
pub mod attributes;
pub mod cohort;
pub mod decision;
pub mod expression;
pub mod hash;
pub mod rule;
pub mod schema;

use std::sync::Arc;

use crate::config::loader::LoadHooks;
use crate::gray::expression::Sandbox;
use crate::gray::schema::GrayConfig;

pub use attributes::{AccountFields, RequestAttributes};
pub use cohort::{Cohort, UnknownCohort};
pub use decision::ExperimentDecision;
pub use schema::{FeatureConfig, Gray, TrafficRule};

/// Load pipeline for gray documents: prepare on validate, log on load.
pub fn gray_hooks(sandbox: Arc<Sandbox>) -> LoadHooks<GrayConfig> {
    LoadHooks::new()
        .with_validate(move |config: &mut GrayConfig| config.prepare(&sandbox))
        .with_on_load(|group: &str, config: &GrayConfig| {
            let features: usize = config.businesses.values().map(|g| g.feature.len()).sum();
            tracing::debug!(
                group = %group,
                businesses = config.businesses.len(),
                features,
                "Gray config snapshot published"
            );
        })
}
