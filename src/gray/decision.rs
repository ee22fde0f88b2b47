//! Decisions served to callers.
//!
//! # Policies
//! - Unconfigured business or feature: gate open, stable cohort. Absence of
//!   configuration means a plain, non-experimental feature.
//! - Configured feature: the gate is open when the caller lands outside the
//!   stable cohort.
//! - Unrecognized cohort label: warn and use the stable cohort.
//! - Empty business identifier: gate closed, stable cohort, no features.
//!
//! Every facade call reads one snapshot and decides against it only.

use std::sync::Arc;

use crate::config::store::ConfigGroupStore;
use crate::gray::assignment::RuleTrace;
use crate::gray::attributes::RequestAttributes;
use crate::gray::cohort::Cohort;
use crate::gray::schema::GrayConfig;
use crate::observability::metrics;

impl GrayConfig {
    /// Cohort for a caller on one feature.
    pub fn cohort(&self, business: &str, feature: &str, attrs: &RequestAttributes) -> Cohort {
        self.resolve(business, feature, attrs).unwrap_or(Cohort::STABLE)
    }

    /// Whether the caller gets the feature.
    pub fn gate(&self, business: &str, feature: &str, attrs: &RequestAttributes) -> bool {
        if business.is_empty() {
            return false;
        }
        match self.resolve(business, feature, attrs) {
            Some(cohort) => !cohort.is_stable(),
            None => true,
        }
    }

    /// Names of the business's features with the master switch on, sorted.
    pub fn enabled_features(&self, business: &str) -> Vec<String> {
        if business.is_empty() {
            return Vec::new();
        }
        self.business(business)
            .map(|gray| {
                gray.feature
                    .iter()
                    .filter(|(_, feature)| feature.enabled)
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `None` when the business or feature is not configured.
    fn resolve(&self, business: &str, feature: &str, attrs: &RequestAttributes) -> Option<Cohort> {
        if business.is_empty() {
            return None;
        }
        let config = self.feature(business, feature)?;
        match config.group(attrs) {
            Ok(cohort) => Some(cohort),
            Err(e) => {
                tracing::warn!(
                    business = %business,
                    feature = %feature,
                    error = %e,
                    "Unrecognized cohort, using stable cohort"
                );
                metrics::record_unknown_cohort();
                Some(Cohort::STABLE)
            }
        }
    }
}

/// Cheap, cloneable handle answering gate and cohort questions against the
/// live configuration.
#[derive(Debug, Clone)]
pub struct ExperimentDecision {
    store: Arc<ConfigGroupStore<GrayConfig>>,
}

impl ExperimentDecision {
    pub fn new(store: Arc<ConfigGroupStore<GrayConfig>>) -> Self {
        Self { store }
    }

    /// Current configuration snapshot.
    pub fn snapshot(&self) -> Arc<GrayConfig> {
        self.store.get(None).0
    }

    pub fn gate(&self, business: &str, feature: &str, attrs: &RequestAttributes) -> bool {
        self.snapshot().gate(business, feature, attrs)
    }

    pub fn cohort(&self, business: &str, feature: &str, attrs: &RequestAttributes) -> Cohort {
        self.snapshot().cohort(business, feature, attrs)
    }

    pub fn list_enabled_features(&self, business: &str) -> Vec<String> {
        self.snapshot().enabled_features(business)
    }

    /// [`gate`](Self::gate) with the business taken from the attributes.
    pub fn gate_for(&self, attrs: &RequestAttributes, feature: &str) -> bool {
        self.gate(&attrs.business, feature, attrs)
    }

    /// [`cohort`](Self::cohort) with the business taken from the attributes.
    pub fn cohort_for(&self, attrs: &RequestAttributes, feature: &str) -> Cohort {
        self.cohort(&attrs.business, feature, attrs)
    }

    pub fn list_enabled_features_for(&self, attrs: &RequestAttributes) -> Vec<String> {
        self.list_enabled_features(&attrs.business)
    }

    /// Per-rule verdicts for a configured feature.
    pub fn explain(
        &self,
        business: &str,
        feature: &str,
        attrs: &RequestAttributes,
    ) -> Option<Vec<RuleTrace>> {
        let snapshot = self.snapshot();
        let config = snapshot.feature(business, feature)?;
        Some(config.explain(attrs))
    }
}
