//! Cohort assignment for one feature.
//!
//! Rules are tried in declared order; the first enabled rule that matches
//! decides the cohort. List order is priority order.

use serde::Serialize;

use crate::gray::attributes::RequestAttributes;
use crate::gray::cohort::{Cohort, UnknownCohort};
use crate::gray::expression::Bindings;
use crate::gray::rule::Verdict;
use crate::gray::schema::FeatureConfig;

/// Verdict of one rule while explaining an assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleTrace {
    pub index: usize,
    pub target_group: String,
    pub verdict: String,
    pub matched: bool,
}

impl FeatureConfig {
    /// Cohort for this request.
    ///
    /// A disabled feature puts everyone in the stable cohort without
    /// looking at the rules.
    pub fn group(&self, attrs: &RequestAttributes) -> Result<Cohort, UnknownCohort> {
        if !self.enabled {
            return Ok(Cohort::STABLE);
        }

        let mut bindings = Bindings::new(attrs);
        for rule in self.rules.iter().filter(|r| r.enabled) {
            if rule.evaluate_with(&mut bindings).is_match() {
                return rule.target_group.parse();
            }
        }

        Ok(Cohort::STABLE)
    }

    /// Per-rule verdicts in order, stopping at the first match.
    pub fn explain(&self, attrs: &RequestAttributes) -> Vec<RuleTrace> {
        if !self.enabled {
            return Vec::new();
        }

        let mut bindings = Bindings::new(attrs);
        let mut traces = Vec::new();
        for (index, rule) in self.rules.iter().enumerate() {
            let verdict = rule.evaluate_with(&mut bindings);
            let matched = verdict.is_match();
            tracing::debug!(index, verdict = ?verdict, "Rule evaluated");
            traces.push(RuleTrace {
                index,
                target_group: rule.target_group.clone(),
                verdict: describe(verdict),
                matched,
            });
            if matched {
                break;
            }
        }
        traces
    }
}

fn describe(verdict: Verdict<'_>) -> String {
    match verdict {
        Verdict::Disabled => "disabled".into(),
        Verdict::Allowed => "identity in whitelist".into(),
        Verdict::Denied => "identity in blacklist".into(),
        Verdict::OutsidePrimaryRate => "outside rate".into(),
        Verdict::TargetMismatch { dimension } => format!("{dimension} not targeted"),
        Verdict::ExpressionRejected => "expression false".into(),
        Verdict::ExpressionFailed => "expression failed".into(),
        Verdict::OutsideSecondaryRate => "outside traffic_rate".into(),
        Verdict::Matched => "matched".into(),
    }
}
