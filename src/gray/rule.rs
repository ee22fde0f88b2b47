//! Evaluation of a single traffic rule.
//!
//! # Evaluation Order
//! ```text
//! disabled?            → Disabled
//! identity allowed?    → Allowed (bypasses everything below)
//! identity denied?     → Denied
//! primary rate gate    → OutsidePrimaryRate
//! attribute targets    → TargetMismatch
//! expression predicate → ExpressionRejected / ExpressionFailed
//! secondary rate gate  → OutsideSecondaryRate
//!                      → Matched
//! ```
//!
//! # Design Decisions
//! - Order is fixed and short-circuiting
//! - Evaluation is pure and allocation-light: no I/O, no locks
//! - Expression failures never propagate; they count as no match

use crate::gray::attributes::RequestAttributes;
use crate::gray::expression::Bindings;
use crate::gray::hash::within_rate;
use crate::gray::schema::TrafficRule;
use crate::observability::metrics;

/// Outcome of evaluating one rule, with the step that decided it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict<'r> {
    Disabled,
    Allowed,
    Denied,
    OutsidePrimaryRate,
    TargetMismatch { dimension: &'r str },
    ExpressionRejected,
    ExpressionFailed,
    OutsideSecondaryRate,
    Matched,
}

impl Verdict<'_> {
    pub fn is_match(&self) -> bool {
        matches!(self, Verdict::Allowed | Verdict::Matched)
    }
}

impl TrafficRule {
    /// Returns true if the request falls into this rule's target group.
    pub fn matches(&self, attrs: &RequestAttributes) -> bool {
        self.evaluate(attrs).is_match()
    }

    /// Evaluate the rule and report which step decided the outcome.
    pub fn evaluate(&self, attrs: &RequestAttributes) -> Verdict<'_> {
        self.evaluate_with(&mut Bindings::new(attrs))
    }

    /// [`evaluate`](Self::evaluate) with expression bindings shared across
    /// the rules of one request.
    pub fn evaluate_with(&self, bindings: &mut Bindings<'_>) -> Verdict<'_> {
        let attrs = bindings.attrs();
        if !self.enabled {
            return Verdict::Disabled;
        }

        let identity = attrs.identity.as_str();
        if self.allow_list.contains(identity) {
            return Verdict::Allowed;
        }
        if self.deny_list.contains(identity) {
            return Verdict::Denied;
        }

        if !within_rate(identity, self.primary_rate) {
            return Verdict::OutsidePrimaryRate;
        }

        for (dimension, accepted) in &self.targets {
            if accepted.is_empty() {
                continue;
            }
            let member = attrs
                .dimension(dimension)
                .is_some_and(|value| accepted.contains(&*value));
            if !member {
                return Verdict::TargetMismatch {
                    dimension: dimension.as_str(),
                };
            }
        }

        if let Some(source) = self.expression_source() {
            let Some(predicate) = self.predicate() else {
                tracing::warn!(
                    expression = %source,
                    "Rule expression was never compiled, treating rule as unmatched"
                );
                metrics::record_expression_error();
                return Verdict::ExpressionFailed;
            };

            match predicate.evaluate_in(bindings) {
                Ok(true) => {}
                Ok(false) => return Verdict::ExpressionRejected,
                Err(e) => {
                    tracing::warn!(
                        expression = %source,
                        identity = %identity,
                        error = %e,
                        "Rule expression failed, treating rule as unmatched"
                    );
                    metrics::record_expression_error();
                    return Verdict::ExpressionFailed;
                }
            }
        }

        if !within_rate(identity, self.secondary_rate) {
            return Verdict::OutsideSecondaryRate;
        }

        Verdict::Matched
    }
}
