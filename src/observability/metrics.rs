//! Engine counters.
//!
//! # Metrics
//! - `graygate_config_updates_total` (counter): configuration updates by
//!   `group` and `outcome` (`applied`, `rejected`, `unchanged`,
//!   `transport_error`)
//! - `graygate_expression_errors_total` (counter): rule predicates that
//!   failed at request time
//! - `graygate_unknown_cohort_total` (counter): unrecognized cohort labels
//!   met while deciding
//!
//! Without an installed recorder every call is a no-op.

pub const CONFIG_UPDATES: &str = "graygate_config_updates_total";
pub const EXPRESSION_ERRORS: &str = "graygate_expression_errors_total";
pub const UNKNOWN_COHORT: &str = "graygate_unknown_cohort_total";

/// Record the outcome of one incoming configuration update.
pub fn record_config_update(group: &str, outcome: &'static str) {
    ::metrics::counter!(
        CONFIG_UPDATES,
        "group" => group.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_expression_error() {
    ::metrics::counter!(EXPRESSION_ERRORS).increment(1);
}

pub fn record_unknown_cohort() {
    ::metrics::counter!(UNKNOWN_COHORT).increment(1);
}
