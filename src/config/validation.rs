//! Configuration validation errors.
//!
//! # Responsibilities
//! - Describe semantic problems found in a candidate document
//! - Locate each problem with a path (`business.feature[2].rate`)
//!
//! # Design Decisions
//! - Validators return all errors, not just the first
//! - Any error rejects the whole document; partial documents never load
//! - Validation runs on a candidate before it is swapped in

use std::fmt;
use thiserror::Error;

/// What is wrong with a field.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationErrorKind {
    #[error("target group `a` is reserved for the stable cohort")]
    ReservedTargetGroup,

    #[error("invalid target group `{0}`, expected a single letter b-z")]
    InvalidTargetGroup(String),

    #[error("{field} {value} is outside [0, 1]")]
    RateOutOfRange { field: &'static str, value: f64 },

    #[error("{0}")]
    Expression(String),

    #[error("{0}")]
    Custom(String),
}

/// A single validation failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub path: String,
    pub kind: ValidationErrorKind,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, kind: ValidationErrorKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.kind)
    }
}

impl std::error::Error for ValidationError {}

/// Render a list of errors on one line for logging.
pub fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Check that a rate lies in `[0, 1]`. NaN fails.
pub fn check_rate(
    path: &str,
    field: &'static str,
    value: f64,
    errors: &mut Vec<ValidationError>,
) {
    if !(0.0..=1.0).contains(&value) {
        errors.push(ValidationError::new(
            format!("{path}.{field}"),
            ValidationErrorKind::RateOutOfRange { field, value },
        ));
    }
}
