//! Cohort labels.
//!
//! A cohort is a single lowercase letter. `a` is the stable cohort: the
//! group a caller lands in when no targeting rule matched.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Label outside `a..=z` found where a cohort was expected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized cohort label `{0}` (expected a single letter a-z)")]
pub struct UnknownCohort(pub String);

/// Experiment arm assigned to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cohort(u8);

impl Cohort {
    /// The stable cohort (`a`).
    pub const STABLE: Cohort = Cohort(b'a');

    /// Build a cohort from a letter in `a..=z`.
    pub fn new(label: char) -> Option<Self> {
        if label.is_ascii_lowercase() {
            Some(Self(label as u8))
        } else {
            None
        }
    }

    /// Parse a label consisting of exactly one letter in `a..=z`.
    pub fn parse(label: &str) -> Option<Self> {
        let mut chars = label.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::new(c),
            _ => None,
        }
    }

    pub fn label(self) -> char {
        self.0 as char
    }

    pub fn is_stable(self) -> bool {
        self == Self::STABLE
    }
}

impl Default for Cohort {
    fn default() -> Self {
        Self::STABLE
    }
}

impl fmt::Display for Cohort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for Cohort {
    type Err = UnknownCohort;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| UnknownCohort(s.to_string()))
    }
}
