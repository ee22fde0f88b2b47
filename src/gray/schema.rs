//! Gray release document schema.
//!
//! One document maps business → feature → ordered traffic rules:
//!
//! ```json
//! {
//!   "shop": {
//!     "feature": {
//!       "new_checkout": {
//!         "enable": true,
//!         "rule": [
//!           { "enable": true, "rate": 0.5, "targets": { "platform": ["ios"] },
//!             "target_group": "b" }
//!         ]
//!       }
//!     }
//!   }
//! }
//! ```
//!
//! Documents are immutable once published. Each update builds a new
//! candidate, runs [`GrayConfig::prepare`] on it and swaps it in whole.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::config::validation::{check_rate, ValidationError, ValidationErrorKind};
use crate::gray::attributes::BUILTIN_DIMENSIONS;
use crate::gray::cohort::Cohort;
use crate::gray::expression::{Predicate, Sandbox};

/// Business identifier → per-business configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrayConfig {
    pub businesses: BTreeMap<String, Gray>,
}

/// Features configured for one business.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Gray {
    pub feature: BTreeMap<String, FeatureConfig>,
}

/// Rollout configuration for one feature.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Master switch. When off every caller is in the stable cohort.
    #[serde(rename = "enable", default)]
    pub enabled: bool,

    /// Rules in priority order; the first match wins.
    #[serde(rename = "rule", default)]
    pub rules: Vec<TrafficRule>,
}

/// One targeting rule.
///
/// Equality covers the document fields only; the compiled predicate is
/// derived from `expression` and is not part of the encoded form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrafficRule {
    #[serde(rename = "enable", default)]
    pub enabled: bool,

    /// Share of all traffic considered by this rule, before targeting.
    #[serde(rename = "rate", default)]
    pub primary_rate: f64,

    #[serde(
        rename = "expresion",
        alias = "expression",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub expression: Option<String>,

    /// Dimension → accepted values. Empty sets are unconstrained.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub targets: BTreeMap<String, BTreeSet<String>>,

    #[serde(rename = "whitelist", default)]
    pub allow_list: BTreeSet<String>,

    #[serde(rename = "blacklist", default)]
    pub deny_list: BTreeSet<String>,

    /// Share of targeted traffic sent to `target_group`.
    #[serde(rename = "traffic_rate", default)]
    pub secondary_rate: f64,

    #[serde(default)]
    pub target_group: String,

    #[serde(skip)]
    pub(crate) predicate: Option<Predicate>,
}

impl PartialEq for TrafficRule {
    fn eq(&self, other: &Self) -> bool {
        self.enabled == other.enabled
            && self.primary_rate == other.primary_rate
            && self.expression == other.expression
            && self.targets == other.targets
            && self.allow_list == other.allow_list
            && self.deny_list == other.deny_list
            && self.secondary_rate == other.secondary_rate
            && self.target_group == other.target_group
    }
}

impl GrayConfig {
    /// Parse a document without preparing it.
    pub fn from_slice(raw: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(raw)
    }

    pub fn business(&self, business: &str) -> Option<&Gray> {
        self.businesses.get(business)
    }

    pub fn feature(&self, business: &str, feature: &str) -> Option<&FeatureConfig> {
        self.business(business)?.feature.get(feature)
    }

    /// Validate, normalize and compile a candidate document.
    ///
    /// Either every enabled rule is valid and compiled, or the full list of
    /// problems is returned and the candidate must be discarded.
    pub fn prepare(&mut self, sandbox: &Sandbox) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        for (business, gray) in &mut self.businesses {
            for (name, feature) in &mut gray.feature {
                feature.prepare(&format!("{business}.{name}"), sandbox, &mut errors);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl FeatureConfig {
    fn prepare(&mut self, path: &str, sandbox: &Sandbox, errors: &mut Vec<ValidationError>) {
        for (i, rule) in self.rules.iter_mut().enumerate() {
            rule.prepare(&format!("{path}[{i}]"), sandbox, errors);
        }
    }
}

impl TrafficRule {
    /// Build an enabled rule assigning matches to `target_group`.
    pub fn new(target_group: Cohort) -> Self {
        Self {
            enabled: true,
            target_group: target_group.to_string(),
            ..Self::default()
        }
    }

    pub fn with_primary_rate(mut self, rate: f64) -> Self {
        self.primary_rate = rate;
        self
    }

    pub fn with_secondary_rate(mut self, rate: f64) -> Self {
        self.secondary_rate = rate;
        self
    }

    pub fn with_target<I, S>(mut self, dimension: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets
            .insert(dimension.into(), values.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_allow_list<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allow_list = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_deny_list<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.deny_list = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Attach an expression source. It still has to be compiled by `prepare`.
    pub fn with_expression(mut self, source: impl Into<String>) -> Self {
        self.expression = Some(source.into());
        self.predicate = None;
        self
    }

    /// Non-blank expression text, if any.
    pub fn expression_source(&self) -> Option<&str> {
        self.expression.as_deref().filter(|s| !s.trim().is_empty())
    }

    pub fn predicate(&self) -> Option<&Predicate> {
        self.predicate.as_ref()
    }

    /// Validate, normalize and compile this rule.
    ///
    /// Disabled rules are never evaluated and are left untouched.
    pub fn prepare(&mut self, path: &str, sandbox: &Sandbox, errors: &mut Vec<ValidationError>) {
        if !self.enabled {
            return;
        }

        match Cohort::parse(&self.target_group) {
            Some(cohort) if cohort.is_stable() => errors.push(ValidationError::new(
                format!("{path}.target_group"),
                ValidationErrorKind::ReservedTargetGroup,
            )),
            Some(_) => {}
            None => errors.push(ValidationError::new(
                format!("{path}.target_group"),
                ValidationErrorKind::InvalidTargetGroup(self.target_group.clone()),
            )),
        }

        check_rate(path, "rate", self.primary_rate, errors);
        check_rate(path, "traffic_rate", self.secondary_rate, errors);

        self.format();

        self.predicate = None;
        if let Some(source) = self.expression_source() {
            match sandbox.compile(source) {
                Ok(predicate) => self.predicate = Some(predicate),
                Err(e) => errors.push(ValidationError::new(
                    format!("{path}.expresion"),
                    ValidationErrorKind::Expression(e.to_string()),
                )),
            }
        }
    }

    /// Trim list entries; lowercase values of the built-in dimensions.
    fn format(&mut self) {
        for (dimension, values) in &mut self.targets {
            let lowercase = BUILTIN_DIMENSIONS.contains(&dimension.as_str());
            *values = values
                .iter()
                .map(|v| {
                    let v = v.trim();
                    if lowercase {
                        v.to_lowercase()
                    } else {
                        v.to_string()
                    }
                })
                .filter(|v| !v.is_empty())
                .collect();
        }
        self.allow_list = trimmed(&self.allow_list);
        self.deny_list = trimmed(&self.deny_list);
    }
}

fn trimmed(set: &BTreeSet<String>) -> BTreeSet<String> {
    set.iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
        "shop": {
            "feature": {
                "checkout": {
                    "enable": true,
                    "rule": [
                        {
                            "enable": true,
                            "rate": 0.5,
                            "expresion": "user.role > 1",
                            "targets": { "platform": [" IOS ", "android"] },
                            "whitelist": ["1", " 2"],
                            "blacklist": ["3"],
                            "traffic_rate": 0.2,
                            "target_group": "b"
                        },
                        { "enable": false, "target_group": "a", "rate": 7 }
                    ]
                }
            }
        }
    }"#;

    #[test]
    fn test_decode_and_prepare() {
        let mut config = GrayConfig::from_slice(DOC.as_bytes()).unwrap();
        config.prepare(&Sandbox::new()).unwrap();

        let feature = config.feature("shop", "checkout").unwrap();
        assert!(feature.enabled);
        assert_eq!(feature.rules.len(), 2);

        let rule = &feature.rules[0];
        assert_eq!(rule.primary_rate, 0.5);
        assert_eq!(rule.secondary_rate, 0.2);
        assert_eq!(rule.target_group, "b");
        assert!(rule.predicate().is_some());
        assert!(rule.targets["platform"].contains("ios"));
        assert!(rule.allow_list.contains("2"));

        // Disabled rules are not validated.
        assert!(!feature.rules[1].enabled);
    }

    #[test]
    fn test_prepare_collects_all_errors() {
        let raw = r#"{
            "shop": { "feature": { "f": { "enable": true, "rule": [
                { "enable": true, "rate": 1.5, "target_group": "a" },
                { "enable": true, "traffic_rate": -0.1, "target_group": "bb" },
                { "enable": true, "expresion": "user.role +", "target_group": "c" }
            ] } } }
        }"#;
        let mut config = GrayConfig::from_slice(raw.as_bytes()).unwrap();
        let errors = config.prepare(&Sandbox::new()).unwrap_err();

        let paths: Vec<_> = errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "shop.f[0].target_group",
                "shop.f[0].rate",
                "shop.f[1].target_group",
                "shop.f[1].traffic_rate",
                "shop.f[2].expresion",
            ]
        );
        assert_eq!(errors[0].kind, ValidationErrorKind::ReservedTargetGroup);
    }

    #[test]
    fn test_round_trip_preserves_rule_order() {
        let first = GrayConfig::from_slice(DOC.as_bytes()).unwrap();
        let encoded = serde_json::to_vec(&first).unwrap();
        let second = GrayConfig::from_slice(&encoded).unwrap();

        let a = &first.feature("shop", "checkout").unwrap().rules;
        let b = &second.feature("shop", "checkout").unwrap().rules;
        assert_eq!(a, b);
        assert_eq!(a[0].target_group, "b");
        assert_eq!(a[1].target_group, "a");
    }

    #[test]
    fn test_prepared_document_round_trips() {
        let sandbox = Sandbox::new();
        let mut prepared = GrayConfig::from_slice(DOC.as_bytes()).unwrap();
        prepared.prepare(&sandbox).unwrap();

        let encoded = serde_json::to_vec(&prepared).unwrap();
        let mut decoded = GrayConfig::from_slice(&encoded).unwrap();
        assert!(decoded.feature("shop", "checkout").unwrap().rules[0]
            .predicate()
            .is_none());
        assert_eq!(decoded, prepared);

        decoded.prepare(&sandbox).unwrap();
        assert_eq!(decoded, prepared);
        assert!(decoded.feature("shop", "checkout").unwrap().rules[0]
            .predicate()
            .is_some());
    }

    #[test]
    fn test_expression_alias_and_blank() {
        let raw = r#"{ "x": { "feature": { "f": { "enable": true, "rule": [
            { "enable": true, "expression": "app.version == \"1\"", "target_group": "b" },
            { "enable": true, "expresion": "  ", "target_group": "c" }
        ] } } } }"#;
        let mut config = GrayConfig::from_slice(raw.as_bytes()).unwrap();
        config.prepare(&Sandbox::new()).unwrap();

        let rules = &config.feature("x", "f").unwrap().rules;
        assert!(rules[0].predicate().is_some());
        assert!(rules[1].predicate().is_none());
        assert_eq!(rules[1].expression_source(), None);
    }
}
