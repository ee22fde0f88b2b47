//! End-to-end decisions through the registry and a memory source.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use graygate::config::loader::ConfigError;
use graygate::config::ConfigSource;
use graygate::config::store::StoreError;
use graygate::gray::attributes::AccountFields;
use graygate::gray::hash::bucket;
use graygate::gray::schema::GrayConfig;
use graygate::{Cohort, GrayRegistry, MemorySource, RequestAttributes};

mod common;

use common::{gray_document, memory_source, registry, settings, DOCUMENT};

fn cohort(label: &str) -> Cohort {
    Cohort::parse(label).unwrap()
}

#[test]
fn test_platform_rate_scenario() {
    let source = memory_source();
    let decision = registry(&source).decision();

    let attrs = RequestAttributes::new("101").with_platform("ios");
    let expected = if bucket("101") < 500 { cohort("b") } else { Cohort::STABLE };
    for _ in 0..5 {
        assert_eq!(decision.cohort("shop", "checkout", &attrs), expected);
        assert_eq!(decision.gate("shop", "checkout", &attrs), !expected.is_stable());
    }
}

#[test]
fn test_allow_list_has_priority() {
    let source = memory_source();
    let decision = registry(&source).decision();

    let attrs = RequestAttributes::new("1").with_platform("android");
    assert_eq!(decision.cohort("shop", "checkout", &attrs), cohort("c"));
}

#[test]
fn test_expression_rules() {
    let source = memory_source();
    let decision = registry(&source).decision();

    let account = AccountFields {
        role: 2,
        ..AccountFields::default()
    };
    let matching = RequestAttributes::new("5")
        .with_version("2.0")
        .with_account(account.clone());
    let old_version = RequestAttributes::new("5")
        .with_version("1.9")
        .with_account(account);

    assert!(decision.gate("shop", "search", &matching));
    assert!(!decision.gate("shop", "search", &old_version));
    assert!(!decision.gate("shop", "search", &RequestAttributes::new("5")));
}

#[test]
fn test_unconfigured_and_disabled() {
    let source = memory_source();
    let decision = registry(&source).decision();
    let attrs = RequestAttributes::new("9");

    for _ in 0..3 {
        assert!(decision.gate("unknown_business", "any_feature", &attrs));
    }
    assert_eq!(decision.cohort("unknown_business", "any_feature", &attrs), Cohort::STABLE);
    assert!(!decision.gate("shop", "legacy", &attrs));
    assert_eq!(decision.list_enabled_features("shop"), vec!["checkout", "search"]);
    assert!(decision.list_enabled_features("unknown_business").is_empty());
}

#[test]
fn test_hot_reload_of_stable_group() {
    let source = memory_source();
    let registry = registry(&source);
    let decision = registry.decision();
    let attrs = RequestAttributes::new("42").with_platform("android");
    assert!(!decision.gate("shop", "checkout", &attrs));

    let reloads = Arc::new(AtomicUsize::new(0));
    let r = reloads.clone();
    registry
        .store()
        .register_listener(None, "reloads", move |_: &GrayConfig| {
            r.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    source
        .publish(DOCUMENT, "prod_a", gray_document("42").as_bytes())
        .unwrap();
    assert_eq!(decision.cohort("shop", "checkout", &attrs), cohort("c"));
    assert_eq!(reloads.load(Ordering::SeqCst), 1);

    // Updates to other groups leave the stable snapshot alone.
    source
        .publish(DOCUMENT, "prod_b", gray_document("7").as_bytes())
        .unwrap();
    assert_eq!(reloads.load(Ordering::SeqCst), 1);
}

#[test]
fn test_rejected_update_keeps_snapshot() {
    let source = memory_source();
    let decision = registry(&source).decision();
    let attrs = RequestAttributes::new("1");
    let before = decision.snapshot();

    let reserved = gray_document("1").replace("\"target_group\": \"c\"", "\"target_group\": \"a\"");
    source.publish(DOCUMENT, "prod_a", reserved.as_bytes()).unwrap();

    let bad_rate = gray_document("1").replace("\"rate\": 0.5", "\"rate\": 1.5");
    source.publish(DOCUMENT, "prod_a", bad_rate.as_bytes()).unwrap();

    let bad_expression = gray_document("1").replace("user.role >= 2", "user.role >=");
    source.publish(DOCUMENT, "prod_a", bad_expression.as_bytes()).unwrap();

    source.publish(DOCUMENT, "prod_a", b"[not a document").unwrap();

    assert!(Arc::ptr_eq(&before, &decision.snapshot()));
    assert_eq!(decision.cohort("shop", "checkout", &attrs), cohort("c"));
}

#[test]
fn test_transport_error_keeps_snapshot() {
    let source = memory_source();
    let decision = registry(&source).decision();
    let before = decision.snapshot();

    source.report_error(DOCUMENT, "prod_a", "connection reset by peer");
    assert!(Arc::ptr_eq(&before, &decision.snapshot()));
}

#[test]
fn test_initial_load_failures() {
    let empty = Arc::new(MemorySource::new());
    assert!(matches!(
        GrayRegistry::bootstrap(&settings(), empty),
        Err(ConfigError::NoStableGroup { .. })
    ));

    let only_b = Arc::new(MemorySource::new());
    only_b.insert(DOCUMENT, "prod_b", gray_document("1"));
    assert!(matches!(
        GrayRegistry::bootstrap(&settings(), only_b),
        Err(ConfigError::NoStableGroup { .. })
    ));

    let invalid = memory_source();
    invalid.insert(DOCUMENT, "prod_b", "{");
    assert!(matches!(
        GrayRegistry::bootstrap(&settings(), invalid),
        Err(ConfigError::Parse { .. })
    ));
}

#[test]
fn test_listener_on_missing_group_fails_loudly() {
    let source = memory_source();
    let registry = registry(&source);

    let err = registry
        .store()
        .register_listener(Cohort::parse("z"), "l", |_: &GrayConfig| {})
        .unwrap_err();
    assert_eq!(err, StoreError::UnknownGroup { key: "prod_z".into() });
}

#[test]
fn test_cohort_group_fallback() {
    let source = memory_source();
    let registry = registry(&source);
    let store = registry.store();

    let (b, found) = store.get(Cohort::parse("b"));
    assert!(found);
    assert!(b.feature("shop", "checkout").unwrap().rules[0].allow_list.contains("2"));

    let (fallback, found) = store.get(Cohort::parse("q"));
    assert!(found);
    assert!(fallback.feature("shop", "checkout").unwrap().rules[0].allow_list.contains("1"));
}
