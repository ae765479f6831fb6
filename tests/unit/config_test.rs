//! Tests for configuration validation

use std::collections::HashMap;

use prometheus_des::config::{SimConfig, ENV_LOG, ENV_SEED, ENV_TRACE_CAPACITY};
use prometheus_des::core::SchedulerError;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_default_config() {
    let cfg = SimConfig::default();
    assert_eq!(cfg.seed, 0);
    assert_eq!(cfg.log_filter, "debug");
    assert!(!cfg.install_subscriber);
    assert_eq!(cfg.trace_capacity, 0);
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_empty_filter_rejected() {
    let cfg = SimConfig::default().with_log_filter("  ");
    assert!(matches!(cfg.validate(), Err(SchedulerError::InvalidConfig(_))));
}

#[test]
fn test_unparsable_filter_rejected() {
    let cfg = SimConfig::default().with_log_filter("prometheus_des=loud");
    assert!(cfg.validate().is_err());
}

#[test]
fn test_oversized_trace_rejected() {
    let cfg = SimConfig::default().with_trace_capacity(usize::MAX);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_from_json_str_fills_defaults() {
    let cfg = SimConfig::from_json_str(r#"{"seed": 42, "trace_capacity": 128}"#).unwrap();
    assert_eq!(cfg.seed, 42);
    assert_eq!(cfg.trace_capacity, 128);
    assert_eq!(cfg.log_filter, "debug");
}

#[test]
fn test_from_json_str_rejects_garbage() {
    let err = SimConfig::from_json_str("{seed: }").unwrap_err();
    assert!(err.to_string().contains("parse error"));
}

#[test]
fn test_from_lookup_overrides() {
    let cfg = SimConfig::from_lookup(lookup_from(&[
        (ENV_SEED, "7"),
        (ENV_LOG, "info"),
        (ENV_TRACE_CAPACITY, "64"),
    ]))
    .unwrap();
    assert_eq!(cfg.seed, 7);
    assert_eq!(cfg.log_filter, "info");
    assert!(cfg.install_subscriber);
    assert_eq!(cfg.trace_capacity, 64);
}

#[test]
fn test_from_lookup_bad_seed() {
    let err = SimConfig::from_lookup(lookup_from(&[(ENV_SEED, "seven")])).unwrap_err();
    assert!(err.to_string().contains(ENV_SEED));
}

#[test]
fn test_from_lookup_empty_is_default() {
    let cfg = SimConfig::from_lookup(|_| None).unwrap();
    assert_eq!(cfg, SimConfig::default());
}
