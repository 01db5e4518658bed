//! # Configuration Tests
//!
//! Tests for configuration defaults, JSON deserialization, file loading and
//! validation.

use std::io::Write;

use dramfault_core::common::ConfigError;
use dramfault_core::config::*;
use pretty_assertions::assert_eq;
use rstest::rstest;
use tempfile::NamedTempFile;

// ══════════════════════════════════════════════════════════
// 1. Defaults
// ══════════════════════════════════════════════════════════

#[test]
fn test_dram_config_defaults() {
    let dram = DramConfig::default();
    assert_eq!(dram.data_bus_period_ps, 625);
    assert_eq!(dram.controller_period_ps, 1250);
    assert_eq!((dram.t_rp, dram.t_rcd, dram.t_cas, dram.t_ras), (22, 22, 22, 52));
    assert_eq!(dram.refresh_period_us, 32000);
    assert_eq!(dram.refreshes_per_period, 8192);
    assert_eq!((dram.rq_size, dram.wq_size), (64, 64));
    assert_eq!(dram.channels, 1);
    assert_eq!(dram.channel_width, 8);
    assert_eq!((dram.ranks, dram.bankgroups, dram.banks), (1, 8, 4));
    assert_eq!((dram.rows, dram.columns), (65536, 1024));
}

#[test]
fn test_fault_config_defaults() {
    let fault = FaultConfig::default();
    assert_eq!(fault.mode, FaultMode::Off);
    assert!((fault.bit_error_rate - 1e-12).abs() < f64::EPSILON);
    assert_eq!(fault.page_size, 4096);
    assert_eq!(fault.cpu_clock_period_ps, 250);
    assert_eq!(fault.error_latency_cycles, 1000);
    assert_eq!(fault.pte_error_latency_cycles, 1000);
    assert!(!fault.dynamic_latency);
    assert_eq!(fault.dram_latency_cycles, 200);
    assert_eq!(fault.cycle_interval, 1_000_000);
    assert_eq!(fault.errors_per_interval, 1);
    assert!(!fault.cache_pinning);
    assert!(!fault.debug_trace);
    assert_eq!(fault.seed, 54321);
}

#[test]
fn test_default_config_validates() {
    assert!(Config::default().validate().is_ok());
}

#[rstest]
#[case(0.0, 1e-12)]
#[case(-1.0, 1e-12)]
#[case(1e-9, 1e-9)]
fn test_effective_bit_error_rate(#[case] configured: f64, #[case] expected: f64) {
    let fault = FaultConfig {
        bit_error_rate: configured,
        ..FaultConfig::default()
    };
    assert!((fault.effective_bit_error_rate() - expected).abs() < f64::EPSILON);
}

// ══════════════════════════════════════════════════════════
// 2. Deserialization
// ══════════════════════════════════════════════════════════

#[test]
fn test_empty_json_is_default() {
    let config = Config::from_json("{}").unwrap();
    assert_eq!(config.dram.rows, DramConfig::default().rows);
    assert_eq!(config.fault.mode, FaultMode::Off);
}

#[test]
fn test_partial_override_keeps_other_defaults() {
    let json = r#"{
        "dram": { "t_cas": 16, "wq_size": 32 },
        "fault": { "mode": "RANDOM", "bit_error_rate": 1e-6, "dynamic_latency": true }
    }"#;
    let config = Config::from_json(json).unwrap();
    assert_eq!(config.dram.t_cas, 16);
    assert_eq!(config.dram.wq_size, 32);
    assert_eq!(config.dram.t_rp, 22);
    assert_eq!(config.fault.mode, FaultMode::Random);
    assert!((config.fault.bit_error_rate - 1e-6).abs() < f64::EPSILON);
    assert!(config.fault.dynamic_latency);
    assert_eq!(config.fault.error_latency_cycles, 1000);
}

#[rstest]
#[case("OFF", FaultMode::Off)]
#[case("ALL_ON", FaultMode::AllOn)]
#[case("RANDOM", FaultMode::Random)]
#[case("CYCLE", FaultMode::Cycle)]
#[case("AllOn", FaultMode::AllOn)]
#[case("Cycle", FaultMode::Cycle)]
fn test_fault_mode_names(#[case] name: &str, #[case] mode: FaultMode) {
    let json = format!(r#"{{ "fault": {{ "mode": "{name}" }} }}"#);
    assert_eq!(Config::from_json(&json).unwrap().fault.mode, mode);
}

#[test]
fn test_fault_mode_report_names() {
    assert_eq!(FaultMode::Off.name(), "OFF");
    assert_eq!(FaultMode::AllOn.name(), "ALL_ON");
    assert_eq!(FaultMode::Random.name(), "RANDOM");
    assert_eq!(FaultMode::Cycle.name(), "CYCLE");
}

#[test]
fn test_unknown_mode_is_json_error() {
    let result = Config::from_json(r#"{ "fault": { "mode": "SOMETIMES" } }"#);
    assert!(matches!(result, Err(ConfigError::Json(_))));
}

#[test]
fn test_malformed_json_is_json_error() {
    assert!(matches!(Config::from_json("{ dram: "), Err(ConfigError::Json(_))));
}

// ══════════════════════════════════════════════════════════
// 3. File loading
// ══════════════════════════════════════════════════════════

#[test]
fn test_from_json_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, r#"{{ "dram": {{ "channels": 4 }}, "fault": {{ "seed": 7 }} }}"#).unwrap();
    file.flush().unwrap();

    let config = Config::from_json_file(file.path()).unwrap();
    assert_eq!(config.dram.channels, 4);
    assert_eq!(config.fault.seed, 7);
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = Config::from_json_file(dir.path().join("absent.json"));
    assert!(matches!(result, Err(ConfigError::Io(_))));
}

// ══════════════════════════════════════════════════════════
// 4. Validation
// ══════════════════════════════════════════════════════════

#[rstest]
#[case(r#"{ "dram": { "rq_size": 0 } }"#, "dram.rq_size")]
#[case(r#"{ "dram": { "wq_size": 0 } }"#, "dram.wq_size")]
#[case(r#"{ "dram": { "controller_period_ps": 0 } }"#, "dram.controller_period_ps")]
#[case(r#"{ "dram": { "data_bus_period_ps": 0 } }"#, "dram.data_bus_period_ps")]
#[case(r#"{ "dram": { "refreshes_per_period": 0 } }"#, "dram.refreshes_per_period")]
#[case(r#"{ "dram": { "channel_width": 0 } }"#, "dram.channel_width")]
#[case(r#"{ "fault": { "cpu_clock_period_ps": 0 } }"#, "fault.cpu_clock_period_ps")]
#[case(r#"{ "fault": { "page_size": 3000 } }"#, "fault.page_size")]
#[case(r#"{ "fault": { "bit_error_rate": 1.0 } }"#, "fault.bit_error_rate")]
#[case(r#"{ "fault": { "mode": "CYCLE", "cycle_interval": 0 } }"#, "fault.cycle_interval")]
#[case(r#"{ "fault": { "errors_per_interval": 0 } }"#, "fault.errors_per_interval")]
fn test_validation_rejects(#[case] json: &str, #[case] expected_field: &str) {
    match Config::from_json(json) {
        Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected_field),
        other => panic!("expected invalid {expected_field}, got {other:?}"),
    }
}

#[test]
fn test_nan_bit_error_rate_rejected() {
    let mut config = Config::default();
    config.fault.bit_error_rate = f64::NAN;
    assert!(matches!(
        config.validate(),
        Err(ConfigError::Invalid { field: "fault.bit_error_rate", .. })
    ));
}

#[test]
fn test_zero_cycle_interval_allowed_outside_cycle_mode() {
    let config = Config::from_json(r#"{ "fault": { "mode": "RANDOM", "cycle_interval": 0 } }"#);
    assert!(config.is_ok());
}
