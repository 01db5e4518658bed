//! # Statistics Tests
//!
//! Derived rates and report formatting of [`DramStats`] and [`FaultReport`].

use dramfault_core::config::FaultMode;
use dramfault_core::stats::{DramStats, FaultReport};

#[test]
fn new_stats_are_zeroed_and_named() {
    let stats = DramStats::new("Channel 3");
    assert_eq!(stats.name, "Channel 3");
    assert_eq!(stats.rq_row_buffer_hit + stats.wq_row_buffer_miss + stats.wq_full, 0);
    assert_eq!(stats.avg_congested_cycles(), None);
    assert_eq!(stats.row_buffer_hit_rate(), None);
}

#[test]
fn derived_rates() {
    let stats = DramStats {
        dbus_cycle_congested: 30,
        dbus_count_congested: 4,
        rq_row_buffer_hit: 3,
        rq_row_buffer_miss: 1,
        wq_row_buffer_hit: 1,
        wq_row_buffer_miss: 3,
        ..DramStats::new("Channel 0")
    };
    assert_eq!(stats.avg_congested_cycles(), Some(7.5));
    assert_eq!(stats.row_buffer_hit_rate(), Some(0.5));
}

#[test]
fn dram_stats_display_lists_counters() {
    let stats = DramStats {
        rq_row_buffer_hit: 12,
        wq_full: 2,
        refresh_cycles: 5,
        ..DramStats::new("Channel 0")
    };
    let text = stats.to_string();
    assert!(text.contains("Channel 0 RQ ROW_BUFFER_HIT:"));
    assert!(text.contains("12"));
    assert!(text.contains("FULL:"));
    assert!(text.contains("REFRESHES ISSUED:"));
}

#[test]
fn fault_report_cycle_mode() {
    let report = FaultReport {
        mode: FaultMode::Cycle,
        bit_error_rate: 1e-12,
        page_error_probability: 3.2768e-8,
        cycle_interval: 50_000,
        total_error_accesses: 9,
    };
    let text = report.to_string();
    assert!(text.starts_with("=== ERROR PAGE STATISTICS ==="));
    assert!(text.contains("Mode: CYCLE"));
    assert!(text.contains("Error Cycle Interval: 50000 CPU cycles"));
    assert!(text.contains("Total Error Accesses: 9"));
    assert!(!text.contains("Bit Error Rate"));
}

#[test]
fn fault_report_random_mode() {
    let report = FaultReport {
        mode: FaultMode::Random,
        bit_error_rate: 1e-12,
        page_error_probability: 3.2768e-8,
        cycle_interval: 0,
        total_error_accesses: 0,
    };
    let text = report.to_string();
    assert!(text.contains("Mode: RANDOM (BER-based)"));
    assert!(text.contains("Bit Error Rate: 1.00e-12"));
    assert!(text.contains("Page Error Rate: 3.28e-8"));
}

#[test]
fn fault_report_other_modes() {
    for (mode, line) in [(FaultMode::Off, "Mode: OFF"), (FaultMode::AllOn, "Mode: ALL_ON")] {
        let report = FaultReport {
            mode,
            bit_error_rate: 0.0,
            page_error_probability: 0.0,
            cycle_interval: 0,
            total_error_accesses: 0,
        };
        assert!(report.to_string().contains(line));
    }
}

#[test]
fn printers_write_to_stdout() {
    DramStats::new("Channel 0").print();
    FaultReport {
        mode: FaultMode::Off,
        bit_error_rate: 1e-12,
        page_error_probability: 0.0,
        cycle_interval: 0,
        total_error_accesses: 0,
    }
    .print();
}
