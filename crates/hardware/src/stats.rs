//! DRAM and fault-injection statistics.
//!
//! This module tracks the observational metrics of the memory subsystem. It provides:
//! 1. **Row buffer:** Hit/miss counts for reads and writes, recorded when a bank reaches the bus.
//! 2. **Data bus:** Congestion events and the bus cycles they cost.
//! 3. **Queues and refresh:** Write-queue-full rejections and refresh sweeps.
//! 4. **Fault report:** Mode, rates and the total number of error-penalised accesses.
//!
//! None of these values feed back into scheduling decisions.

use std::fmt;

use crate::config::FaultMode;

/// Per-channel statistics for one simulation phase.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DramStats {
    /// Channel label used in reports.
    pub name: String,
    /// Data bus cycles requests spent waiting for the bus.
    pub dbus_cycle_congested: u64,
    /// Number of times a ready request found the bus busy.
    pub dbus_count_congested: u64,
    /// Refresh sweeps issued.
    pub refresh_cycles: u64,
    /// Write row-buffer hits.
    pub wq_row_buffer_hit: u64,
    /// Write row-buffer misses.
    pub wq_row_buffer_miss: u64,
    /// Read row-buffer hits.
    pub rq_row_buffer_hit: u64,
    /// Read row-buffer misses.
    pub rq_row_buffer_miss: u64,
    /// Writes rejected because the write queue was full.
    pub wq_full: u64,
}

impl DramStats {
    /// Creates zeroed statistics with the given label.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Average congested bus cycles per congestion event, if any occurred.
    pub fn avg_congested_cycles(&self) -> Option<f64> {
        (self.dbus_count_congested > 0)
            .then(|| self.dbus_cycle_congested as f64 / self.dbus_count_congested as f64)
    }

    /// Row-buffer hit rate over reads and writes, if any access reached the bus.
    pub fn row_buffer_hit_rate(&self) -> Option<f64> {
        let hits = self.rq_row_buffer_hit + self.wq_row_buffer_hit;
        let total = hits + self.rq_row_buffer_miss + self.wq_row_buffer_miss;
        (total > 0).then(|| hits as f64 / total as f64)
    }

    /// Prints the statistics to stdout.
    pub fn print(&self) {
        println!("{self}");
    }
}

impl fmt::Display for DramStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} RQ ROW_BUFFER_HIT: {:>10}", self.name, self.rq_row_buffer_hit)?;
        writeln!(f, "  ROW_BUFFER_MISS: {:>10}", self.rq_row_buffer_miss)?;
        match self.avg_congested_cycles() {
            Some(avg) => writeln!(f, "  AVG DBUS CONGESTED CYCLE: {avg:.4}")?,
            None => writeln!(f, "  AVG DBUS CONGESTED CYCLE: -")?,
        }
        writeln!(f, "{} WQ ROW_BUFFER_HIT: {:>10}", self.name, self.wq_row_buffer_hit)?;
        writeln!(f, "  ROW_BUFFER_MISS: {:>10}", self.wq_row_buffer_miss)?;
        writeln!(f, "  FULL: {:>10}", self.wq_full)?;
        write!(f, "{} REFRESHES ISSUED: {:>10}", self.name, self.refresh_cycles)
    }
}

/// End-of-phase summary of the fault model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FaultReport {
    /// Injection mode.
    pub mode: FaultMode,
    /// Configured bit error rate.
    pub bit_error_rate: f64,
    /// Derived per-access page error probability.
    pub page_error_probability: f64,
    /// Mean CPU cycles between errors.
    pub cycle_interval: u64,
    /// Accesses that drew an error.
    pub total_error_accesses: u64,
}

impl FaultReport {
    /// Prints the report to stdout.
    pub fn print(&self) {
        println!("{self}");
    }
}

impl fmt::Display for FaultReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== ERROR PAGE STATISTICS ===")?;
        match self.mode {
            FaultMode::Cycle => {
                writeln!(f, "Mode: CYCLE")?;
                writeln!(f, "Error Cycle Interval: {} CPU cycles", self.cycle_interval)?;
            }
            FaultMode::Random => {
                writeln!(f, "Mode: RANDOM (BER-based)")?;
                writeln!(f, "Bit Error Rate: {:.2e}", self.bit_error_rate)?;
                writeln!(f, "Page Error Rate: {:.2e}", self.page_error_probability)?;
            }
            mode => writeln!(f, "Mode: {}", mode.name())?,
        }
        writeln!(f, "Total Error Accesses: {}", self.total_error_accesses)?;
        write!(f, "==============================")
    }
}
