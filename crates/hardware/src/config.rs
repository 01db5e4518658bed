//! Configuration system for the DRAM timing and fault-injection model.
//!
//! This module defines all configuration structures and enums used to parameterize
//! the simulator. It provides:
//! 1. **Defaults:** Baseline DRAM geometry, timing and fault-model constants.
//! 2. **Structures:** Hierarchical config for the DRAM subsystem and the fault model.
//! 3. **Enums:** Error-injection modes.
//!
//! Configuration is supplied as JSON (`Config::from_json`, `Config::from_json_file`)
//! or built from `Config::default()`. It is read once before the simulation starts.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::common::error::ConfigError;

/// Default configuration constants for the simulator.
///
/// These values define the baseline hardware configuration when not
/// explicitly overridden in JSON configuration.
mod defaults {
    /// Data bus clock period in picoseconds (1600 MT/s).
    pub const DATA_BUS_PERIOD_PS: u64 = 625;

    /// Memory controller clock period in picoseconds (800 MHz).
    pub const CONTROLLER_PERIOD_PS: u64 = 1250;

    /// Precharge latency in controller cycles.
    pub const T_RP: u64 = 22;

    /// Row-to-column (activate) latency in controller cycles.
    pub const T_RCD: u64 = 22;

    /// CAS (Column Access Strobe) latency in controller cycles.
    pub const T_CAS: u64 = 22;

    /// Row active time in controller cycles; also the data bus turn-around time.
    pub const T_RAS: u64 = 52;

    /// Refresh window in microseconds (32 ms).
    pub const REFRESH_PERIOD_US: u64 = 32_000;

    /// Refresh commands issued per refresh window.
    pub const REFRESHES_PER_PERIOD: u64 = 8192;

    /// Read queue slots per channel.
    pub const RQ_SIZE: usize = 64;

    /// Write queue slots per channel.
    pub const WQ_SIZE: usize = 64;

    /// Number of independent channels.
    pub const CHANNELS: u64 = 1;

    /// Channel data width in bytes (64-bit channel).
    pub const CHANNEL_WIDTH: u64 = 8;

    /// Ranks per channel.
    pub const RANKS: u64 = 1;

    /// Bank groups per rank.
    pub const BANKGROUPS: u64 = 8;

    /// Banks per bank group.
    pub const BANKS: u64 = 4;

    /// Rows per bank.
    pub const ROWS: u64 = 65536;

    /// Columns per row.
    pub const COLUMNS: u64 = 1024;

    /// Bit error rate used when none (or a non-positive one) is configured.
    pub const BIT_ERROR_RATE: f64 = 1e-12;

    /// Page size in bytes used to derive the page error probability.
    pub const PAGE_SIZE: u64 = 4096;

    /// CPU clock period in picoseconds (4 GHz).
    pub const CPU_CLOCK_PERIOD_PS: u64 = 250;

    /// Fixed error-correction penalty for data accesses, in CPU cycles.
    pub const ERROR_LATENCY_CYCLES: u64 = 1000;

    /// Fixed error-correction penalty for page-table accesses, in CPU cycles.
    pub const PTE_ERROR_LATENCY_CYCLES: u64 = 1000;

    /// Cost the latency estimator charges for a walk level served by DRAM, in CPU cycles.
    pub const DRAM_LATENCY_CYCLES: u64 = 200;

    /// Mean CPU cycles between errors in CYCLE mode.
    pub const CYCLE_INTERVAL: u64 = 1_000_000;

    /// Errors queued per CYCLE-mode trigger.
    pub const ERRORS_PER_INTERVAL: u64 = 1;

    /// Seed of the fault-model random generator.
    pub const SEED: u64 = 54321;
}

/// Error-injection mode of the fault model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultMode {
    /// No error injection.
    #[default]
    #[serde(alias = "Off")]
    Off,
    /// Every page of the DRAM range is flagged at initialization.
    ///
    /// Flagged pages are tracked but do not add latency on their own.
    #[serde(alias = "AllOn")]
    AllOn,
    /// Each DRAM access independently draws an error with the page error probability.
    #[serde(alias = "Random")]
    Random,
    /// Errors arrive as a Poisson process in CPU-cycle time and are consumed by accesses.
    #[serde(alias = "Cycle")]
    Cycle,
}

impl FaultMode {
    /// Returns the upper-case mode name used in reports.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::AllOn => "ALL_ON",
            Self::Random => "RANDOM",
            Self::Cycle => "CYCLE",
        }
    }
}

/// Root configuration structure containing all simulator settings.
///
/// # Examples
///
/// Creating a default configuration:
///
/// ```
/// use dramfault_core::config::{Config, FaultMode};
///
/// let config = Config::default();
/// assert_eq!(config.dram.channels, 1);
/// assert_eq!(config.fault.mode, FaultMode::Off);
/// ```
///
/// Deserializing from JSON:
///
/// ```
/// use dramfault_core::config::{Config, FaultMode};
///
/// let json = r#"{
///     "dram": {
///         "channels": 2,
///         "rq_size": 32,
///         "wq_size": 32
///     },
///     "fault": {
///         "mode": "CYCLE",
///         "cycle_interval": 50000,
///         "cache_pinning": true
///     }
/// }"#;
///
/// let config = Config::from_json(json).unwrap();
/// assert_eq!(config.dram.channels, 2);
/// assert_eq!(config.dram.banks, 4);
/// assert_eq!(config.fault.mode, FaultMode::Cycle);
/// assert!(config.fault.cache_pinning);
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// DRAM geometry, timing and queue sizing
    #[serde(default)]
    pub dram: DramConfig,
    /// Error-injection settings
    #[serde(default)]
    pub fault: FaultConfig,
}

impl Config {
    /// Parses and validates a configuration from JSON text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] for malformed text and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`Config::from_json`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Checks value ranges that the type system cannot express.
    ///
    /// Geometry (power-of-two counts, address width) is checked separately
    /// when the address mapping is built.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dram.validate()?;
        self.fault.validate()
    }
}

/// DRAM subsystem configuration.
///
/// Timing parameters are expressed in memory-controller cycles; clock periods
/// in picoseconds.
#[derive(Debug, Clone, Deserialize)]
pub struct DramConfig {
    /// Data bus clock period in picoseconds
    #[serde(default = "DramConfig::default_data_bus_period_ps")]
    pub data_bus_period_ps: u64,

    /// Memory controller clock period in picoseconds
    #[serde(default = "DramConfig::default_controller_period_ps")]
    pub controller_period_ps: u64,

    /// Precharge latency (tRP) in controller cycles
    #[serde(default = "DramConfig::default_t_rp")]
    pub t_rp: u64,

    /// Activate-to-read latency (tRCD) in controller cycles
    #[serde(default = "DramConfig::default_t_rcd")]
    pub t_rcd: u64,

    /// CAS latency (tCAS) in controller cycles
    #[serde(default = "DramConfig::default_t_cas")]
    pub t_cas: u64,

    /// Row active time (tRAS) in controller cycles
    #[serde(default = "DramConfig::default_t_ras")]
    pub t_ras: u64,

    /// Refresh window in microseconds
    #[serde(default = "DramConfig::default_refresh_period_us")]
    pub refresh_period_us: u64,

    /// Refresh commands per refresh window
    #[serde(default = "DramConfig::default_refreshes_per_period")]
    pub refreshes_per_period: u64,

    /// Read queue capacity per channel
    #[serde(default = "DramConfig::default_rq_size")]
    pub rq_size: usize,

    /// Write queue capacity per channel
    #[serde(default = "DramConfig::default_wq_size")]
    pub wq_size: usize,

    /// Number of channels
    #[serde(default = "DramConfig::default_channels")]
    pub channels: u64,

    /// Channel width in bytes
    #[serde(default = "DramConfig::default_channel_width")]
    pub channel_width: u64,

    /// Ranks per channel
    #[serde(default = "DramConfig::default_ranks")]
    pub ranks: u64,

    /// Bank groups per rank
    #[serde(default = "DramConfig::default_bankgroups")]
    pub bankgroups: u64,

    /// Banks per bank group
    #[serde(default = "DramConfig::default_banks")]
    pub banks: u64,

    /// Rows per bank
    #[serde(default = "DramConfig::default_rows")]
    pub rows: u64,

    /// Columns per row
    #[serde(default = "DramConfig::default_columns")]
    pub columns: u64,
}

impl DramConfig {
    fn default_data_bus_period_ps() -> u64 {
        defaults::DATA_BUS_PERIOD_PS
    }

    fn default_controller_period_ps() -> u64 {
        defaults::CONTROLLER_PERIOD_PS
    }

    fn default_t_rp() -> u64 {
        defaults::T_RP
    }

    fn default_t_rcd() -> u64 {
        defaults::T_RCD
    }

    fn default_t_cas() -> u64 {
        defaults::T_CAS
    }

    fn default_t_ras() -> u64 {
        defaults::T_RAS
    }

    fn default_refresh_period_us() -> u64 {
        defaults::REFRESH_PERIOD_US
    }

    fn default_refreshes_per_period() -> u64 {
        defaults::REFRESHES_PER_PERIOD
    }

    fn default_rq_size() -> usize {
        defaults::RQ_SIZE
    }

    fn default_wq_size() -> usize {
        defaults::WQ_SIZE
    }

    fn default_channels() -> u64 {
        defaults::CHANNELS
    }

    fn default_channel_width() -> u64 {
        defaults::CHANNEL_WIDTH
    }

    fn default_ranks() -> u64 {
        defaults::RANKS
    }

    fn default_bankgroups() -> u64 {
        defaults::BANKGROUPS
    }

    fn default_banks() -> u64 {
        defaults::BANKS
    }

    fn default_rows() -> u64 {
        defaults::ROWS
    }

    fn default_columns() -> u64 {
        defaults::COLUMNS
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason| Err(ConfigError::Invalid { field, reason });
        if self.data_bus_period_ps == 0 {
            return invalid("dram.data_bus_period_ps", "clock period must be non-zero");
        }
        if self.controller_period_ps == 0 {
            return invalid("dram.controller_period_ps", "clock period must be non-zero");
        }
        if self.refreshes_per_period == 0 {
            return invalid("dram.refreshes_per_period", "must be non-zero");
        }
        if self.rq_size == 0 {
            return invalid("dram.rq_size", "queue capacity must be non-zero");
        }
        if self.wq_size == 0 {
            return invalid("dram.wq_size", "queue capacity must be non-zero");
        }
        if self.channel_width == 0 {
            return invalid("dram.channel_width", "must be non-zero");
        }
        Ok(())
    }
}

impl Default for DramConfig {
    fn default() -> Self {
        Self {
            data_bus_period_ps: defaults::DATA_BUS_PERIOD_PS,
            controller_period_ps: defaults::CONTROLLER_PERIOD_PS,
            t_rp: defaults::T_RP,
            t_rcd: defaults::T_RCD,
            t_cas: defaults::T_CAS,
            t_ras: defaults::T_RAS,
            refresh_period_us: defaults::REFRESH_PERIOD_US,
            refreshes_per_period: defaults::REFRESHES_PER_PERIOD,
            rq_size: defaults::RQ_SIZE,
            wq_size: defaults::WQ_SIZE,
            channels: defaults::CHANNELS,
            channel_width: defaults::CHANNEL_WIDTH,
            ranks: defaults::RANKS,
            bankgroups: defaults::BANKGROUPS,
            banks: defaults::BANKS,
            rows: defaults::ROWS,
            columns: defaults::COLUMNS,
        }
    }
}

/// Error-injection configuration.
///
/// Latency penalties are expressed in CPU cycles and converted with
/// `cpu_clock_period_ps`.
#[derive(Debug, Clone, Deserialize)]
pub struct FaultConfig {
    /// Injection mode
    #[serde(default)]
    pub mode: FaultMode,

    /// Raw bit error rate (RANDOM mode); non-positive values fall back to 1e-12
    #[serde(default = "FaultConfig::default_bit_error_rate")]
    pub bit_error_rate: f64,

    /// Page size in bytes used to derive the page error probability
    #[serde(default = "FaultConfig::default_page_size")]
    pub page_size: u64,

    /// CPU clock period in picoseconds
    #[serde(default = "FaultConfig::default_cpu_clock_period_ps")]
    pub cpu_clock_period_ps: u64,

    /// Fixed penalty for data accesses, in CPU cycles
    #[serde(default = "FaultConfig::default_error_latency_cycles")]
    pub error_latency_cycles: u64,

    /// Fixed penalty for page-table accesses, in CPU cycles
    #[serde(default = "FaultConfig::default_pte_error_latency_cycles")]
    pub pte_error_latency_cycles: u64,

    /// Estimate the penalty from the page-table walk instead of using a fixed one
    #[serde(default)]
    pub dynamic_latency: bool,

    /// Estimator charge for a walk level served by DRAM, in CPU cycles
    #[serde(default = "FaultConfig::default_dram_latency_cycles")]
    pub dram_latency_cycles: u64,

    /// Mean CPU cycles between errors (CYCLE mode)
    #[serde(default = "FaultConfig::default_cycle_interval")]
    pub cycle_interval: u64,

    /// Errors queued per trigger (CYCLE mode)
    #[serde(default = "FaultConfig::default_errors_per_interval")]
    pub errors_per_interval: u64,

    /// Charge each faulty cache line only once (CYCLE mode)
    #[serde(default)]
    pub cache_pinning: bool,

    /// Emit structured trace events through `tracing`
    #[serde(default)]
    pub debug_trace: bool,

    /// Seed of the fault-model random generator
    #[serde(default = "FaultConfig::default_seed")]
    pub seed: u64,
}

impl FaultConfig {
    fn default_bit_error_rate() -> f64 {
        defaults::BIT_ERROR_RATE
    }

    fn default_page_size() -> u64 {
        defaults::PAGE_SIZE
    }

    fn default_cpu_clock_period_ps() -> u64 {
        defaults::CPU_CLOCK_PERIOD_PS
    }

    fn default_error_latency_cycles() -> u64 {
        defaults::ERROR_LATENCY_CYCLES
    }

    fn default_pte_error_latency_cycles() -> u64 {
        defaults::PTE_ERROR_LATENCY_CYCLES
    }

    fn default_dram_latency_cycles() -> u64 {
        defaults::DRAM_LATENCY_CYCLES
    }

    fn default_cycle_interval() -> u64 {
        defaults::CYCLE_INTERVAL
    }

    fn default_errors_per_interval() -> u64 {
        defaults::ERRORS_PER_INTERVAL
    }

    fn default_seed() -> u64 {
        defaults::SEED
    }

    /// Bit error rate actually used: non-positive values select the DRAM default.
    pub fn effective_bit_error_rate(&self) -> f64 {
        if self.bit_error_rate > 0.0 {
            self.bit_error_rate
        } else {
            defaults::BIT_ERROR_RATE
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason| Err(ConfigError::Invalid { field, reason });
        if self.cpu_clock_period_ps == 0 {
            return invalid("fault.cpu_clock_period_ps", "clock period must be non-zero");
        }
        if !self.page_size.is_power_of_two() {
            return invalid("fault.page_size", "must be a non-zero power of two");
        }
        if self.bit_error_rate.is_nan() || self.bit_error_rate >= 1.0 {
            return invalid("fault.bit_error_rate", "must be a number below 1");
        }
        if self.mode == FaultMode::Cycle && self.cycle_interval == 0 {
            return invalid("fault.cycle_interval", "must be non-zero in CYCLE mode");
        }
        if self.errors_per_interval == 0 {
            return invalid("fault.errors_per_interval", "must be non-zero");
        }
        Ok(())
    }
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            mode: FaultMode::Off,
            bit_error_rate: defaults::BIT_ERROR_RATE,
            page_size: defaults::PAGE_SIZE,
            cpu_clock_period_ps: defaults::CPU_CLOCK_PERIOD_PS,
            error_latency_cycles: defaults::ERROR_LATENCY_CYCLES,
            pte_error_latency_cycles: defaults::PTE_ERROR_LATENCY_CYCLES,
            dynamic_latency: false,
            dram_latency_cycles: defaults::DRAM_LATENCY_CYCLES,
            cycle_interval: defaults::CYCLE_INTERVAL,
            errors_per_interval: defaults::ERRORS_PER_INTERVAL,
            cache_pinning: false,
            debug_trace: false,
            seed: defaults::SEED,
        }
    }
}
