//! Construction-time error types.
//!
//! Every error in this module is raised while the simulator is being built:
//! 1. **Mapping Errors:** Address-mapping geometry that cannot partition an address.
//! 2. **Configuration Errors:** Unreadable, malformed or out-of-range configuration.
//!
//! Once a controller has been constructed, the service path never fails: a full
//! queue is reported through a `bool` and a statistic, and missing estimator
//! data degrades to a fixed penalty.

use thiserror::Error;

/// Address-mapping geometry that cannot be expressed as contiguous bit fields.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MappingError {
    /// The prefetch (burst) size derived from the channel width is zero.
    #[error("prefetch size must be non-zero")]
    ZeroPrefetch,

    /// One burst does not cover a whole number of cache lines.
    #[error("channel width {channel_width} B x prefetch size {prefetch_size} is not a multiple of the {line} B line")]
    PrefetchNotLineMultiple {
        /// Channel width in bytes.
        channel_width: u64,
        /// Prefetch (burst) length.
        prefetch_size: u64,
        /// Cache line size in bytes.
        line: u64,
    },

    /// A geometry count does not round-trip through a bit width.
    #[error("{field} count {value} is not a non-zero power of two")]
    NotPowerOfTwo {
        /// Name of the offending field.
        field: &'static str,
        /// Configured count.
        value: u64,
    },

    /// The fields together need more bits than an address holds.
    #[error("address mapping needs {bits} bits, more than the 64-bit address width")]
    AddressWidthExceeded {
        /// Total number of mapped bits.
        bits: u32,
    },
}

/// Errors raised while loading or validating a [`Config`](crate::config::Config).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration text is not valid JSON for [`Config`](crate::config::Config).
    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// The DRAM geometry cannot be mapped onto an address.
    #[error("invalid address mapping: {0}")]
    Mapping(#[from] MappingError),

    /// A field holds a value outside its valid range.
    #[error("invalid value for `{field}`: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// Human-readable reason.
        reason: &'static str,
    },
}
