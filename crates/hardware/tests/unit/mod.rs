//! # Unit Components
//!
//! This module mirrors the library layout: configuration, statistics, the
//! fault subsystem and the DRAM side of the SoC.

/// Unit tests for configuration defaults, parsing and validation.
pub mod config;

/// Unit tests for the fault model and the dynamic latency estimator.
pub mod fault;


/// Unit tests for statistics and report formatting.
pub mod stats;
