//! Fault subsystem tests.

/// Dynamic latency estimator: fallbacks, start level and per-level charges.
pub mod latency;
