//! Fault injection.
//!
//! This module models unreliable DRAM as extra service latency:
//! 1. **Model:** The [`FaultModel`] decides per access whether an error occurs.
//! 2. **Latency:** The [`LatencyEstimator`] prices an error as a partial
//!    page-table re-walk, using the collaborator traits it defines.
//! 3. **Trace:** Structured events describing each decision.

/// Dynamic latency estimator and the collaborator traits it queries.
pub mod latency;

/// Error modes, flagged sets and penalty selection.
pub mod model;

/// Trace events and sinks.
pub mod trace;

pub use latency::{CacheProbe, LatencyEstimator, PageTableWalker, VirtualMemory};
pub use model::{FaultAccess, FaultModel};
pub use trace::{NullTrace, TraceEvent, TraceSink, TracingTrace};
