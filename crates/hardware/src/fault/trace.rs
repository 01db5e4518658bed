//! Structured trace events for the fault path.
//!
//! The channel scheduler and the latency estimator describe each fault
//! decision as a [`TraceEvent`] and hand it to an injected [`TraceSink`].
//! The default sink drops everything; [`TracingTrace`] forwards events to
//! `tracing` at debug level, and tests install their own recorders.

use crate::common::{AccessType, PhysAddr};
use crate::config::FaultMode;

/// Where an error penalty came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LatencySource {
    /// Configured fixed penalty.
    Fixed,
    /// Page-table-walk estimate.
    Dynamic,
}

/// Why the latency estimator returned the fixed penalty.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FallbackReason {
    /// Virtual memory, the CPU's page-table walker or the caches are not attached.
    MissingReferences,
    /// The physical page has no reverse mapping to a virtual page.
    ReverseMapMiss,
}

/// How one page-table level was charged by the estimator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LevelOutcome {
    /// No entry exists at this level; charged as a DRAM access.
    Unmapped,
    /// The entry's line is cached; `cache` indexes the cheapest holder.
    CacheHit {
        /// Index of the cache in attachment order.
        cache: usize,
    },
    /// No cache holds the entry's line; charged as a DRAM access.
    CacheMiss,
}

/// One observable step of the fault path.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TraceEvent {
    /// An access drew an error and was charged `cycles` CPU cycles.
    ErrorLatency {
        /// Mode that produced the error.
        mode: FaultMode,
        /// Fixed or estimated penalty.
        source: LatencySource,
        /// Kind of the penalised access.
        access: AccessType,
        /// Physical address of the access.
        address: PhysAddr,
        /// Issuing CPU.
        cpu: u32,
        /// Penalty in CPU cycles.
        cycles: u64,
    },
    /// The estimator fell back to the fixed penalty.
    EstimatorFallback {
        /// Reason for the fallback.
        reason: FallbackReason,
        /// Fixed penalty in CPU cycles.
        cycles: u64,
    },
    /// The estimator started a walk.
    WalkStart {
        /// Virtual page being re-walked.
        vpage: u64,
        /// Whether the virtual page came from the request rather than a reverse lookup.
        hinted: bool,
        /// First level charged.
        start_level: usize,
        /// Whether the page structure cache supplied the start level.
        psc_hit: bool,
    },
    /// The estimator charged one level.
    WalkLevel {
        /// Page-table level.
        level: usize,
        /// How the level was served.
        outcome: LevelOutcome,
        /// Running total in CPU cycles.
        total_cycles: u64,
    },
    /// A CYCLE-mode error was consumed by an access.
    ErrorOccurred {
        /// Physical address of the access.
        address: PhysAddr,
        /// Cache-line number of the access.
        aligned_line: u64,
        /// Error accesses so far.
        total_errors: u64,
        /// Whether the line was already pinned and therefore not charged.
        already_registered: bool,
        /// Lines currently pinned.
        pinned_lines: usize,
    },
}

/// Receiver of fault-path trace events.
pub trait TraceSink: Send + Sync {
    /// Records one event.
    fn record(&self, event: &TraceEvent);
}

/// Sink that discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullTrace;

impl TraceSink for NullTrace {
    #[inline(always)]
    fn record(&self, _event: &TraceEvent) {}
}

/// Sink that logs every event through `tracing` at debug level.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingTrace;

impl TraceSink for TracingTrace {
    fn record(&self, event: &TraceEvent) {
        tracing::debug!(target: "dramfault::fault", ?event, "fault trace");
    }
}
