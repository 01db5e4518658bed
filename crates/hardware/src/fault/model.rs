//! Error / fault injection model.
//!
//! One [`FaultModel`] is built at controller construction and lent to every
//! channel in turn, so all of its state is mutated by a single owner in cycle
//! order. It provides:
//! 1. **Modes:** OFF and ALL_ON never charge latency; RANDOM draws a per-access
//!    page error; CYCLE queues errors on an exponential trigger clock measured
//!    in CPU cycles.
//! 2. **Flagged sets:** Cache-line granularity (used by cache pinning) and the
//!    older page granularity (used by ALL_ON and preloading).
//! 3. **Penalties:** Fixed per access kind, or estimated by the
//!    [`LatencyEstimator`].
//! 4. **Counters:** Total error-penalised accesses, summarised as a [`FaultReport`].

use std::collections::HashSet;

use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;

use crate::common::constants::{BITS_PER_BYTE, LOG2_BLOCK_SIZE, LOG2_PAGE_SIZE};
use crate::common::{AccessType, ConfigError, PhysAddr, VirtAddr};
use crate::config::{FaultConfig, FaultMode};
use crate::fault::latency::LatencyEstimator;
use crate::fault::trace::{LatencySource, TraceEvent, TraceSink};
use crate::stats::FaultReport;

/// The access being serviced, as seen by the fault model.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FaultAccess {
    /// Issuing CPU.
    pub cpu: u32,
    /// Physical address.
    pub address: PhysAddr,
    /// Virtual address carried by the request.
    pub v_address: VirtAddr,
    /// Access kind.
    pub access: AccessType,
}

/// Fault-injection state shared by all channels of a controller.
#[derive(Debug)]
pub struct FaultModel {
    mode: FaultMode,
    rng: Xoshiro256StarStar,

    error_pages: HashSet<u64>,
    error_lines: HashSet<u64>,
    current_ppages: HashSet<u64>,

    bit_error_rate: f64,
    page_size_bits: u64,
    page_error_probability: f64,

    cycle_interval: u64,
    errors_per_interval: u64,
    next_trigger_cycle: u64,
    pending_errors: u64,

    cpu_clock_period_ps: u64,
    error_latency_cycles: u64,
    pte_error_latency_cycles: u64,
    dynamic_latency: bool,
    cache_pinning: bool,

    total_error_accesses: u64,
}

impl FaultModel {
    /// Builds the model from its configuration.
    ///
    /// The generator is seeded from `config.seed`; in CYCLE mode the first
    /// trigger is drawn immediately, so two models built from the same
    /// configuration produce identical error sequences.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the configuration fails validation.
    pub fn new(config: &FaultConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let bit_error_rate = config.effective_bit_error_rate();
        let page_size_bits = config.page_size * BITS_PER_BYTE;
        let mut model = Self {
            mode: config.mode,
            rng: Xoshiro256StarStar::seed_from_u64(config.seed),
            error_pages: HashSet::new(),
            error_lines: HashSet::new(),
            current_ppages: HashSet::new(),
            bit_error_rate,
            page_size_bits,
            page_error_probability: page_error_probability(bit_error_rate, page_size_bits),
            cycle_interval: config.cycle_interval,
            errors_per_interval: config.errors_per_interval,
            next_trigger_cycle: 0,
            pending_errors: 0,
            cpu_clock_period_ps: config.cpu_clock_period_ps,
            error_latency_cycles: config.error_latency_cycles,
            pte_error_latency_cycles: config.pte_error_latency_cycles,
            dynamic_latency: config.dynamic_latency,
            cache_pinning: config.cache_pinning,
            total_error_accesses: 0,
        };
        if model.mode == FaultMode::Cycle {
            model.next_trigger_cycle = model.sample_gap();
        }
        Ok(model)
    }

    /// Injection mode.
    pub const fn mode(&self) -> FaultMode {
        self.mode
    }

    /// Bit error rate in use.
    pub const fn bit_error_rate(&self) -> f64 {
        self.bit_error_rate
    }

    /// Page size in bits used to derive the page error probability.
    pub const fn page_size_bits(&self) -> u64 {
        self.page_size_bits
    }

    /// Probability that one access to a page draws an error:
    /// `1 - (1 - bit_error_rate)^page_size_bits`.
    pub const fn page_error_probability(&self) -> f64 {
        self.page_error_probability
    }

    /// Mean CPU cycles between CYCLE-mode triggers.
    pub const fn cycle_interval(&self) -> u64 {
        self.cycle_interval
    }

    /// CPU clock period in picoseconds.
    pub const fn cpu_clock_period_ps(&self) -> u64 {
        self.cpu_clock_period_ps
    }

    /// Converts a picosecond timestamp to CPU cycles.
    pub const fn to_cpu_cycles(&self, time_ps: u64) -> u64 {
        time_ps / self.cpu_clock_period_ps
    }

    /// Fixed penalty for data accesses, in picoseconds.
    pub const fn error_latency(&self) -> u64 {
        self.error_latency_cycles * self.cpu_clock_period_ps
    }

    /// Fixed penalty for translation accesses, in picoseconds.
    pub const fn pte_error_latency(&self) -> u64 {
        self.pte_error_latency_cycles * self.cpu_clock_period_ps
    }

    // ═══ RANDOM ═══

    /// Draws one uniform sample and reports whether the access hits a page error.
    pub fn check_page_error(&mut self) -> bool {
        self.rng.random::<f64>() < self.page_error_probability
    }

    // ═══ CYCLE ═══

    /// Draws one inter-arrival gap, in CPU cycles, from an exponential
    /// distribution with mean `cycle_interval`. Never returns zero.
    fn sample_gap(&mut self) -> u64 {
        let u: f64 = self.rng.random();
        let gap = -(1.0 - u).ln() * self.cycle_interval as f64;
        (gap.round() as u64).max(1)
    }

    /// Advances the trigger clock to `cpu_cycle`, queueing errors for every
    /// trigger that has fallen due.
    pub fn update_cycle_errors(&mut self, cpu_cycle: u64) {
        while cpu_cycle >= self.next_trigger_cycle {
            self.pending_errors += self.errors_per_interval;
            let gap = self.sample_gap();
            self.next_trigger_cycle = self.next_trigger_cycle.saturating_add(gap);
        }
    }

    /// CPU cycle of the next trigger.
    pub const fn next_trigger_cycle(&self) -> u64 {
        self.next_trigger_cycle
    }

    /// Errors queued but not yet consumed by an access.
    pub const fn pending_errors(&self) -> u64 {
        self.pending_errors
    }

    /// Consumes one pending error, if any.
    pub const fn consume_cycle_error(&mut self) -> bool {
        if self.pending_errors > 0 {
            self.pending_errors -= 1;
            true
        } else {
            false
        }
    }

    // ═══ Line-granularity set ═══

    /// Flags the cache line holding `address`. Returns `true` if it was not flagged yet.
    pub fn add_error_address(&mut self, address: PhysAddr) -> bool {
        self.error_lines.insert(address.0 >> LOG2_BLOCK_SIZE)
    }

    /// Clears the flag of the line holding `address`. Returns `true` if it was flagged.
    pub fn remove_error_address(&mut self, address: PhysAddr) -> bool {
        self.error_lines.remove(&(address.0 >> LOG2_BLOCK_SIZE))
    }

    /// Returns `true` if the line holding `address` is flagged.
    pub fn is_error_address(&self, address: PhysAddr) -> bool {
        self.error_lines.contains(&(address.0 >> LOG2_BLOCK_SIZE))
    }

    /// Number of flagged lines.
    pub fn error_address_count(&self) -> usize {
        self.error_lines.len()
    }

    /// Clears every flagged line.
    pub fn clear_error_addresses(&mut self) {
        self.error_lines.clear();
    }

    // ═══ Page-granularity set ═══

    /// Flags physical page `page`. Returns `true` if it was not flagged yet.
    pub fn add_error_page(&mut self, page: u64) -> bool {
        self.error_pages.insert(page)
    }

    /// Clears the flag of physical page `page`. Returns `true` if it was flagged.
    pub fn remove_error_page(&mut self, page: u64) -> bool {
        self.error_pages.remove(&page)
    }

    /// Returns `true` if physical page `page` is flagged.
    pub fn is_error_page(&self, page: u64) -> bool {
        self.error_pages.contains(&page)
    }

    /// Number of flagged pages.
    pub fn error_page_count(&self) -> usize {
        self.error_pages.len()
    }

    /// Clears every flagged page.
    pub fn clear_error_pages(&mut self) {
        self.error_pages.clear();
    }

    /// Flags pages `0..count`.
    pub fn all_error_pages_on(&mut self, count: u64) {
        self.error_pages.extend(0..count);
    }

    /// Flags `count` distinct pages drawn uniformly from the byte range
    /// `[start, end)`. The count is capped at the number of pages in range.
    pub fn preload_error_pages(&mut self, count: usize, start: PhysAddr, end: PhysAddr) {
        let first = start.page_number();
        let span = end.page_number().saturating_sub(first) as usize;
        let amount = count.min(span);
        let picked = index::sample(&mut self.rng, span, amount);
        self.error_pages
            .extend(picked.into_iter().map(|offset| first + offset as u64));
    }

    /// Records a physical page as resident. Returns `true` if it was new.
    pub fn add_current_ppage(&mut self, address: PhysAddr) -> bool {
        self.current_ppages.insert(address.0 >> LOG2_PAGE_SIZE)
    }

    /// Number of resident physical pages recorded.
    pub fn current_ppage_count(&self) -> usize {
        self.current_ppages.len()
    }

    // ═══ Counters ═══

    /// Counts one access that drew an error.
    pub const fn record_error_access(&mut self) {
        self.total_error_accesses += 1;
    }

    /// Accesses that drew an error since the last reset.
    pub const fn total_error_count(&self) -> u64 {
        self.total_error_accesses
    }

    /// Clears the error-access counter. Flagged sets are kept.
    pub const fn reset_statistics(&mut self) {
        self.total_error_accesses = 0;
    }

    /// Summary for end-of-phase reporting.
    pub const fn report(&self) -> FaultReport {
        FaultReport {
            mode: self.mode,
            bit_error_rate: self.bit_error_rate,
            page_error_probability: self.page_error_probability,
            cycle_interval: self.cycle_interval,
            total_error_accesses: self.total_error_accesses,
        }
    }

    // ═══ Service ═══

    /// Decides whether `access` draws an error and returns the extra service
    /// latency in picoseconds (zero when it does not).
    ///
    /// # Arguments
    ///
    /// * `access` - The request being serviced.
    /// * `estimator` - Consulted when dynamic latency is enabled.
    /// * `trace` - Receiver of the decision events.
    pub fn penalty_for(&mut self, access: &FaultAccess, estimator: &LatencyEstimator, trace: &dyn TraceSink) -> u64 {
        match self.mode {
            FaultMode::Off | FaultMode::AllOn => 0,
            FaultMode::Random => {
                if !self.check_page_error() {
                    return 0;
                }
                let cycles = self.penalty_cycles(access, estimator, trace);
                self.record_error_access();
                cycles * self.cpu_clock_period_ps
            }
            FaultMode::Cycle => {
                if !self.consume_cycle_error() {
                    return 0;
                }
                let already_registered = self.cache_pinning && !self.add_error_address(access.address);
                let cycles = if already_registered {
                    0
                } else {
                    self.penalty_cycles(access, estimator, trace)
                };
                self.record_error_access();
                trace.record(&TraceEvent::ErrorOccurred {
                    address: access.address,
                    aligned_line: access.address.line_number(),
                    total_errors: self.total_error_accesses,
                    already_registered,
                    pinned_lines: self.error_lines.len(),
                });
                cycles * self.cpu_clock_period_ps
            }
        }
    }

    /// Penalty of one error in CPU cycles, fixed or estimated.
    fn penalty_cycles(&self, access: &FaultAccess, estimator: &LatencyEstimator, trace: &dyn TraceSink) -> u64 {
        let translation = access.access.is_translation();
        let fixed = if translation {
            self.pte_error_latency_cycles
        } else {
            self.error_latency_cycles
        };

        let (source, cycles) = if self.dynamic_latency {
            let hint = translation.then_some(access.v_address);
            let cycles = estimator.estimate_cycles(access.cpu, access.address, hint, fixed, trace);
            (LatencySource::Dynamic, cycles)
        } else {
            (LatencySource::Fixed, fixed)
        };

        trace.record(&TraceEvent::ErrorLatency {
            mode: self.mode,
            source,
            access: access.access,
            address: access.address,
            cpu: access.cpu,
            cycles,
        });
        cycles
    }
}

/// `1 - (1 - bit_error_rate)^bits`, computed through `ln_1p` so that tiny
/// rates keep their precision.
fn page_error_probability(bit_error_rate: f64, bits: u64) -> f64 {
    -(bits as f64 * (-bit_error_rate).ln_1p()).exp_m1()
}
