//! Dynamic error-latency estimation.
//!
//! Correcting an error is modelled as re-walking the translation of the
//! faulty page. The estimator charges every page-table level from the
//! deepest uncached level down to the leaf:
//! 1. **Unmapped level:** one DRAM access.
//! 2. **Mapped level:** the cheapest hit latency among caches holding the
//!    entry's line, or one DRAM access if none holds it.
//!
//! The page structure cache of the issuing CPU's walker can skip the upper
//! levels. Whenever the supporting collaborators are missing or the page has
//! no reverse mapping, the caller's fixed penalty is returned instead.

use std::fmt;
use std::sync::Arc;

use crate::common::{PhysAddr, VirtAddr};
use crate::fault::trace::{FallbackReason, LevelOutcome, TraceEvent, TraceSink};

/// Read-only view of the virtual-memory system.
///
/// Implementations must not allocate mappings while answering.
pub trait VirtualMemory: Send + Sync {
    /// Returns the virtual page mapped to `ppage` for `cpu`, if any.
    fn get_vpage_for_ppage(&self, cpu: u32, ppage: u64) -> Option<u64>;

    /// Returns the physical address of the page-table entry translating
    /// `vpage` at `level`, if that entry exists.
    fn get_pte_pa_if_present(&self, cpu: u32, vpage: u64, level: usize) -> Option<PhysAddr>;

    /// Number of page-table levels.
    fn pt_levels(&self) -> usize;
}

/// Page-table walker of one CPU.
pub trait PageTableWalker: Send + Sync {
    /// Returns the level at which the page structure cache can resume a walk
    /// of `vaddr`, if it holds an entry for it.
    fn get_psc_cached_level(&self, vaddr: VirtAddr) -> Option<usize>;
}

/// Residency query of one cache.
pub trait CacheProbe: Send + Sync {
    /// Cache name, for diagnostics.
    fn name(&self) -> &str;

    /// Returns `true` if the line holding `address` is resident.
    fn is_address_in_cache(&self, address: PhysAddr) -> bool;

    /// Hit latency in CPU cycles.
    fn hit_latency(&self) -> u64;
}

/// Page-table-walk-aware error latency estimator.
pub struct LatencyEstimator {
    vmem: Option<Arc<dyn VirtualMemory>>,
    ptws: Vec<Arc<dyn PageTableWalker>>,
    caches: Vec<Arc<dyn CacheProbe>>,
    dram_latency_cycles: u64,
}

impl LatencyEstimator {
    /// Creates an estimator with no collaborators attached.
    ///
    /// # Arguments
    ///
    /// * `dram_latency_cycles` - Charge for a level served by DRAM, in CPU cycles.
    pub fn new(dram_latency_cycles: u64) -> Self {
        Self {
            vmem: None,
            ptws: Vec::new(),
            caches: Vec::new(),
            dram_latency_cycles,
        }
    }

    /// Attaches the virtual-memory system.
    pub fn set_virtual_memory(&mut self, vmem: Arc<dyn VirtualMemory>) {
        self.vmem = Some(vmem);
    }

    /// Attaches the page-table walker of the next CPU (CPU ids follow attachment order).
    pub fn add_page_table_walker(&mut self, ptw: Arc<dyn PageTableWalker>) {
        self.ptws.push(ptw);
    }

    /// Attaches a cache whose residency is probed for page-table entries.
    pub fn add_cache(&mut self, cache: Arc<dyn CacheProbe>) {
        self.caches.push(cache);
    }

    /// Charge for a level served by DRAM, in CPU cycles.
    pub const fn dram_latency_cycles(&self) -> u64 {
        self.dram_latency_cycles
    }

    /// Estimates the error penalty of an access, in CPU cycles.
    ///
    /// # Arguments
    ///
    /// * `cpu` - Issuing CPU.
    /// * `address` - Physical address of the faulty access.
    /// * `vaddr_hint` - Virtual address known by the request (translation accesses).
    /// * `fallback_cycles` - Fixed penalty returned when the walk cannot be modelled.
    /// * `trace` - Receiver of walk events.
    pub fn estimate_cycles(
        &self,
        cpu: u32,
        address: PhysAddr,
        vaddr_hint: Option<VirtAddr>,
        fallback_cycles: u64,
        trace: &dyn TraceSink,
    ) -> u64 {
        let fallback = |reason| {
            trace.record(&TraceEvent::EstimatorFallback {
                reason,
                cycles: fallback_cycles,
            });
            fallback_cycles
        };

        let (Some(vmem), Some(ptw)) = (self.vmem.as_deref(), self.ptws.get(cpu as usize)) else {
            return fallback(FallbackReason::MissingReferences);
        };
        if self.caches.is_empty() {
            return fallback(FallbackReason::MissingReferences);
        }

        let vpage = match vaddr_hint {
            Some(vaddr) => vaddr.page_number(),
            None => match vmem.get_vpage_for_ppage(cpu, address.page_number()) {
                Some(vpage) => vpage,
                None => return fallback(FallbackReason::ReverseMapMiss),
            },
        };

        let levels = vmem.pt_levels().max(1);
        let psc_level = ptw.get_psc_cached_level(VirtAddr::from_page_number(vpage));
        let start_level = psc_level.unwrap_or(levels).clamp(1, levels);
        trace.record(&TraceEvent::WalkStart {
            vpage,
            hinted: vaddr_hint.is_some(),
            start_level,
            psc_hit: psc_level.is_some(),
        });

        let mut total = 0;
        for level in (1..=start_level).rev() {
            let (cycles, outcome) = match vmem.get_pte_pa_if_present(cpu, vpage, level) {
                None => (self.dram_latency_cycles, LevelOutcome::Unmapped),
                Some(pte) => self.cheapest_hit(pte),
            };
            total += cycles;
            trace.record(&TraceEvent::WalkLevel {
                level,
                outcome,
                total_cycles: total,
            });
        }
        total
    }

    /// Returns the minimum hit latency among caches holding `pte`, or the DRAM
    /// charge if none does. Attachment order does not matter.
    fn cheapest_hit(&self, pte: PhysAddr) -> (u64, LevelOutcome) {
        self.caches
            .iter()
            .enumerate()
            .filter(|(_, cache)| cache.is_address_in_cache(pte))
            .map(|(index, cache)| (cache.hit_latency(), index))
            .filter(|&(latency, _)| latency < self.dram_latency_cycles)
            .min()
            .map_or((self.dram_latency_cycles, LevelOutcome::CacheMiss), |(latency, cache)| {
                (latency, LevelOutcome::CacheHit { cache })
            })
    }
}

impl fmt::Debug for LatencyEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LatencyEstimator")
            .field("vmem", &self.vmem.is_some())
            .field("ptws", &self.ptws.len())
            .field("caches", &self.caches.iter().map(|cache| cache.name()).collect::<Vec<_>>())
            .field("dram_latency_cycles", &self.dram_latency_cycles)
            .finish()
    }
}
