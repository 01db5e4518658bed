//! Latency Estimator Tests.
//!
//! Exercises the fallback paths of [`LatencyEstimator::estimate_cycles`],
//! the choice of starting level and the per-level charges.

use std::sync::Arc;

use dramfault_core::common::{PhysAddr, VirtAddr};
use dramfault_core::fault::trace::{FallbackReason, LevelOutcome, TraceEvent};
use dramfault_core::fault::{LatencyEstimator, NullTrace};
use mockall::predicate::eq;
use pretty_assertions::assert_eq;
use rstest::rstest;

use crate::common::mocks::{FixedPtw, MockVmem, RecordingTrace, StaticCache};

const DRAM: u64 = 200;
const FIXED: u64 = 1000;
const DATA: PhysAddr = PhysAddr::new(0x0004_2000);

/// Page-table entry address of `level` for every virtual page.
const fn pte(level: usize) -> PhysAddr {
    PhysAddr::new(0x10_0000 + level as u64 * 0x1000)
}

/// Four-level virtual memory mapping the data page to vpage 0x7 with every
/// level present.
fn mapped_vmem() -> MockVmem {
    let mut vmem = MockVmem::new();
    vmem.expect_pt_levels().return_const(4_usize);
    vmem.expect_get_vpage_for_ppage().returning(|_, _| Some(0x7));
    vmem.expect_get_pte_pa_if_present()
        .returning(|_, _, level| Some(pte(level)));
    vmem
}

fn estimator(vmem: MockVmem, psc: Option<usize>, caches: Vec<StaticCache>) -> LatencyEstimator {
    let mut estimator = LatencyEstimator::new(DRAM);
    estimator.set_virtual_memory(Arc::new(vmem));
    estimator.add_page_table_walker(Arc::new(FixedPtw(psc)));
    for cache in caches {
        estimator.add_cache(Arc::new(cache));
    }
    estimator
}

fn empty_cache() -> StaticCache {
    StaticCache::new("LLC", 40, &[])
}

// ══════════════════════════════════════════════════════════
// 1. Fallbacks
// ══════════════════════════════════════════════════════════

#[test]
fn without_virtual_memory_returns_fixed() {
    let mut estimator = LatencyEstimator::new(DRAM);
    estimator.add_page_table_walker(Arc::new(FixedPtw(None)));
    estimator.add_cache(Arc::new(empty_cache()));

    let trace = RecordingTrace::default();
    assert_eq!(estimator.estimate_cycles(0, DATA, None, FIXED, &trace), FIXED);
    assert_eq!(
        trace.events(),
        vec![TraceEvent::EstimatorFallback {
            reason: FallbackReason::MissingReferences,
            cycles: FIXED,
        }]
    );
}

#[test]
fn without_caches_returns_fixed() {
    let estimator = estimator(mapped_vmem(), None, Vec::new());
    assert_eq!(estimator.estimate_cycles(0, DATA, None, FIXED, &NullTrace), FIXED);
}

#[test]
fn cpu_without_walker_returns_fixed() {
    let estimator = estimator(mapped_vmem(), None, vec![empty_cache()]);
    assert_eq!(estimator.estimate_cycles(1, DATA, None, FIXED, &NullTrace), FIXED);
}

#[test]
fn unmapped_physical_page_returns_fixed() {
    let mut vmem = MockVmem::new();
    vmem.expect_pt_levels().return_const(4_usize);
    vmem.expect_get_vpage_for_ppage()
        .with(eq(0), eq(DATA.page_number()))
        .times(1)
        .returning(|_, _| None);
    vmem.expect_get_pte_pa_if_present().times(0);
    let estimator = estimator(vmem, None, vec![empty_cache()]);

    let trace = RecordingTrace::default();
    assert_eq!(estimator.estimate_cycles(0, DATA, None, 400, &trace), 400);
    assert_eq!(
        trace.events(),
        vec![TraceEvent::EstimatorFallback {
            reason: FallbackReason::ReverseMapMiss,
            cycles: 400,
        }]
    );
}

// ══════════════════════════════════════════════════════════
// 2. Virtual page and starting level
// ══════════════════════════════════════════════════════════

#[test]
fn translation_hint_skips_reverse_lookup() {
    let mut vmem = MockVmem::new();
    vmem.expect_pt_levels().return_const(4_usize);
    vmem.expect_get_vpage_for_ppage().times(0);
    vmem.expect_get_pte_pa_if_present()
        .withf(|_, vpage, _| *vpage == 0x7fff_0)
        .times(4)
        .returning(|_, _, _| None);
    let estimator = estimator(vmem, None, vec![empty_cache()]);

    let hint = Some(VirtAddr::new(0x7fff_0123));
    assert_eq!(estimator.estimate_cycles(0, DATA, hint, FIXED, &NullTrace), 4 * DRAM);
}

#[test]
fn unmapped_levels_each_cost_a_dram_access() {
    let mut vmem = MockVmem::new();
    vmem.expect_pt_levels().return_const(4_usize);
    vmem.expect_get_vpage_for_ppage().returning(|_, _| Some(0x7));
    vmem.expect_get_pte_pa_if_present().returning(|_, _, _| None);
    let estimator = estimator(vmem, None, vec![empty_cache()]);

    let trace = RecordingTrace::default();
    assert_eq!(estimator.estimate_cycles(0, DATA, None, FIXED, &trace), 800);

    let events = trace.events();
    assert_eq!(
        events[0],
        TraceEvent::WalkStart {
            vpage: 0x7,
            hinted: false,
            start_level: 4,
            psc_hit: false,
        }
    );
    let levels: Vec<(usize, LevelOutcome)> = events[1..]
        .iter()
        .map(|event| match event {
            TraceEvent::WalkLevel { level, outcome, .. } => (*level, *outcome),
            other => panic!("unexpected event {other:?}"),
        })
        .collect();
    assert_eq!(
        levels,
        vec![
            (4, LevelOutcome::Unmapped),
            (3, LevelOutcome::Unmapped),
            (2, LevelOutcome::Unmapped),
            (1, LevelOutcome::Unmapped),
        ]
    );
}

#[test]
fn page_structure_cache_skips_upper_levels() {
    let estimator = estimator(mapped_vmem(), Some(2), vec![empty_cache()]);
    assert_eq!(estimator.estimate_cycles(0, DATA, None, FIXED, &NullTrace), 2 * DRAM);
}

#[rstest]
#[case::above_root(Some(9), 4)]
#[case::below_leaf(Some(0), 1)]
#[case::miss(None, 4)]
fn start_level_is_clamped(#[case] psc: Option<usize>, #[case] levels: u64) {
    let estimator = estimator(mapped_vmem(), psc, vec![empty_cache()]);
    assert_eq!(estimator.estimate_cycles(0, DATA, None, FIXED, &NullTrace), levels * DRAM);
}

// ══════════════════════════════════════════════════════════
// 3. Cache charges
// ══════════════════════════════════════════════════════════

#[test]
fn cheapest_holder_wins_regardless_of_order() {
    let entries: Vec<u64> = (1..=4).map(|level| pte(level).val()).collect();
    let forward = estimator(
        mapped_vmem(),
        None,
        vec![StaticCache::new("L1D", 4, &entries), StaticCache::new("L2C", 12, &entries)],
    );
    let backward = estimator(
        mapped_vmem(),
        None,
        vec![StaticCache::new("L2C", 12, &entries), StaticCache::new("L1D", 4, &entries)],
    );
    assert_eq!(forward.estimate_cycles(0, DATA, None, FIXED, &NullTrace), 16);
    assert_eq!(backward.estimate_cycles(0, DATA, None, FIXED, &NullTrace), 16);
}

#[test]
fn mixed_walk_sums_each_level() {
    // Level 4 unmapped, level 3 in L2, level 2 in L1, level 1 uncached.
    let mut vmem = MockVmem::new();
    vmem.expect_pt_levels().return_const(4_usize);
    vmem.expect_get_vpage_for_ppage().returning(|_, _| Some(0x7));
    vmem.expect_get_pte_pa_if_present()
        .returning(|_, _, level| (level != 4).then_some(pte(level)));
    let estimator = estimator(
        vmem,
        None,
        vec![
            StaticCache::new("L1D", 4, &[pte(2).val()]),
            StaticCache::new("L2C", 12, &[pte(3).val()]),
        ],
    );

    let trace = RecordingTrace::default();
    assert_eq!(estimator.estimate_cycles(0, DATA, None, FIXED, &trace), 200 + 12 + 4 + 200);

    let outcomes: Vec<LevelOutcome> = trace
        .events()
        .iter()
        .filter_map(|event| match event {
            TraceEvent::WalkLevel { outcome, .. } => Some(*outcome),
            _ => None,
        })
        .collect();
    assert_eq!(
        outcomes,
        vec![
            LevelOutcome::Unmapped,
            LevelOutcome::CacheHit { cache: 1 },
            LevelOutcome::CacheHit { cache: 0 },
            LevelOutcome::CacheMiss,
        ]
    );
}

#[test]
fn cache_slower_than_dram_counts_as_miss() {
    let entries: Vec<u64> = (1..=4).map(|level| pte(level).val()).collect();
    let estimator = estimator(mapped_vmem(), Some(1), vec![StaticCache::new("far", 500, &entries)]);
    assert_eq!(estimator.estimate_cycles(0, DATA, None, FIXED, &NullTrace), DRAM);
}

#[test]
fn walker_selected_by_cpu() {
    let mut estimator = estimator(mapped_vmem(), None, vec![empty_cache()]);
    estimator.add_page_table_walker(Arc::new(FixedPtw(Some(1))));
    assert_eq!(estimator.estimate_cycles(0, DATA, None, FIXED, &NullTrace), 4 * DRAM);
    assert_eq!(estimator.estimate_cycles(1, DATA, None, FIXED, &NullTrace), DRAM);
}
