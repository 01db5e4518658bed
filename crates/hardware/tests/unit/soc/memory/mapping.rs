//! Address Mapping Tests.
//!
//! Verifies field decoding, swizzling, collision detection and the
//! construction-time geometry checks of [`AddressMapping`].

use dramfault_core::common::{MappingError, PhysAddr};
use dramfault_core::config::DramConfig;
use dramfault_core::soc::memory::AddressMapping;
use proptest::prelude::*;
use rstest::rstest;

/// Default geometry: offset 6 bits, no channel bits, bankgroup 3, bank 2,
/// column 7, no rank bits, row 16 (row field starts at bit 18).
fn default_mapping() -> AddressMapping {
    AddressMapping::from_config(&DramConfig::default()).unwrap()
}

/// Two channels: channel bit 6, bankgroup 7..10, bank 10..12, column 12..19, row from 19.
fn two_channel_mapping() -> AddressMapping {
    AddressMapping::new(8, 8, 2, 8, 4, 1024, 1, 65536).unwrap()
}

// ══════════════════════════════════════════════════════════
// 1. Geometry
// ══════════════════════════════════════════════════════════

#[test]
fn default_geometry_round_trips() {
    let mapping = default_mapping();
    assert_eq!(mapping.prefetch_size(), 8);
    assert_eq!(mapping.offset_bits(), 6);
    assert_eq!(mapping.channels(), 1);
    assert_eq!(mapping.ranks(), 1);
    assert_eq!(mapping.bankgroups(), 8);
    assert_eq!(mapping.banks(), 4);
    assert_eq!(mapping.columns(), 1024);
    assert_eq!(mapping.rows(), 65536);
    assert_eq!(mapping.address_bits(), 34);
    assert_eq!(mapping.size(), 1 << 34);
}

#[test]
fn zero_channel_width_is_zero_prefetch() {
    let config = DramConfig {
        channel_width: 0,
        ..DramConfig::default()
    };
    assert_eq!(AddressMapping::from_config(&config), Err(MappingError::ZeroPrefetch));
}

#[test]
fn burst_must_cover_whole_lines() {
    assert!(matches!(
        AddressMapping::new(8, 4, 1, 8, 4, 1024, 1, 65536),
        Err(MappingError::PrefetchNotLineMultiple { prefetch_size: 4, .. })
    ));
}

#[rstest]
#[case::channels(3, 8, 4, 1, 65536, "channels")]
#[case::bankgroups(1, 6, 4, 1, 65536, "bankgroups")]
#[case::banks(1, 8, 0, 1, 65536, "banks")]
#[case::ranks(1, 8, 4, 5, 65536, "ranks")]
#[case::rows(1, 8, 4, 1, 1000, "rows")]
fn counts_must_be_powers_of_two(
    #[case] channels: u64,
    #[case] bankgroups: u64,
    #[case] banks: u64,
    #[case] ranks: u64,
    #[case] rows: u64,
    #[case] field: &str,
) {
    match AddressMapping::new(8, 8, channels, bankgroups, banks, 1024, ranks, rows) {
        Err(MappingError::NotPowerOfTwo { field: got, .. }) => assert_eq!(got, field),
        other => panic!("expected {field} rejection, got {other:?}"),
    }
}

#[test]
fn address_width_is_bounded() {
    assert_eq!(
        AddressMapping::new(8, 8, 1, 8, 4, 1024, 1 << 10, 1 << 40),
        Err(MappingError::AddressWidthExceeded { bits: 68 })
    );
}

// ══════════════════════════════════════════════════════════
// 2. Decoding and swizzling
// ══════════════════════════════════════════════════════════

#[test]
fn row_zero_decodes_fields_directly() {
    let mapping = default_mapping();
    // bankgroup 5, bank 2, column 9, offset 0x3f
    let address = PhysAddr::new((9 << 11) | (2 << 9) | (5 << 6) | 0x3f);
    let coords = mapping.map(address);
    assert_eq!(coords.channel, 0);
    assert_eq!(coords.rank, 0);
    assert_eq!(coords.bankgroup, 5);
    assert_eq!(coords.bank, 2);
    assert_eq!(coords.column, 9);
    assert_eq!(coords.row, 0);
}

#[test]
fn row_bits_swizzle_bankgroup_and_bank() {
    let mapping = default_mapping();
    // Row 1: the low row slice XORs 1 into the bank group.
    assert_eq!(mapping.bankgroup(PhysAddr::new(1 << 18)), 1);
    assert_eq!(mapping.bank(PhysAddr::new(1 << 18)), 0);
    // Row 0b01000: bit 3 of the slice lands in the bank field.
    assert_eq!(mapping.bankgroup(PhysAddr::new(0b01000 << 18)), 0);
    assert_eq!(mapping.bank(PhysAddr::new(0b01000 << 18)), 1);
    // Row 33 = slices 1 and 1 cancel out.
    let coords = mapping.map(PhysAddr::new(33 << 18));
    assert_eq!((coords.bankgroup, coords.bank, coords.row), (0, 0, 33));
}

#[test]
fn row_parity_swizzles_channel() {
    let mapping = two_channel_mapping();
    assert_eq!(mapping.channel(PhysAddr::new(0)), 0);
    assert_eq!(mapping.channel(PhysAddr::new(1 << 6)), 1);
    assert_eq!(mapping.channel(PhysAddr::new(1 << 19)), 1);
    assert_eq!(mapping.channel(PhysAddr::new((1 << 19) | (1 << 6))), 0);
    assert_eq!(mapping.channel(PhysAddr::new(0b11 << 19)), 0);
}

#[test]
fn sequential_rows_spread_over_bankgroups() {
    let mapping = default_mapping();
    let bankgroups: std::collections::HashSet<u64> =
        (0..8).map(|row| mapping.bankgroup(PhysAddr::new(row << 18))).collect();
    assert_eq!(bankgroups.len(), 8);
}

// ══════════════════════════════════════════════════════════
// 3. Collisions
// ══════════════════════════════════════════════════════════

#[test]
fn collision_ignores_offset_only() {
    let mapping = default_mapping();
    assert!(mapping.is_collision(PhysAddr::new(0x1000), PhysAddr::new(0x103f)));
    assert!(!mapping.is_collision(PhysAddr::new(0x1000), PhysAddr::new(0x1040)));
}

proptest! {
    #[test]
    fn collision_is_reflexive_and_symmetric(a in any::<u64>(), b in any::<u64>()) {
        let mapping = default_mapping();
        let (a, b) = (PhysAddr::new(a), PhysAddr::new(b));
        prop_assert!(mapping.is_collision(a, a));
        prop_assert_eq!(mapping.is_collision(a, b), mapping.is_collision(b, a));
    }

    #[test]
    fn collision_iff_only_offset_differs(a in any::<u64>(), offset in 0u64..64, flip in 6u32..64) {
        let mapping = default_mapping();
        let base = a & !0x3f;
        prop_assert!(mapping.is_collision(PhysAddr::new(base), PhysAddr::new(base | offset)));
        prop_assert!(!mapping.is_collision(PhysAddr::new(base), PhysAddr::new(base ^ (1 << flip))));
    }

    #[test]
    fn map_is_deterministic_and_fits_fields(a in 0u64..(1 << 40)) {
        for mapping in [default_mapping(), two_channel_mapping()] {
            let address = PhysAddr::new(a);
            let first = mapping.map(address);
            prop_assert_eq!(first, mapping.map(address));
            prop_assert!(first.channel < mapping.channels());
            prop_assert!(first.rank < mapping.ranks());
            prop_assert!(first.bankgroup < mapping.bankgroups());
            prop_assert!(first.bank < mapping.banks());
            prop_assert!(first.row < mapping.rows());
            prop_assert!(first.column < mapping.columns() / mapping.prefetch_size());
        }
    }

    #[test]
    fn same_line_maps_to_same_coordinates(a in any::<u64>(), offset in 0u64..64) {
        let mapping = two_channel_mapping();
        let base = a & !0x3f;
        prop_assert_eq!(mapping.map(PhysAddr::new(base)), mapping.map(PhysAddr::new(base | offset)));
    }
}
