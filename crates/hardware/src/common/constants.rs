//! Global constants.
//!
//! This module defines the sizes and unit conversions used across the simulator:
//! 1. **Memory Constants:** Cache line and page sizes with their shifts.
//! 2. **Time Constants:** Conversions into the picosecond time base.

/// Cache line (block) size in bytes.
pub const BLOCK_SIZE: u64 = 64;

/// Number of bits to shift to convert between bytes and cache lines.
pub const LOG2_BLOCK_SIZE: u32 = 6;

/// Page size in bytes (4KB).
pub const PAGE_SIZE: u64 = 4096;

/// Number of bits to shift to convert between bytes and pages.
pub const LOG2_PAGE_SIZE: u32 = 12;

/// Mask for extracting the page offset from an address.
pub const PAGE_OFFSET_MASK: u64 = PAGE_SIZE - 1;

/// Picoseconds per microsecond.
pub const PICOS_PER_MICRO: u64 = 1_000_000;

/// Bytes per gibibyte.
pub const BYTES_PER_GIB: u64 = 1 << 30;

/// Bits per byte.
pub const BITS_PER_BYTE: u64 = 8;
