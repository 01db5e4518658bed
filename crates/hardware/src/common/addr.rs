//! Physical and Virtual Address types.
//!
//! This module defines strong types for physical and virtual addresses to prevent
//! accidental mixing of address spaces. It provides the following:
//! 1. **Type Safety:** Distinguishes between virtual and physical address spaces at compile time.
//! 2. **Address Manipulation:** Page numbers, page offsets and cache-line numbers.
//! 3. **Collaborator Interface:** The currency of the virtual-memory and cache queries.

use std::fmt;

use super::constants::{LOG2_BLOCK_SIZE, LOG2_PAGE_SIZE, PAGE_OFFSET_MASK};

/// A virtual address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtAddr(pub u64);

/// A physical address.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysAddr(pub u64);

impl VirtAddr {
    /// Creates a new virtual address from a raw 64-bit value.
    #[inline(always)]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Returns the raw 64-bit address value.
    #[inline(always)]
    pub const fn val(&self) -> u64 {
        self.0
    }

    /// Returns the virtual page number.
    #[inline]
    pub const fn page_number(&self) -> u64 {
        self.0 >> LOG2_PAGE_SIZE
    }

    /// Returns the base address of the given virtual page.
    #[inline]
    pub const fn from_page_number(vpage: u64) -> Self {
        Self(vpage << LOG2_PAGE_SIZE)
    }

    /// Extracts the byte offset within a 4KB page.
    pub const fn page_offset(&self) -> u64 {
        self.0 & PAGE_OFFSET_MASK
    }
}

impl PhysAddr {
    /// Creates a new physical address from a raw 64-bit value.
    #[inline(always)]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// Returns the raw 64-bit address value.
    #[inline(always)]
    pub const fn val(&self) -> u64 {
        self.0
    }

    /// Returns the physical page number.
    #[inline]
    pub const fn page_number(&self) -> u64 {
        self.0 >> LOG2_PAGE_SIZE
    }

    /// Returns the base address of the given physical page.
    #[inline]
    pub const fn from_page_number(ppage: u64) -> Self {
        Self(ppage << LOG2_PAGE_SIZE)
    }

    /// Returns the cache-line number (address with the line offset shifted out).
    #[inline]
    pub const fn line_number(&self) -> u64 {
        self.0 >> LOG2_BLOCK_SIZE
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
