//! System-on-Chip (SoC) Components.
//!
//! Only the off-chip memory subsystem is modelled here; caches, page-table
//! walkers and virtual memory are external collaborators reached through the
//! traits in [`crate::fault::latency`].

/// DRAM controller, channels and address mapping.
pub mod memory;

pub use memory::MemoryController;
