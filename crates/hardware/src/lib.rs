//! DRAM timing and fault-injection library.
//!
//! This crate implements the off-chip memory of a cycle-level simulator with the following:
//! 1. **Mapping:** Swizzled decoding of physical addresses into DRAM coordinates.
//! 2. **Scheduling:** Per-channel queues, bank state, refresh, read/write mode
//!    switching and data-bus arbitration.
//! 3. **Faults:** OFF, ALL_ON, RANDOM and CYCLE error injection with fixed or
//!    page-table-walk-aware penalties.
//! 4. **Configuration & statistics:** JSON configuration and per-phase reports.
//!
//! # Example
//!
//! ```
//! use dramfault_core::common::{AccessType, PhysAddr};
//! use dramfault_core::soc::memory::Packet;
//! use dramfault_core::{Config, MemoryController};
//!
//! let mut mc = MemoryController::new(&Config::default()).unwrap();
//! let cpu = mc.add_upstream();
//! mc.upstream_mut(cpu).unwrap().rq.push_back(Packet {
//!     address: PhysAddr::new(0x1000),
//!     access: AccessType::Load,
//!     response_requested: true,
//!     ..Packet::default()
//! });
//!
//! while mc.upstream(cpu).unwrap().returned.is_empty() {
//!     let _ = mc.tick();
//! }
//! ```

/// Common types and constants (addresses, access types, errors).
pub mod common;
/// Simulator configuration (defaults, enums, hierarchical config structures).
pub mod config;
/// Error injection, latency estimation and tracing.
pub mod fault;
/// DRAM controller, channels and address mapping.
pub mod soc;
/// Statistics collection and reporting.
pub mod stats;

/// Root configuration type; use `Config::default()` or deserialize from JSON.
pub use crate::config::Config;
/// Shared fault-injection state.
pub use crate::fault::FaultModel;
/// Top-level DRAM controller; construct with `MemoryController::new`.
pub use crate::soc::MemoryController;
