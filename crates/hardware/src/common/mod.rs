//! Common types shared by the mapper, the channel scheduler and the fault model.
//!
//! This module provides the fundamental building blocks used across the crate:
//! 1. **Address Types:** Strong types for virtual and physical addresses.
//! 2. **Constants:** Line, page and time-unit constants.
//! 3. **Memory Access:** Classification of requests reaching the DRAM controller.
//! 4. **Error Handling:** Construction-time configuration and mapping errors.

/// Address type definitions (physical and virtual addresses).
pub mod addr;

/// Common constants used throughout the simulator.
pub mod constants;

/// Memory access type definitions.
pub mod data;

/// Error types for configuration and address mapping.
pub mod error;

pub use addr::{PhysAddr, VirtAddr};
pub use constants::{BLOCK_SIZE, LOG2_BLOCK_SIZE, LOG2_PAGE_SIZE, PAGE_SIZE};
pub use data::AccessType;
pub use error::{ConfigError, MappingError};
