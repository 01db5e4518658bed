//! Off-chip DRAM.
//!
//! This module implements the DRAM side of the memory hierarchy. It provides:
//! 1. **Mapping:** Address decoding into channel, rank, bank group, bank, row and column.
//! 2. **Requests:** Packets, queued requests, responses and upstream queues.
//! 3. **Channel:** The per-channel scheduler and bank state machine.
//! 4. **Controller:** Intake from upstream queues and the channel array.

/// Per-channel scheduler.
pub mod channel;

/// Memory controller.
pub mod controller;

/// Address mapping.
pub mod mapping;

/// Request and response types.
pub mod request;

pub use channel::{BankRequest, ChannelTiming, DramChannel};
pub use controller::MemoryController;
pub use mapping::{AddressMapping, DramCoordinates};
pub use request::{Packet, Request, Response, SinkId, UpstreamQueue};
