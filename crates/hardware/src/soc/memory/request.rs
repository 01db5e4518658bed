//! Requests, responses and upstream queues of the memory controller.
//!
//! This module provides:
//! 1. **Packet:** A request as issued by an upstream cache or page-table walker.
//! 2. **Request:** A packet accepted into a channel queue, with scheduling state.
//! 3. **Response:** The completion record returned to every registered sink.
//! 4. **UpstreamQueue:** The read/prefetch/write queues and return queue of one
//!    upstream owner, addressed by a [`SinkId`].

use std::collections::VecDeque;

use crate::common::{AccessType, PhysAddr, VirtAddr};

/// Handle of an upstream queue registered with the memory controller.
///
/// Requests record the sinks they must answer by handle rather than by
/// reference; the controller resolves the handle when delivering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SinkId(pub usize);

/// A memory request as issued upstream.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Packet {
    /// Physical address of the access.
    pub address: PhysAddr,
    /// Virtual address of the access (page-table walks use it as a hint).
    pub v_address: VirtAddr,
    /// Payload carried by writes and returned by reads.
    pub data: u64,
    /// Prefetcher metadata passed through untouched.
    pub pf_metadata: u32,
    /// Issuing CPU.
    pub cpu: u32,
    /// Access kind.
    pub access: AccessType,
    /// Whether the issuer wants a response (reads only).
    pub response_requested: bool,
    /// Instructions waiting on this access.
    pub instr_depend_on_me: Vec<u64>,
}

/// A packet accepted into a channel read or write queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    /// Physical address of the access.
    pub address: PhysAddr,
    /// Virtual address of the access.
    pub v_address: VirtAddr,
    /// Payload.
    pub data: u64,
    /// Prefetcher metadata.
    pub pf_metadata: u32,
    /// Issuing CPU.
    pub cpu: u32,
    /// Access kind.
    pub access: AccessType,
    /// Instructions waiting on this access, sorted and deduplicated.
    pub instr_depend_on_me: Vec<u64>,
    /// Sinks that receive the response, sorted and deduplicated.
    pub to_return: Vec<SinkId>,
    /// Set once a bank has been assigned to this request.
    pub scheduled: bool,
    /// Earliest time (ps) the request may be scheduled; `u64::MAX` while scheduled.
    pub ready_time: u64,
    /// Set once the request has been checked against the queues for collisions.
    pub forward_checked: bool,
}

impl Request {
    /// Wraps an upstream packet, ready to be scheduled at `now`.
    pub fn new(packet: &Packet, now: u64) -> Self {
        let mut instr_depend_on_me = packet.instr_depend_on_me.clone();
        instr_depend_on_me.sort_unstable();
        instr_depend_on_me.dedup();
        Self {
            address: packet.address,
            v_address: packet.v_address,
            data: packet.data,
            pf_metadata: packet.pf_metadata,
            cpu: packet.cpu,
            access: packet.access,
            instr_depend_on_me,
            to_return: Vec::new(),
            scheduled: false,
            ready_time: now,
            forward_checked: false,
        }
    }

    /// Builds the response for this request, optionally carrying another payload
    /// (used when a read is satisfied by a queued write).
    pub fn response(&self, data: u64) -> Response {
        Response {
            address: self.address,
            v_address: self.v_address,
            data,
            pf_metadata: self.pf_metadata,
            instr_depend_on_me: self.instr_depend_on_me.clone(),
        }
    }

    /// Whether the request has been collision-checked or holds a bank.
    pub const fn is_settled(&self) -> bool {
        self.forward_checked || self.scheduled
    }

    /// Absorbs the dependents and response targets of a request that is being
    /// dropped in favour of this one.
    pub fn absorb(&mut self, other: Self) {
        self.instr_depend_on_me.extend(other.instr_depend_on_me);
        self.instr_depend_on_me.sort_unstable();
        self.instr_depend_on_me.dedup();
        self.to_return.extend(other.to_return);
        self.to_return.sort_unstable();
        self.to_return.dedup();
    }
}

/// Completion record delivered upstream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    /// Physical address of the access.
    pub address: PhysAddr,
    /// Virtual address of the access.
    pub v_address: VirtAddr,
    /// Returned payload.
    pub data: u64,
    /// Prefetcher metadata.
    pub pf_metadata: u32,
    /// Instructions waiting on this access.
    pub instr_depend_on_me: Vec<u64>,
}

/// Queues shared between one upstream owner and the memory controller.
///
/// The owner pushes into `rq`, `pq` and `wq`; the controller drains the
/// accepted prefix of each every cycle and appends completions to `returned`.
#[derive(Clone, Debug, Default)]
pub struct UpstreamQueue {
    /// Demand reads.
    pub rq: VecDeque<Packet>,
    /// Prefetches.
    pub pq: VecDeque<Packet>,
    /// Writebacks.
    pub wq: VecDeque<Packet>,
    /// Responses returned to the owner.
    pub returned: VecDeque<Response>,
}

impl UpstreamQueue {
    /// Returns `true` when no request is waiting to enter the controller.
    pub fn is_drained(&self) -> bool {
        self.rq.is_empty() && self.pq.is_empty() && self.wq.is_empty()
    }
}

/// Removes the longest prefix of `queue` whose packets `accept` takes,
/// stopping at the first rejection.
pub(crate) fn drain_accepted(queue: &mut VecDeque<Packet>, mut accept: impl FnMut(&Packet) -> bool) {
    let taken = queue.iter().take_while(|packet| accept(packet)).count();
    let _ = queue.drain(..taken);
}
