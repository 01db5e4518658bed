//! DRAM channel scheduler.
//!
//! A channel owns fixed-capacity read and write queues, one [`BankRequest`]
//! slot per bank and a shared data bus. Each call to [`DramChannel::operate`]
//! runs the following stages in order:
//! 1. **Warm-up drain:** Occupied slots complete immediately, bypassing timing.
//! 2. **Fault clock:** In CYCLE mode, queues errors that have fallen due.
//! 3. **Collisions:** Duplicate writes are dropped, reads are forwarded from
//!    queued writes or merged with reads to the same line.
//! 4. **Refresh:** Periodic sweeps put idle banks under refresh for tRFC.
//! 5. **Bus finish:** The bank on the data bus returns its response.
//! 6. **Mode switch:** Read/write mode flips on watermark hysteresis.
//! 7. **Bus population:** The earliest ready bank is placed on the bus.
//! 8. **Service:** The best pending request is assigned to its bank.
//!
//! Banks refer to their request by a [`SlotRef`] (queue kind and index), and
//! the active bank is an index into the bank table.

use std::fmt;
use std::fmt::Write as _;

use crate::common::constants::{BYTES_PER_GIB, BITS_PER_BYTE, PICOS_PER_MICRO};
use crate::common::PhysAddr;
use crate::config::{DramConfig, FaultMode};
use crate::fault::latency::LatencyEstimator;
use crate::fault::model::{FaultAccess, FaultModel};
use crate::fault::trace::TraceSink;
use crate::soc::memory::mapping::AddressMapping;
use crate::soc::memory::request::{Packet, Request, Response, SinkId};
use crate::stats::DramStats;

/// Queue a request lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueKind {
    /// Read queue.
    Read,
    /// Write queue.
    Write,
}

/// Stable handle of a queue slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotRef {
    /// Queue holding the request.
    pub kind: QueueKind,
    /// Slot index within that queue.
    pub index: usize,
}

/// State of one bank.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BankRequest {
    /// A request occupies the bank.
    pub valid: bool,
    /// The occupying request hit the open row.
    pub row_buffer_hit: bool,
    /// A refresh sweep is waiting for the bank to become idle.
    pub need_refresh: bool,
    /// The bank is being refreshed.
    pub under_refresh: bool,
    /// Row held in the row buffer.
    pub open_row: Option<u64>,
    /// Time (ps) the bank finishes its current access, bus transfer or refresh.
    pub ready_time: u64,
    /// Queue slot of the occupying request.
    pub slot: Option<SlotRef>,
}

/// Channel timing, derived once from the configuration. All values in picoseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelTiming {
    /// Precharge.
    pub t_rp: u64,
    /// Row activate.
    pub t_rcd: u64,
    /// Column access.
    pub t_cas: u64,
    /// Row active.
    pub t_ras: u64,
    /// Interval between refresh sweeps.
    pub t_ref: u64,
    /// Duration of a bank refresh.
    pub t_rfc: u64,
    /// Data bus clock period.
    pub data_bus_period: u64,
    /// Bus idle time after a read/write mode switch.
    pub dbus_turn_around: u64,
    /// Bus occupancy of one burst.
    pub dbus_return: u64,
    /// Extra bus cooldown of a bank group after a burst.
    pub bankgroup_stall: u64,
    /// Rows covered by one refresh sweep.
    pub rows_per_refresh: u64,
}

impl ChannelTiming {
    /// Derives the timing of a channel.
    pub fn new(config: &DramConfig, mapping: &AddressMapping) -> Self {
        let period = config.controller_period_ps;
        let prefetch = mapping.prefetch_size();
        let density = mapping.rows() * mapping.columns() * mapping.banks() * mapping.bankgroups();
        let density_gib = (density / BYTES_PER_GIB) as f64;
        let t_rfc = ((BITS_PER_BYTE as f64 * density_gib).sqrt() * (period * config.t_ras) as f64) as u64;
        let t_ras = config.t_ras * period;

        Self {
            t_rp: config.t_rp * period,
            t_rcd: config.t_rcd * period,
            t_cas: config.t_cas * period,
            t_ras,
            t_ref: config.refresh_period_us * PICOS_PER_MICRO / config.refreshes_per_period,
            t_rfc,
            data_bus_period: config.data_bus_period_ps,
            dbus_turn_around: t_ras,
            dbus_return: config.data_bus_period_ps * prefetch,
            bankgroup_stall: config.data_bus_period_ps * (prefetch / 3).max(1),
            rows_per_refresh: mapping.rows() / config.refreshes_per_period,
        }
    }

    /// Bank access latency before any error penalty.
    ///
    /// A row hit costs tCAS; a miss adds tRCD, plus tRP when another row must
    /// first be closed.
    pub const fn access_latency(&self, open_row: Option<u64>, row: u64) -> u64 {
        match open_row {
            Some(open) if open == row => self.t_cas,
            Some(_) => self.t_cas + self.t_rp + self.t_rcd,
            None => self.t_cas + self.t_rcd,
        }
    }
}

/// Fault-model handles lent to a channel for one step.
pub struct FaultContext<'a> {
    /// The controller's fault model.
    pub fault: &'a mut FaultModel,
    /// The controller's latency estimator.
    pub estimator: &'a LatencyEstimator,
    /// Receiver of fault trace events.
    pub trace: &'a dyn TraceSink,
}

impl fmt::Debug for FaultContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FaultContext")
            .field("fault", &self.fault)
            .field("estimator", &self.estimator)
            .finish_non_exhaustive()
    }
}

/// One DRAM channel.
#[derive(Debug)]
pub struct DramChannel {
    mapping: AddressMapping,
    timing: ChannelTiming,

    rq: Vec<Option<Request>>,
    wq: Vec<Option<Request>>,
    bank_request: Vec<BankRequest>,
    bankgroup_ready: Vec<u64>,
    active_request: Option<usize>,

    write_mode: bool,
    dbus_cycle_available: u64,
    last_refresh: u64,
    refresh_row: u64,
    current_time: u64,
    warmup: bool,

    outbox: Vec<(SinkId, Response)>,

    /// Statistics of the running phase.
    pub sim_stats: DramStats,
    /// Statistics snapshot taken at the end of the region of interest.
    pub roi_stats: DramStats,
}

impl DramChannel {
    /// Creates an idle channel in read mode.
    ///
    /// # Arguments
    ///
    /// * `config` - Timing and queue sizes.
    /// * `mapping` - Address mapping shared by all channels of the controller.
    pub fn new(config: &DramConfig, mapping: AddressMapping) -> Self {
        let bankgroups = (mapping.ranks() * mapping.bankgroups()) as usize;
        let banks = bankgroups * mapping.banks() as usize;
        Self {
            timing: ChannelTiming::new(config, &mapping),
            mapping,
            rq: vec![None; config.rq_size],
            wq: vec![None; config.wq_size],
            bank_request: vec![BankRequest::default(); banks],
            bankgroup_ready: vec![0; bankgroups],
            active_request: None,
            write_mode: false,
            dbus_cycle_available: 0,
            last_refresh: 0,
            refresh_row: 0,
            current_time: 0,
            warmup: false,
            outbox: Vec::new(),
            sim_stats: DramStats::default(),
            roi_stats: DramStats::default(),
        }
    }

    // ═══ Queues ═══

    /// Accepts a read into the first free read slot.
    ///
    /// The response goes to `sink` if given. Returns `false` if the read queue is full.
    pub fn add_rq(&mut self, packet: &Packet, sink: Option<SinkId>) -> bool {
        let Some(slot) = self.rq.iter_mut().find(|slot| slot.is_none()) else {
            return false;
        };
        let mut request = Request::new(packet, self.current_time);
        request.to_return.extend(sink);
        *slot = Some(request);
        true
    }

    /// Accepts a write into the first free write slot.
    ///
    /// Returns `false` and counts a `wq_full` event if the write queue is full.
    pub fn add_wq(&mut self, packet: &Packet) -> bool {
        let Some(slot) = self.wq.iter_mut().find(|slot| slot.is_none()) else {
            self.sim_stats.wq_full += 1;
            return false;
        };
        *slot = Some(Request::new(packet, self.current_time));
        true
    }

    /// Read queue slots.
    pub fn rq(&self) -> &[Option<Request>] {
        &self.rq
    }

    /// Write queue slots.
    pub fn wq(&self) -> &[Option<Request>] {
        &self.wq
    }

    /// Occupied read slots.
    pub fn rq_occupancy(&self) -> usize {
        self.rq.iter().flatten().count()
    }

    /// Occupied write slots.
    pub fn wq_occupancy(&self) -> usize {
        self.wq.iter().flatten().count()
    }

    /// Write-mode entry threshold (7/8 of the write queue).
    pub const fn write_high_watermark(&self) -> usize {
        (self.wq.len() * 7) >> 3
    }

    /// Write-mode exit threshold (6/8 of the write queue) while reads are pending.
    pub const fn write_low_watermark(&self) -> usize {
        (self.wq.len() * 6) >> 3
    }

    fn queue(&self, kind: QueueKind) -> &[Option<Request>] {
        match kind {
            QueueKind::Read => &self.rq,
            QueueKind::Write => &self.wq,
        }
    }

    fn request_mut(&mut self, slot: SlotRef) -> Option<&mut Request> {
        let queue = match slot.kind {
            QueueKind::Read => &mut self.rq,
            QueueKind::Write => &mut self.wq,
        };
        queue.get_mut(slot.index).and_then(Option::as_mut)
    }

    fn take_request(&mut self, slot: SlotRef) -> Option<Request> {
        let queue = match slot.kind {
            QueueKind::Read => &mut self.rq,
            QueueKind::Write => &mut self.wq,
        };
        queue.get_mut(slot.index).and_then(Option::take)
    }

    // ═══ State ═══

    /// Bank states, indexed by `(rank * bankgroups + bankgroup) * banks + bank`.
    pub fn banks(&self) -> &[BankRequest] {
        &self.bank_request
    }

    /// Index of the bank on the data bus.
    pub const fn active_request(&self) -> Option<usize> {
        self.active_request
    }

    /// Whether the channel is draining writes.
    pub const fn is_write_mode(&self) -> bool {
        self.write_mode
    }

    /// Earliest time (ps) the bus may take a new burst after a mode switch.
    pub const fn dbus_cycle_available(&self) -> u64 {
        self.dbus_cycle_available
    }

    /// First row of the next refresh sweep.
    pub const fn refresh_row(&self) -> u64 {
        self.refresh_row
    }

    /// Time (ps) of the last step.
    pub const fn current_time(&self) -> u64 {
        self.current_time
    }

    /// Derived timing.
    pub const fn timing(&self) -> &ChannelTiming {
        &self.timing
    }

    /// Enables or disables the warm-up drain.
    pub const fn set_warmup(&mut self, warmup: bool) {
        self.warmup = warmup;
    }

    /// Starts a new phase with zeroed statistics.
    pub fn begin_phase(&mut self, name: impl Into<String>) {
        self.sim_stats = DramStats::new(name);
    }

    /// Snapshots the running statistics as the region of interest.
    pub fn end_phase(&mut self) {
        self.roi_stats = self.sim_stats.clone();
    }

    /// Removes and returns the responses produced so far.
    pub fn drain_responses(&mut self) -> Vec<(SinkId, Response)> {
        std::mem::take(&mut self.outbox)
    }

    /// Bank-table index of `address`.
    pub fn bank_index(&self, address: PhysAddr) -> usize {
        (self.bankgroup_index(address) * self.mapping.banks() + self.mapping.bank(address)) as usize
    }

    fn bankgroup_index(&self, address: PhysAddr) -> u64 {
        self.mapping.rank(address) * self.mapping.bankgroups() + self.mapping.bankgroup(address)
    }

    fn respond(&mut self, request: &Request, data: u64) {
        let response = request.response(data);
        self.outbox
            .extend(request.to_return.iter().map(|&sink| (sink, response.clone())));
    }

    // ═══ Step ═══

    /// Advances the channel to `now` and runs one step.
    ///
    /// Returns the number of state changes made, for forward-progress tracking.
    pub fn operate(&mut self, now: u64, ctx: &mut FaultContext<'_>) -> usize {
        self.current_time = now;
        let mut progress = 0;

        if self.warmup {
            progress += self.drain_for_warmup();
        } else if ctx.fault.mode() == FaultMode::Cycle {
            let cpu_cycle = ctx.fault.to_cpu_cycles(now);
            ctx.fault.update_cycle_errors(cpu_cycle);
        }

        self.check_write_collision();
        self.check_read_collision();
        progress += self.schedule_refresh();
        progress += self.finish_dbus_request();
        self.swap_write_mode();
        progress += self.populate_dbus();
        let next = self.schedule_packet();
        progress += self.service_packet(next, ctx);
        progress
    }

    fn drain_for_warmup(&mut self) -> usize {
        for bank in &mut self.bank_request {
            bank.valid = false;
            bank.slot = None;
        }
        self.active_request = None;

        let mut progress = 0;
        for index in 0..self.rq.len() {
            if let Some(request) = self.rq[index].take() {
                self.respond(&request, request.data);
                progress += 1;
            }
        }
        for slot in &mut self.wq {
            if slot.take().is_some() {
                progress += 1;
            }
        }
        progress
    }

    /// Drops the later of every pair of same-line writes; the earlier one
    /// stands for both. A write that is already checked or on a bank is never
    /// dropped in favour of an unchecked one.
    fn check_write_collision(&mut self) {
        for index in 0..self.wq.len() {
            let Some(address) = self.wq[index]
                .as_ref()
                .filter(|request| !request.forward_checked)
                .map(|request| request.address)
            else {
                continue;
            };
            let mapping = &self.mapping;
            let collides = |slot: &Option<Request>| {
                slot.as_ref()
                    .is_some_and(|request| mapping.is_collision(request.address, address))
            };

            if self.wq[..index].iter().any(collides) {
                self.wq[index] = None;
                continue;
            }
            if let Some(offset) = self.wq[index + 1..].iter().position(collides) {
                let later = index + 1 + offset;
                if self.wq[later].as_ref().is_some_and(Request::is_settled) {
                    self.wq[index] = None;
                    continue;
                }
                self.wq[later] = None;
            }
            if let Some(request) = self.wq[index].as_mut() {
                request.forward_checked = true;
            }
        }
    }

    /// Resolves every unchecked read against the write queue, then against
    /// earlier and later reads to the same line.
    fn check_read_collision(&mut self) {
        for index in 0..self.rq.len() {
            let Some(address) = self.rq[index]
                .as_ref()
                .filter(|request| !request.forward_checked)
                .map(|request| request.address)
            else {
                continue;
            };
            let collides = |slot: &Option<Request>| {
                slot.as_ref()
                    .is_some_and(|request| self.mapping.is_collision(request.address, address))
            };

            let forwarded = self.wq.iter().flatten().find(|write| self.mapping.is_collision(write.address, address));
            if let Some(data) = forwarded.map(|write| write.data) {
                if let Some(read) = self.rq[index].take() {
                    self.respond(&read, data);
                }
            } else if let Some(earlier) = self.rq[..index].iter().position(collides) {
                let read = self.rq[index].take();
                if let (Some(read), Some(survivor)) = (read, self.rq[earlier].as_mut()) {
                    survivor.absorb(read);
                }
            } else if let Some(offset) = self.rq[index + 1..].iter().position(collides) {
                let later = index + 1 + offset;
                // A settled read keeps its slot, since a bank may refer to it.
                let (survivor, merged) = if self.rq[later].as_ref().is_some_and(Request::is_settled) {
                    (later, index)
                } else {
                    (index, later)
                };
                let merged = self.rq[merged].take();
                if let (Some(merged), Some(survivor)) = (merged, self.rq[survivor].as_mut()) {
                    survivor.absorb(merged);
                    survivor.forward_checked = true;
                }
            } else if let Some(request) = self.rq[index].as_mut() {
                request.forward_checked = true;
            }
        }
    }

    fn schedule_refresh(&mut self) -> usize {
        let now = self.current_time;
        let sweep = now >= self.last_refresh.saturating_add(self.timing.t_ref);
        if sweep {
            self.last_refresh = now;
            self.refresh_row = (self.refresh_row + self.timing.rows_per_refresh) % self.mapping.rows();
            self.sim_stats.refresh_cycles += 1;
        }

        let mut progress = 0;
        for bank in &mut self.bank_request {
            if sweep {
                bank.need_refresh = true;
            }
            if bank.need_refresh && !bank.valid {
                bank.ready_time = now + self.timing.t_rfc;
                bank.need_refresh = false;
                bank.under_refresh = true;
            } else if bank.under_refresh && bank.ready_time <= now {
                bank.under_refresh = false;
                bank.open_row = None;
                progress += 1;
            }

            if bank.under_refresh {
                progress += 1;
            }
        }
        progress
    }

    fn finish_dbus_request(&mut self) -> usize {
        let Some(active) = self.active_request else {
            return 0;
        };
        let bank = &mut self.bank_request[active];
        if bank.ready_time > self.current_time {
            return 0;
        }

        bank.valid = false;
        let slot = bank.slot.take();
        self.active_request = None;
        let request = slot.and_then(|slot| self.take_request(slot));
        debug_assert!(request.is_some(), "bank {active} refers to an empty queue slot");
        if let Some(request) = request {
            self.respond(&request, request.data);
        }
        1
    }

    fn swap_write_mode(&mut self) {
        let wq_occupancy = self.wq_occupancy();
        let rq_occupancy = self.rq_occupancy();
        let enter = !self.write_mode
            && (wq_occupancy >= self.write_high_watermark() || (rq_occupancy == 0 && wq_occupancy > 0));
        let leave = self.write_mode
            && (wq_occupancy == 0 || (rq_occupancy > 0 && wq_occupancy < self.write_low_watermark()));
        if !enter && !leave {
            return;
        }

        let now = self.current_time;
        for index in 0..self.bank_request.len() {
            if Some(index) == self.active_request || !self.bank_request[index].valid {
                continue;
            }
            let bank = &mut self.bank_request[index];
            if bank.ready_time < now + self.timing.t_cas {
                bank.open_row = None;
            }
            bank.valid = false;
            let slot = bank.slot.take();
            let request = slot.and_then(|slot| self.request_mut(slot));
            debug_assert!(request.is_some(), "bank {index} refers to an empty queue slot");
            if let Some(request) = request {
                request.scheduled = false;
                request.ready_time = now;
            }
        }

        let busy_until = self
            .active_request
            .map_or(now, |active| self.bank_request[active].ready_time);
        self.dbus_cycle_available = busy_until + self.timing.dbus_turn_around;
        self.write_mode = !self.write_mode;
    }

    fn populate_dbus(&mut self) -> usize {
        let now = self.current_time;
        let Some((index, ready_time)) = self
            .bank_request
            .iter()
            .enumerate()
            .filter(|(_, bank)| bank.valid)
            .map(|(index, bank)| (index, bank.ready_time))
            .min_by_key(|&(_, ready_time)| ready_time)
        else {
            return 0;
        };
        if ready_time > now {
            return 0;
        }

        if self.active_request.is_none() && self.dbus_cycle_available <= now {
            let bankgroup = index / self.mapping.banks() as usize;
            let bankgroup_ready = self.bankgroup_ready[bankgroup];
            let start = bankgroup_ready.max(now);
            self.bankgroup_ready[bankgroup] = now + self.timing.dbus_return + self.timing.bankgroup_stall;

            let bank = &mut self.bank_request[index];
            bank.ready_time = start + self.timing.dbus_return;
            self.active_request = Some(index);

            let stats = &mut self.sim_stats;
            match (self.write_mode, bank.row_buffer_hit) {
                (true, true) => stats.wq_row_buffer_hit += 1,
                (true, false) => stats.wq_row_buffer_miss += 1,
                (false, true) => stats.rq_row_buffer_hit += 1,
                (false, false) => stats.rq_row_buffer_miss += 1,
            }
            1
        } else {
            let busy_until = self
                .active_request
                .map_or(self.dbus_cycle_available, |active| self.bank_request[active].ready_time);
            self.sim_stats.dbus_cycle_congested += busy_until.saturating_sub(now) / self.timing.data_bus_period;
            self.sim_stats.dbus_count_congested += 1;
            0
        }
    }

    /// Picks the unscheduled request of the active-mode queue to service next:
    /// one whose bank is free first, then the earliest ready time. Later slots
    /// win ties.
    fn schedule_packet(&self) -> Option<SlotRef> {
        let kind = if self.write_mode {
            QueueKind::Write
        } else {
            QueueKind::Read
        };

        let mut best: Option<(usize, bool, u64)> = None;
        for (index, slot) in self.queue(kind).iter().enumerate() {
            let Some(request) = slot.as_ref().filter(|request| !request.scheduled) else {
                continue;
            };
            let bank_free = !self.bank_request[self.bank_index(request.address)].valid;
            let better = best.is_none_or(|(_, best_free, best_ready)| {
                if bank_free == best_free {
                    request.ready_time <= best_ready
                } else {
                    bank_free
                }
            });
            if better {
                best = Some((index, bank_free, request.ready_time));
            }
        }
        best.map(|(index, ..)| SlotRef { kind, index })
    }

    fn service_packet(&mut self, slot: Option<SlotRef>, ctx: &mut FaultContext<'_>) -> usize {
        let now = self.current_time;
        let Some(slot) = slot else {
            return 0;
        };
        let Some(access) = self.request_mut(slot).filter(|request| request.ready_time <= now).map(|request| FaultAccess {
            cpu: request.cpu,
            address: request.address,
            v_address: request.v_address,
            access: request.access,
        }) else {
            return 0;
        };

        let row = self.mapping.row(access.address);
        let bank_index = self.bank_index(access.address);
        let open_row = {
            let bank = &self.bank_request[bank_index];
            if bank.valid || bank.under_refresh {
                return 0;
            }
            bank.open_row
        };

        let penalty = ctx.fault.penalty_for(&access, ctx.estimator, ctx.trace);
        let latency = self.timing.access_latency(open_row, row) + penalty;
        self.bank_request[bank_index] = BankRequest {
            valid: true,
            row_buffer_hit: open_row == Some(row),
            need_refresh: false,
            under_refresh: false,
            open_row: Some(row),
            ready_time: now + latency,
            slot: Some(slot),
        };
        if let Some(request) = self.request_mut(slot) {
            request.scheduled = true;
            request.ready_time = u64::MAX;
        }
        1
    }

    // ═══ Diagnostics ═══

    /// Renders every occupied queue slot for deadlock diagnosis.
    pub fn deadlock_report(&self) -> String {
        let mut report = String::new();
        for (label, queue) in [("RQ", &self.rq), ("WQ", &self.wq)] {
            if queue.iter().all(Option::is_none) {
                let _ = writeln!(report, "{label} empty");
                continue;
            }
            for (index, request) in queue.iter().enumerate() {
                if let Some(request) = request {
                    let _ = writeln!(
                        report,
                        "[{label}] entry: {index} address: {} forward_checked: {} scheduled: {}",
                        request.address, request.forward_checked, request.scheduled
                    );
                }
            }
        }
        report
    }
}
