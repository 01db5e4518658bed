//! DRAM memory controller.
//!
//! The controller owns the channels, the fault model and the latency
//! estimator, and moves packets between upstream queues and channels:
//! 1. **Intake:** Each tick, the accepted prefix of every upstream read,
//!    prefetch and write queue enters the channel its address maps to.
//! 2. **Channels:** Every channel runs one step with the fault model lent to it.
//! 3. **Return:** Channel responses are appended to the owning upstream's
//!    `returned` queue.
//!
//! Time is kept in picoseconds and advances by one controller period per tick.

use std::fmt;
use std::sync::Arc;

use crate::common::constants::{BITS_PER_BYTE, LOG2_PAGE_SIZE, PICOS_PER_MICRO};
use crate::common::ConfigError;
use crate::config::{Config, FaultMode};
use crate::fault::latency::{CacheProbe, LatencyEstimator, PageTableWalker, VirtualMemory};
use crate::fault::model::FaultModel;
use crate::fault::trace::{NullTrace, TraceSink, TracingTrace};
use crate::soc::memory::channel::{DramChannel, FaultContext};
use crate::soc::memory::mapping::AddressMapping;
use crate::soc::memory::request::{drain_accepted, Packet, SinkId, UpstreamQueue};

/// Multi-channel DRAM controller.
pub struct MemoryController {
    mapping: AddressMapping,
    channels: Vec<DramChannel>,
    upstream: Vec<UpstreamQueue>,

    fault: FaultModel,
    estimator: LatencyEstimator,
    trace: Box<dyn TraceSink>,

    clock_period: u64,
    data_bus_period: u64,
    channel_width: u64,
    current_time: u64,
    warmup: bool,
}

impl MemoryController {
    /// Builds a controller from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for out-of-range values and
    /// [`ConfigError::Mapping`] if the geometry cannot be mapped onto an address.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let mapping = AddressMapping::from_config(&config.dram)?;
        let channels = (0..mapping.channels())
            .map(|_| DramChannel::new(&config.dram, mapping.clone()))
            .collect();
        let trace: Box<dyn TraceSink> = if config.fault.debug_trace {
            Box::new(TracingTrace)
        } else {
            Box::new(NullTrace)
        };

        Ok(Self {
            mapping,
            channels,
            upstream: Vec::new(),
            fault: FaultModel::new(&config.fault)?,
            estimator: LatencyEstimator::new(config.fault.dram_latency_cycles),
            trace,
            clock_period: config.dram.controller_period_ps,
            data_bus_period: config.dram.data_bus_period_ps,
            channel_width: config.dram.channel_width,
            current_time: 0,
            warmup: false,
        })
    }

    // ═══ Wiring ═══

    /// Registers an upstream queue owner and returns its handle.
    pub fn add_upstream(&mut self) -> SinkId {
        self.upstream.push(UpstreamQueue::default());
        SinkId(self.upstream.len() - 1)
    }

    /// Returns the queues of an upstream owner.
    pub fn upstream(&self, id: SinkId) -> Option<&UpstreamQueue> {
        self.upstream.get(id.0)
    }

    /// Returns the queues of an upstream owner for pushing requests or taking responses.
    pub fn upstream_mut(&mut self, id: SinkId) -> Option<&mut UpstreamQueue> {
        self.upstream.get_mut(id.0)
    }

    /// Attaches the virtual-memory system consulted by the latency estimator.
    pub fn set_virtual_memory(&mut self, vmem: Arc<dyn VirtualMemory>) {
        self.estimator.set_virtual_memory(vmem);
    }

    /// Attaches the page-table walker of the next CPU.
    pub fn add_page_table_walker(&mut self, ptw: Arc<dyn PageTableWalker>) {
        self.estimator.add_page_table_walker(ptw);
    }

    /// Attaches a cache probed by the latency estimator.
    pub fn add_cache(&mut self, cache: Arc<dyn CacheProbe>) {
        self.estimator.add_cache(cache);
    }

    /// Replaces the fault trace sink.
    pub fn set_trace_sink(&mut self, trace: Box<dyn TraceSink>) {
        self.trace = trace;
    }

    // ═══ Lifecycle ═══

    /// Logs the DRAM geometry and fault configuration and, in ALL_ON mode,
    /// flags every page of the DRAM.
    pub fn initialize(&mut self) {
        tracing::info!(
            size_bytes = self.size(),
            channels = self.channels.len(),
            width_bits = self.channel_width * BITS_PER_BYTE,
            data_rate_mts = PICOS_PER_MICRO / self.data_bus_period,
            "off-chip DRAM"
        );

        let fault = &self.fault;
        tracing::info!(
            mode = fault.mode().name(),
            error_latency_ps = fault.error_latency(),
            pte_error_latency_ps = fault.pte_error_latency(),
            "fault model"
        );
        match fault.mode() {
            FaultMode::AllOn => {
                let pages = self.size() >> LOG2_PAGE_SIZE;
                self.fault.all_error_pages_on(pages);
                tracing::info!(pages, "all error pages on");
            }
            FaultMode::Random => tracing::info!(
                bit_error_rate = fault.bit_error_rate(),
                page_error_probability = fault.page_error_probability(),
                page_size_bits = fault.page_size_bits(),
                "BER-based error modeling enabled"
            ),
            FaultMode::Cycle => tracing::info!(
                cycle_interval = fault.cycle_interval(),
                "cycle-based error modeling enabled"
            ),
            FaultMode::Off => tracing::info!("error pages off"),
        }
    }

    /// Enables or disables the warm-up drain on every channel.
    pub fn set_warmup(&mut self, warmup: bool) {
        self.warmup = warmup;
        for channel in &mut self.channels {
            channel.set_warmup(warmup);
        }
    }

    /// Whether the controller is in warm-up.
    pub const fn is_warmup(&self) -> bool {
        self.warmup
    }

    /// Starts a phase: resets per-channel statistics.
    pub fn begin_phase(&mut self) {
        for (index, channel) in self.channels.iter_mut().enumerate() {
            channel.begin_phase(format!("Channel {index}"));
            channel.set_warmup(self.warmup);
        }
    }

    /// Ends a phase: snapshots per-channel statistics and logs the fault report.
    pub fn end_phase(&mut self) {
        for channel in &mut self.channels {
            channel.end_phase();
        }
        let report = self.fault.report();
        tracing::info!(%report, "end of phase");
    }

    // ═══ Operation ═══

    /// Advances time by one controller period and runs one step.
    ///
    /// # Returns
    ///
    /// The number of state changes made.
    pub fn tick(&mut self) -> usize {
        self.current_time += self.clock_period;
        self.operate()
    }

    /// Runs one step at the current time: intake, channel steps, response return.
    pub fn operate(&mut self) -> usize {
        self.initiate_requests();

        let now = self.current_time;
        let mut ctx = FaultContext {
            fault: &mut self.fault,
            estimator: &self.estimator,
            trace: self.trace.as_ref(),
        };
        let mut progress = 0;
        for channel in &mut self.channels {
            progress += channel.operate(now, &mut ctx);
            for (sink, response) in channel.drain_responses() {
                if let Some(upstream) = self.upstream.get_mut(sink.0) {
                    upstream.returned.push_back(response);
                }
            }
        }
        progress
    }

    fn initiate_requests(&mut self) {
        let mut upstream = std::mem::take(&mut self.upstream);
        for (index, queues) in upstream.iter_mut().enumerate() {
            let sink = SinkId(index);
            drain_accepted(&mut queues.rq, |packet| self.add_rq(packet, sink));
            drain_accepted(&mut queues.pq, |packet| self.add_rq(packet, sink));
            drain_accepted(&mut queues.wq, |packet| self.add_wq(packet));
        }
        self.upstream = upstream;
    }

    /// Places a read in the read queue of its channel.
    ///
    /// The response is routed to `sink` only if the packet requested one.
    /// Returns `false` if that read queue is full.
    pub fn add_rq(&mut self, packet: &Packet, sink: SinkId) -> bool {
        let target = packet.response_requested.then_some(sink);
        self.channel_for(packet)
            .is_some_and(|channel| channel.add_rq(packet, target))
    }

    /// Places a write in the write queue of its channel.
    ///
    /// Returns `false` and counts a `wq_full` event if that write queue is full.
    pub fn add_wq(&mut self, packet: &Packet) -> bool {
        self.channel_for(packet)
            .is_some_and(|channel| channel.add_wq(packet))
    }

    fn channel_for(&mut self, packet: &Packet) -> Option<&mut DramChannel> {
        let index = self.mapping.channel(packet.address) as usize;
        self.channels.get_mut(index)
    }

    // ═══ Accessors ═══

    /// Bytes of DRAM behind the controller.
    pub const fn size(&self) -> u64 {
        self.mapping.size()
    }

    /// Address mapping.
    pub const fn mapping(&self) -> &AddressMapping {
        &self.mapping
    }

    /// Channels.
    pub fn channels(&self) -> &[DramChannel] {
        &self.channels
    }

    /// Fault model.
    pub const fn fault_model(&self) -> &FaultModel {
        &self.fault
    }

    /// Fault model, for preloading error pages or clearing counters.
    pub const fn fault_model_mut(&mut self) -> &mut FaultModel {
        &mut self.fault
    }

    /// Current time in picoseconds.
    pub const fn current_time(&self) -> u64 {
        self.current_time
    }

    // ═══ Diagnostics ═══

    /// Renders the occupied queue slots of every channel.
    pub fn deadlock_report(&self) -> String {
        self.channels
            .iter()
            .enumerate()
            .map(|(index, channel)| format!("DRAM Channel {index}\n{}", channel.deadlock_report()))
            .collect()
    }

    /// Logs [`MemoryController::deadlock_report`] at warn level, one event per channel.
    pub fn print_deadlock(&self) {
        for (index, channel) in self.channels.iter().enumerate() {
            tracing::warn!(channel = index, "DRAM channel queues\n{}", channel.deadlock_report());
        }
    }
}

impl fmt::Debug for MemoryController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryController")
            .field("mapping", &self.mapping)
            .field("channels", &self.channels.len())
            .field("upstream", &self.upstream.len())
            .field("fault", &self.fault)
            .field("estimator", &self.estimator)
            .field("current_time", &self.current_time)
            .finish_non_exhaustive()
    }
}
