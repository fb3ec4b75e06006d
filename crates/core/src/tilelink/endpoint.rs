//! TileLink endpoint models.
//!
//! A host or device endpoint owns one end of each of the five channels. Each
//! sender end keeps a queue of outgoing messages, a queue of pending inbound
//! requests it still owes responses to, and the set of transaction IDs in
//! use. Receivers track flow control and multi-beat arrival.
//!
//! Per cycle the driver calls, in order: `set_flow_control` (accepted beats
//! leave the wire, receivers announce ready), `set_outputs` (new beats are
//! driven), the network evaluation, then `get_inputs` (beats are sampled and
//! acceptance recorded). Randomized runs may stall, retract beats, reorder
//! pending work on non-FIFO endpoints, and inject new requests.

use std::collections::{HashSet, VecDeque};

use log::{debug, warn};

use crate::tilelink::config::{EndpointConfig, TlConfig};
use crate::tilelink::message::{APatch, BPatch, CPatch, Channel, TlMessage};
use crate::tilelink::protocol::{
    align, bits_to_size, complete_mask, full_mask, num_beats, AOpcode, BOpcode, COpcode, DOpcode,
    TlA, TlB, TlC, TlD, TlE, TlProtocol,
};
use crate::tilelink::random::TlRng;

/// Raised when a response cannot be generated because every transaction ID in
/// the pool is outstanding. Never visible outside the testbench: the offending
/// request stays queued and is retried next cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoAvailableId;

/// Signal-level view of the network under test, hierarchy flattened and
/// indexed by endpoint position. Hosts drive A/C/E and observe B/D; devices
/// drive B/D and observe A/C/E.
pub trait TlNetwork {
    fn host_a_ready(&self, host: usize) -> bool;
    fn host_a_valid(&self, host: usize) -> bool;
    fn drive_host_a(&mut self, host: usize, beat: TlA);
    fn drive_host_a_valid(&mut self, host: usize, valid: bool);
    fn dev_a_valid(&self, device: usize) -> bool;
    fn dev_a_beat(&self, device: usize) -> TlA;
    fn drive_dev_a_ready(&mut self, device: usize, ready: bool);

    fn dev_b_ready(&self, device: usize) -> bool;
    fn dev_b_valid(&self, device: usize) -> bool;
    fn drive_dev_b(&mut self, device: usize, beat: TlB);
    fn drive_dev_b_valid(&mut self, device: usize, valid: bool);
    fn host_b_valid(&self, host: usize) -> bool;
    fn host_b_beat(&self, host: usize) -> TlB;
    fn drive_host_b_ready(&mut self, host: usize, ready: bool);

    fn host_c_ready(&self, host: usize) -> bool;
    fn host_c_valid(&self, host: usize) -> bool;
    fn drive_host_c(&mut self, host: usize, beat: TlC);
    fn drive_host_c_valid(&mut self, host: usize, valid: bool);
    fn dev_c_valid(&self, device: usize) -> bool;
    fn dev_c_beat(&self, device: usize) -> TlC;
    fn drive_dev_c_ready(&mut self, device: usize, ready: bool);

    fn dev_d_ready(&self, device: usize) -> bool;
    fn dev_d_valid(&self, device: usize) -> bool;
    fn drive_dev_d(&mut self, device: usize, beat: TlD);
    fn drive_dev_d_valid(&mut self, device: usize, valid: bool);
    fn host_d_valid(&self, host: usize) -> bool;
    fn host_d_beat(&self, host: usize) -> TlD;
    fn drive_host_d_ready(&mut self, host: usize, ready: bool);

    fn host_e_ready(&self, host: usize) -> bool;
    fn host_e_valid(&self, host: usize) -> bool;
    fn drive_host_e(&mut self, host: usize, beat: TlE);
    fn drive_host_e_valid(&mut self, host: usize, valid: bool);
    fn dev_e_valid(&self, device: usize) -> bool;
    fn dev_e_beat(&self, device: usize) -> TlE;
    fn drive_dev_e_ready(&mut self, device: usize, ready: bool);
}

/// Wire glue binding a channel type to its signals. Every channel has exactly
/// one sending side and one receiving side, so the binding is unambiguous.
pub trait ChannelWires: Channel {
    fn send_ready(net: &dyn TlNetwork, pos: usize) -> bool;
    fn send_valid(net: &dyn TlNetwork, pos: usize) -> bool;
    fn drive_beat(net: &mut dyn TlNetwork, pos: usize, beat: Self);
    fn drive_valid(net: &mut dyn TlNetwork, pos: usize, valid: bool);
    fn recv_valid(net: &dyn TlNetwork, pos: usize) -> bool;
    fn recv_beat(net: &dyn TlNetwork, pos: usize) -> Self;
    fn drive_ready(net: &mut dyn TlNetwork, pos: usize, ready: bool);
}

macro_rules! channel_wires {
    ($beat:ty, $ready:ident, $valid:ident, $drive:ident, $drive_valid:ident,
     $recv_valid:ident, $recv_beat:ident, $drive_ready:ident) => {
        impl ChannelWires for $beat {
            fn send_ready(net: &dyn TlNetwork, pos: usize) -> bool {
                net.$ready(pos)
            }
            fn send_valid(net: &dyn TlNetwork, pos: usize) -> bool {
                net.$valid(pos)
            }
            fn drive_beat(net: &mut dyn TlNetwork, pos: usize, beat: Self) {
                net.$drive(pos, beat)
            }
            fn drive_valid(net: &mut dyn TlNetwork, pos: usize, valid: bool) {
                net.$drive_valid(pos, valid)
            }
            fn recv_valid(net: &dyn TlNetwork, pos: usize) -> bool {
                net.$recv_valid(pos)
            }
            fn recv_beat(net: &dyn TlNetwork, pos: usize) -> Self {
                net.$recv_beat(pos)
            }
            fn drive_ready(net: &mut dyn TlNetwork, pos: usize, ready: bool) {
                net.$drive_ready(pos, ready)
            }
        }
    };
}

channel_wires!(TlA, host_a_ready, host_a_valid, drive_host_a, drive_host_a_valid,
               dev_a_valid, dev_a_beat, drive_dev_a_ready);
channel_wires!(TlB, dev_b_ready, dev_b_valid, drive_dev_b, drive_dev_b_valid,
               host_b_valid, host_b_beat, drive_host_b_ready);
channel_wires!(TlC, host_c_ready, host_c_valid, drive_host_c, drive_host_c_valid,
               dev_c_valid, dev_c_beat, drive_dev_c_ready);
channel_wires!(TlD, dev_d_ready, dev_d_valid, drive_dev_d, drive_dev_d_valid,
               host_d_valid, host_d_beat, drive_host_d_ready);
channel_wires!(TlE, host_e_ready, host_e_valid, drive_host_e, drive_host_e_valid,
               dev_e_valid, dev_e_beat, drive_dev_e_ready);

/// The compound transaction ID of an outstanding probe: a device may have one
/// outstanding probe per (source, address) pair. Generated addresses stay
/// below 0x1000 and the routing bits sit above bit 28, which leaves the bits
/// at 16 free for the source.
pub fn probe_id(source: u32, address: u64) -> u64 {
    address + ((source as u64) << 16)
}

/// The sending end of one channel.
pub struct Sender<C: ChannelWires> {
    position: usize,
    width_bytes: u32,
    first_id: u32,
    last_id: u32,
    fifo: bool,

    to_send: VecDeque<TlMessage<C>>,
    patches: VecDeque<C::Patch>,
    ids_in_use: HashSet<u64>,

    /// If we put a beat on the network, was it accepted?
    beat_accepted: bool,
}

impl<C: ChannelWires> Sender<C> {
    fn new(position: usize, cfg: &EndpointConfig) -> Self {
        Self {
            position,
            width_bytes: cfg.data_width / 8,
            first_id: cfg.first_id,
            last_id: cfg.last_id,
            fifo: cfg.fifo,
            to_send: VecDeque::new(),
            patches: VecDeque::new(),
            ids_in_use: HashSet::new(),
            beat_accepted: false,
        }
    }

    pub fn width_bytes(&self) -> u32 {
        self.width_bytes
    }

    /// The largest `size` that still fits in a single beat.
    pub fn beat_size(&self) -> u8 {
        bits_to_size(self.width_bytes * 8)
    }

    /// Queues a change to be applied to the next emitted beat. Each emitted
    /// beat consumes one queued patch; a single patch may modify several
    /// fields, drop the beat, or duplicate it.
    pub fn change_next_beat(&mut self, patch: C::Patch) {
        self.patches.push_back(patch);
    }

    /// Queues a single-beat message.
    pub fn send(&mut self, beat: C) {
        self.to_send
            .push_back(TlMessage::with_beats(beat, self.width_bytes, 1));
    }

    pub fn push_message(&mut self, message: TlMessage<C>) {
        self.to_send.push_back(message);
    }

    pub fn pending_messages(&self) -> usize {
        self.to_send.len()
    }

    pub fn can_start_new_transaction(&self) -> bool {
        self.ids_in_use.len() < (self.last_id - self.first_id + 1) as usize
    }

    pub fn id_available(&self, id: u64) -> bool {
        !self.ids_in_use.contains(&id)
    }

    /// An ID for a new transaction. IDs can be reused, but not before the
    /// previous transaction using them has completed. The ID is not marked
    /// in use until [`Sender::start_transaction`].
    pub fn transaction_id(&self, rng: Option<&mut TlRng>) -> Result<u32, NoAvailableId> {
        if !self.can_start_new_transaction() {
            return Err(NoAvailableId);
        }

        match rng {
            Some(rng) => loop {
                let id = self.first_id + rng.sample(0, (self.last_id - self.first_id) as u64) as u32;
                if self.id_available(id as u64) {
                    return Ok(id);
                }
            },
            None => {
                for id in self.first_id..=self.last_id {
                    if self.id_available(id as u64) {
                        return Ok(id);
                    }
                }
                unreachable!("couldn't find available transaction ID");
            }
        }
    }

    /// Like a transaction ID, but reuse while in flight is acceptable.
    pub fn routing_id(&self, rng: Option<&mut TlRng>) -> u32 {
        match rng {
            Some(rng) => {
                self.first_id + rng.sample(0, (self.last_id - self.first_id) as u64) as u32
            }
            None => self.first_id,
        }
    }

    pub fn start_transaction(&mut self, id: u64) {
        debug!("{}{} starting transaction ID {}", self.position, C::name(), id);
        debug_assert!(self.id_available(id));
        self.ids_in_use.insert(id);
    }

    /// Releases a transaction ID. Returns false (and changes nothing) if the
    /// ID was not in use; the legality monitor reports that separately.
    #[must_use]
    pub fn end_transaction(&mut self, id: u64) -> bool {
        debug!("{}{} ending transaction ID {}", self.position, C::name(), id);
        self.ids_in_use.remove(&id)
    }

    pub fn outstanding_transactions(&self) -> usize {
        self.ids_in_use.len()
    }

    /// A message is no longer valid once it has been accepted.
    pub fn set_flow_control(&mut self, net: &mut dyn TlNetwork) {
        if self.beat_accepted {
            C::drive_valid(net, self.position, false);
        }
        self.beat_accepted = false;
    }

    pub fn get_inputs(&mut self, net: &dyn TlNetwork) {
        if C::send_valid(net, self.position) && C::send_ready(net, self.position) {
            self.beat_accepted = true;
        }
    }

    /// The head of the per-cycle output sequence: handle a still-outstanding
    /// beat (possibly retracting it), clear out finished messages, and
    /// randomly rotate pending responses on non-FIFO endpoints.
    ///
    /// Returns false when an unretracted beat stays on the wire, in which
    /// case nothing further happens on this channel this cycle.
    pub fn begin_outputs(
        &mut self,
        net: &mut dyn TlNetwork,
        rng: &mut TlRng,
        randomise: bool,
        allow_reorder: bool,
    ) -> bool {
        if C::send_valid(net, self.position) {
            debug_assert!(!self.to_send.is_empty());

            // Randomly remove the beat from the channel.
            if randomise && rng.chance(0.2) {
                C::drive_valid(net, self.position, false);
                if let Some(front) = self.to_send.front_mut() {
                    front.unsend();
                }
                debug!("{}{} retracted last beat", self.position, C::name());
            } else {
                return false;
            }
        }

        // Clear out completed messages.
        if self.to_send.front().is_some_and(|m| m.finished()) {
            self.to_send.pop_front();
        }

        if !self.fifo && allow_reorder && randomise && rng.chance(0.5) {
            self.rotate_responses();
        }

        true
    }

    /// Moves the front response to the back of the queue. Only safe when
    /// neither end of the queue is a partially-sent message.
    fn rotate_responses(&mut self) {
        if self.to_send.len() >= 2
            && !self.to_send.front().is_some_and(|m| m.in_progress())
            && !self.to_send.back().is_some_and(|m| m.in_progress())
        {
            let front = self.to_send.pop_front().unwrap();
            self.to_send.push_back(front);
        }
    }

    /// Emits the next beat of the head message, if any. Randomized runs
    /// occasionally skip a cycle.
    pub fn emit(&mut self, net: &mut dyn TlNetwork, rng: &mut TlRng, randomise: bool) {
        if self.to_send.is_empty() || (randomise && rng.chance(0.2)) {
            return;
        }

        let message = self.to_send.front_mut().unwrap();
        let mut beat = message.next_beat(if randomise { Some(rng) } else { None });

        // Apply any queued modification; used to force the network into
        // particular states.
        let mut drop_beat = false;
        if let Some(patch) = self.patches.pop_front() {
            beat = C::patched(beat, &patch);
            if C::patch_duplicates(&patch) {
                message.unsend();
            }
            drop_beat = C::patch_drops(&patch);
        }

        if !drop_beat {
            debug!(
                "{}{} sent {}/{} {}",
                self.position,
                C::name(),
                message.current_beat(),
                message.total_beats(),
                beat
            );
            C::drive_beat(net, self.position, beat);
            C::drive_valid(net, self.position, true);
        }
    }
}

/// The receiving end of one channel.
pub struct Receiver<C: ChannelWires> {
    position: usize,
    width_bytes: u32,
    ready: bool,
    /// Beats left in the data burst currently arriving, if any. Messages on
    /// one channel never interleave, so a single counter suffices.
    beats_remaining: u32,
    _channel: std::marker::PhantomData<C>,
}

impl<C: ChannelWires> Receiver<C> {
    fn new(position: usize, cfg: &EndpointConfig) -> Self {
        Self {
            position,
            width_bytes: cfg.data_width / 8,
            ready: true,
            beats_remaining: 0,
            _channel: std::marker::PhantomData,
        }
    }

    pub fn set_flow_control(&mut self, net: &mut dyn TlNetwork) {
        C::drive_ready(net, self.position, self.ready);
    }

    /// The beat on the wire this cycle, if one is present and we announced
    /// ready.
    pub fn sample(&mut self, net: &dyn TlNetwork) -> Option<C> {
        if C::recv_valid(net, self.position) && self.ready {
            let beat = C::recv_beat(net, self.position);
            debug!("{}{} received {}", self.position, C::name(), beat);
            Some(beat)
        } else {
            None
        }
    }

    /// Decide whether to stall the next cycle. This cycle's `ready` was
    /// already announced, so stalling can only start a cycle later.
    pub fn roll_stall(&mut self, rng: &mut TlRng, randomise: bool) {
        self.ready = !randomise || rng.chance(0.8);
    }

    pub fn force_ready(&mut self) {
        self.ready = true;
    }

    /// Tracks a data-burst beat. The counter initialises from the message
    /// size on the first beat.
    pub fn new_beat_arrived(&mut self, size: u8) {
        if self.beats_remaining == 0 {
            self.beats_remaining = num_beats(true, size, self.width_bytes);
        }
        self.beats_remaining -= 1;
    }

    pub fn all_beats_arrived(&self) -> bool {
        self.beats_remaining == 0
    }
}

/// Static description of every endpoint on the network, used by traffic
/// generators to pick partners and compute addresses without reaching into
/// the peer models themselves.
#[derive(Clone, Debug)]
pub struct Topology {
    pub hosts: Vec<EndpointConfig>,
    pub devices: Vec<EndpointConfig>,
}

impl Topology {
    pub fn from_config(config: &TlConfig) -> Self {
        Self {
            hosts: config.hosts.clone(),
            devices: config.devices.clone(),
        }
    }

    /// The address of `offset` within `device`'s region. This needs to match
    /// the routing tables of the network under test.
    pub fn device_address(&self, offset: u64, device: usize) -> u64 {
        offset + device as u64 * 0x1000_0000
    }

    pub fn random_device(&self, rng: &mut TlRng, min_protocol: TlProtocol) -> Option<usize> {
        self.random_endpoint(&self.devices, rng, min_protocol)
    }

    pub fn random_host(&self, rng: &mut TlRng, min_protocol: TlProtocol) -> Option<usize> {
        self.random_endpoint(&self.hosts, rng, min_protocol)
    }

    fn random_endpoint(
        &self,
        list: &[EndpointConfig],
        rng: &mut TlRng,
        min_protocol: TlProtocol,
    ) -> Option<usize> {
        if !list.iter().any(|e| e.protocol >= min_protocol) {
            return None;
        }
        loop {
            let pick = rng.sample(0, list.len() as u64 - 1) as usize;
            if list[pick].protocol >= min_protocol {
                return Some(pick);
            }
        }
    }

    /// Positions of all coherent hosts, in order. Probes broadcast to these.
    pub fn coherent_hosts(&self) -> impl Iterator<Item = usize> + '_ {
        self.hosts
            .iter()
            .enumerate()
            .filter(|(_, cfg)| cfg.protocol.is_coherent())
            .map(|(i, _)| i)
    }
}

/// A host endpoint: sends A/C/E, receives B/D.
pub struct HostEndpoint {
    pub position: usize,
    pub config: EndpointConfig,

    pub a: Sender<TlA>,
    pub b: Receiver<TlB>,
    pub c: Sender<TlC>,
    pub d: Receiver<TlD>,
    pub e: Sender<TlE>,

    /// Probes waiting for a C response.
    pending_b: VecDeque<(bool, TlB)>,
    /// Grants waiting for an E acknowledgement.
    pending_d: VecDeque<(bool, TlD)>,
}

impl HostEndpoint {
    pub fn new(position: usize, config: EndpointConfig) -> Self {
        Self {
            a: Sender::new(position, &config),
            b: Receiver::new(position, &config),
            c: Sender::new(position, &config),
            d: Receiver::new(position, &config),
            e: Sender::new(position, &config),
            pending_b: VecDeque::new(),
            pending_d: VecDeque::new(),
            position,
            config,
        }
    }

    pub fn set_flow_control(&mut self, net: &mut dyn TlNetwork) {
        self.a.set_flow_control(net);
        self.b.set_flow_control(net);
        self.c.set_flow_control(net);
        self.d.set_flow_control(net);
        self.e.set_flow_control(net);
    }

    pub fn get_inputs(&mut self, net: &dyn TlNetwork, rng: &mut TlRng, randomise: bool) {
        self.a.get_inputs(net);
        self.c.get_inputs(net);
        self.e.get_inputs(net);

        if let Some(beat) = self.b.sample(net) {
            self.handle_b(randomise, beat);
        }
        if let Some(beat) = self.d.sample(net) {
            self.handle_d(randomise, beat);
        }

        self.b.roll_stall(rng, randomise);
        self.d.roll_stall(rng, randomise);
    }

    fn handle_b(&mut self, randomise: bool, beat: TlB) {
        // Only probes can arrive: forwarded A requests are unsupported.
        match beat.opcode {
            BOpcode::ProbeBlock | BOpcode::ProbePerm => {
                self.pending_b.push_back((randomise, beat));
            }
        }
    }

    fn handle_d(&mut self, randomise: bool, beat: TlD) {
        let source = beat.source as u64;
        match beat.opcode {
            DOpcode::AccessAck | DOpcode::HintAck => {
                self.release_a_transaction(source);
            }
            DOpcode::AccessAckData => {
                self.d.new_beat_arrived(beat.size);
                if self.d.all_beats_arrived() {
                    self.release_a_transaction(source);
                }
            }
            DOpcode::ReleaseAck => {
                if !self.c.end_transaction(source) {
                    warn!("host {}: ReleaseAck for idle source {}", self.position, source);
                }
            }
            DOpcode::Grant => {
                self.release_a_transaction(source);
                self.pending_d.push_back((randomise, beat));
            }
            DOpcode::GrantData => {
                self.d.new_beat_arrived(beat.size);
                // Acknowledge only when the full message has arrived.
                if self.d.all_beats_arrived() {
                    self.release_a_transaction(source);
                    self.pending_d.push_back((randomise, beat));
                }
            }
        }
    }

    fn release_a_transaction(&mut self, source: u64) {
        if !self.a.end_transaction(source) {
            warn!(
                "host {}: response for idle source {}",
                self.position, source
            );
        }
    }

    pub fn set_outputs(
        &mut self,
        net: &mut dyn TlNetwork,
        topo: &Topology,
        rng: &mut TlRng,
        randomise: bool,
    ) {
        // Randomly inject new requests.
        if randomise {
            if rng.chance(0.1) {
                self.queue_a_request(topo, rng, true, &APatch::default());
            }
            if rng.chance(0.1) {
                self.queue_c_request(topo, rng, true, &CPatch::default());
            }
        }

        if self.a.begin_outputs(net, rng, randomise, true) {
            self.a.emit(net, rng, randomise);
        }

        if self.c.begin_outputs(net, rng, randomise, true) {
            if !randomise || rng.chance(0.8) {
                self.respond_c(rng, randomise);
            }
            self.c.emit(net, rng, randomise);
        }

        if self.e.begin_outputs(net, rng, randomise, true) {
            if !randomise || rng.chance(0.8) {
                self.respond_e();
            }
            self.e.emit(net, rng, randomise);
        }
    }

    /// A fresh A request. Deterministic requests are a full-width write of a
    /// recognisable payload to device 0.
    pub fn new_a_request(
        &self,
        topo: &Topology,
        rng: &mut TlRng,
        randomise: bool,
    ) -> Result<TlA, NoAvailableId> {
        if randomise {
            let device = topo
                .random_device(rng, TlProtocol::Ul)
                .expect("no devices configured");
            let protocol = self.config.protocol.common(topo.devices[device].protocol);

            let opcode = rng.a_opcode(protocol);
            let param = match opcode {
                AOpcode::ArithmeticData => rng.arithmetic_param(),
                AOpcode::LogicalData => rng.logical_param(),
                AOpcode::Intent => rng.intent_param(),
                AOpcode::AcquireBlock | AOpcode::AcquirePerm => rng.grow_permission(),
                _ => 0,
            };

            let size = rng.sample(0, 5) as u8; // 1 byte to 32 bytes
            let source = self.a.transaction_id(Some(&mut *rng))?;

            let raw_address = rng.sample(0, 0x1000 - 1);
            let address = topo.device_address(align(raw_address, 1 << size), device);

            let mut mask = complete_mask(address, 1 << size, self.a.width_bytes() as u64);
            if opcode == AOpcode::PutPartialData {
                mask &= rng.bits64();
            }

            let (corrupt, data) = if opcode.has_payload() {
                (rng.chance(0.05), align(rng.sample(0, 0x7FFF_FFFF), 160))
            } else {
                (false, 0)
            };

            Ok(TlA {
                opcode,
                param,
                size,
                source,
                address,
                mask,
                corrupt,
                data,
            })
        } else {
            let size = self.a.beat_size();
            Ok(TlA {
                opcode: AOpcode::PutFullData,
                param: 0,
                size,
                source: self.a.transaction_id(None)?,
                address: topo.device_address(0x3000, 0),
                mask: full_mask(size),
                corrupt: false,
                data: 0xDEADBEEF_CAFEF00D,
            })
        }
    }

    /// Creates and enqueues a new A request; `patch` can force fields to
    /// particular values. Silently does nothing when the ID pool is empty.
    pub fn queue_a_request(
        &mut self,
        topo: &Topology,
        rng: &mut TlRng,
        randomise: bool,
        patch: &APatch,
    ) {
        let Ok(request) = self.new_a_request(topo, rng, randomise) else {
            return;
        };
        let request = TlA::patched(request, patch);

        let beats = num_beats(
            request.opcode.has_payload(),
            request.size,
            self.a.width_bytes(),
        );
        self.a
            .push_message(TlMessage::with_beats(request, self.a.width_bytes(), beats));
        self.a.start_transaction(request.source as u64);
    }

    /// A fresh C request. Only Release(Data) can happen without a preceding
    /// probe.
    pub fn new_c_request(
        &self,
        topo: &Topology,
        rng: &mut TlRng,
        randomise: bool,
    ) -> Result<TlC, NoAvailableId> {
        if randomise {
            let device = topo
                .random_device(rng, TlProtocol::C)
                .ok_or(NoAvailableId)?;

            let opcode = rng.c_request_opcode(self.config.protocol);
            let param = rng.shrink_permission();
            let size = rng.sample(0, 5) as u8;
            let source = self.c.transaction_id(Some(&mut *rng))?;

            let raw_address = rng.sample(0, 0x1000 - 1);
            let address = topo.device_address(align(raw_address, 1 << size), device);

            let (corrupt, data) = if opcode.has_payload() {
                (rng.chance(0.05), align(rng.sample(0, 0x7FFF_FFFF), 160))
            } else {
                (false, 0)
            };

            Ok(TlC {
                opcode,
                param,
                size,
                source,
                address,
                corrupt,
                data,
            })
        } else {
            Ok(TlC {
                opcode: COpcode::Release,
                param: 0,
                size: self.c.beat_size(),
                source: self.c.transaction_id(None)?,
                address: topo.device_address(0x3000, 0),
                corrupt: false,
                data: 0xDEADBEEF_CAFEF00D,
            })
        }
    }

    /// Creates and enqueues a new C request (coherent hosts only).
    pub fn queue_c_request(
        &mut self,
        topo: &Topology,
        rng: &mut TlRng,
        randomise: bool,
        patch: &CPatch,
    ) {
        if !self.config.protocol.is_coherent() {
            return;
        }
        let Ok(request) = self.new_c_request(topo, rng, randomise) else {
            return;
        };
        let request = TlC::patched(request, patch);

        let beats = num_beats(
            request.opcode.has_payload(),
            request.size,
            self.c.width_bytes(),
        );
        self.c
            .push_message(TlMessage::with_beats(request, self.c.width_bytes(), beats));
        if request.opcode.requires_response() {
            self.c.start_transaction(request.source as u64);
        }
    }

    /// The C response to a probe.
    pub fn new_c_response(&self, rng: &mut TlRng, randomise: bool, request: &TlB) -> TlC {
        let mut opcode = COpcode::ProbeAck;
        let mut param = 0;
        let (mut corrupt, mut data) = (false, 0);

        if randomise {
            // 20% chance of writing back data.
            if request.opcode == BOpcode::ProbeBlock && rng.chance(0.2) {
                opcode = COpcode::ProbeAckData;
            }
            // Note: not checking that this matches the probe's request.
            param = rng.shrink_permission();
            if opcode.has_payload() {
                corrupt = rng.chance(0.05);
                data = align(rng.sample(0, 0x7FFF_FFFF), 160);
            }
        }

        TlC {
            opcode,
            param,
            size: request.size,
            source: request.source,
            address: request.address,
            corrupt,
            data,
        }
    }

    fn respond_c(&mut self, rng: &mut TlRng, randomise: bool) {
        debug_assert!(self.pending_b.is_empty() || self.config.protocol.is_coherent());

        while let Some((req_randomise, request)) = self.pending_b.pop_front() {
            let randomise = randomise && req_randomise;
            let response = self.new_c_response(rng, randomise, &request);

            let beats = num_beats(
                response.opcode.has_payload(),
                request.size,
                self.c.width_bytes(),
            );
            self.c
                .push_message(TlMessage::with_beats(response, self.c.width_bytes(), beats));
        }
    }

    fn respond_e(&mut self) {
        while let Some((_, request)) = self.pending_d.pop_front() {
            // The only possible response is a grant acknowledgement.
            self.e.send(TlE { sink: request.sink });
        }
    }
}

/// A device endpoint: receives A/C/E, sends B/D.
pub struct DeviceEndpoint {
    pub position: usize,
    pub config: EndpointConfig,

    pub a: Receiver<TlA>,
    pub b: Sender<TlB>,
    pub c: Receiver<TlC>,
    pub d: Sender<TlD>,
    pub e: Receiver<TlE>,

    /// Acquires waiting for probe broadcast.
    pending_probe: VecDeque<(bool, TlA)>,
    /// A requests waiting for a D response.
    pending_a: VecDeque<(bool, TlA)>,
    /// C releases waiting for a D response.
    pending_c: VecDeque<(bool, TlC)>,

    /// When responding beat-by-beat to an arithmetic/logical burst, no other
    /// response may be created until the remaining beats have been handled.
    arith_beats_left: u32,
    arith_source: u32,
}

impl DeviceEndpoint {
    pub fn new(position: usize, config: EndpointConfig) -> Self {
        Self {
            a: Receiver::new(position, &config),
            b: Sender::new(position, &config),
            c: Receiver::new(position, &config),
            d: Sender::new(position, &config),
            e: Receiver::new(position, &config),
            pending_probe: VecDeque::new(),
            pending_a: VecDeque::new(),
            pending_c: VecDeque::new(),
            arith_beats_left: 0,
            arith_source: 0,
            position,
            config,
        }
    }

    pub fn set_flow_control(&mut self, net: &mut dyn TlNetwork) {
        self.a.set_flow_control(net);
        self.b.set_flow_control(net);
        self.c.set_flow_control(net);
        self.d.set_flow_control(net);
        self.e.set_flow_control(net);
    }

    pub fn get_inputs(&mut self, net: &dyn TlNetwork, rng: &mut TlRng, randomise: bool) {
        self.b.get_inputs(net);
        self.d.get_inputs(net);

        if let Some(beat) = self.a.sample(net) {
            self.handle_a(randomise, beat);
        }
        if let Some(beat) = self.c.sample(net) {
            self.handle_c(randomise, beat);
        }
        if let Some(beat) = self.e.sample(net) {
            if !self.d.end_transaction(beat.sink as u64) {
                warn!(
                    "device {}: grant-ack for idle sink {}",
                    self.position, beat.sink
                );
            }
        }

        self.a.roll_stall(rng, randomise);
        self.c.roll_stall(rng, randomise);
        self.e.roll_stall(rng, randomise);
    }

    fn handle_a(&mut self, randomise: bool, beat: TlA) {
        match beat.opcode {
            AOpcode::PutFullData | AOpcode::PutPartialData => {
                self.a.new_beat_arrived(beat.size);
                // Create the response only when the full message has arrived.
                if self.a.all_beats_arrived() {
                    self.pending_a.push_back((randomise, beat));
                }
            }
            AOpcode::ArithmeticData | AOpcode::LogicalData | AOpcode::Get | AOpcode::Intent => {
                self.pending_a.push_back((randomise, beat));
            }
            AOpcode::AcquireBlock | AOpcode::AcquirePerm => {
                self.pending_probe.push_back((randomise, beat));
                // The D response should strictly wait for the probes to
                // complete, but that doesn't matter for this simulation.
                self.pending_a.push_back((randomise, beat));
            }
        }
    }

    fn handle_c(&mut self, randomise: bool, beat: TlC) {
        match beat.opcode {
            COpcode::ProbeAck => {
                self.release_probe(beat.source, beat.address);
            }
            COpcode::ProbeAckData => {
                self.c.new_beat_arrived(beat.size);
                if self.c.all_beats_arrived() {
                    let first_beat_addr = align(beat.address, 1 << beat.size);
                    self.release_probe(beat.source, first_beat_addr);
                }
            }
            COpcode::Release => {
                self.pending_c.push_back((randomise, beat));
            }
            COpcode::ReleaseData => {
                self.c.new_beat_arrived(beat.size);
                // Create the response only when the full message has arrived.
                if self.c.all_beats_arrived() {
                    self.pending_c.push_back((randomise, beat));
                }
            }
        }
    }

    fn release_probe(&mut self, source: u32, address: u64) {
        if !self.b.end_transaction(probe_id(source, address)) {
            warn!(
                "device {}: probe-ack for idle probe (source {}, address {:#x})",
                self.position, source, address
            );
        }
    }

    pub fn set_outputs(
        &mut self,
        net: &mut dyn TlNetwork,
        topo: &Topology,
        rng: &mut TlRng,
        randomise: bool,
    ) {
        // Randomly inject new probe requests.
        if randomise && rng.chance(0.05) {
            self.queue_b_request(topo, rng, true, &BPatch::default());
        }

        if self.b.begin_outputs(net, rng, randomise, true) {
            if !randomise || rng.chance(0.8) {
                self.respond_b(topo, rng);
            }
            self.b.emit(net, rng, randomise);
        }

        let allow_reorder = self.arith_beats_left == 0;
        if self.d.begin_outputs(net, rng, randomise, allow_reorder) {
            if !randomise || rng.chance(0.8) {
                self.respond_d(rng, randomise);
            }
            self.d.emit(net, rng, randomise);
        }
    }

    /// The D response to an A request. May fail when a sink ID is needed and
    /// none is free.
    pub fn new_d_response(
        &self,
        rng: &mut TlRng,
        randomise: bool,
        request: &TlA,
    ) -> Result<TlD, NoAvailableId> {
        let mut opcode = match request.opcode {
            AOpcode::PutFullData | AOpcode::PutPartialData => DOpcode::AccessAck,
            AOpcode::ArithmeticData | AOpcode::LogicalData | AOpcode::Get => DOpcode::AccessAckData,
            AOpcode::Intent => DOpcode::HintAck,
            AOpcode::AcquireBlock | AOpcode::AcquirePerm => DOpcode::Grant,
        };

        // The sink field only matters when we expect an acknowledgement.
        let sink = if opcode.requires_response() {
            self.d.transaction_id(randomise.then_some(&mut *rng))?
        } else {
            self.d.routing_id(randomise.then_some(&mut *rng))
        };

        let (param, denied, corrupt, data);
        if randomise {
            // Should be determined by request.param, but randomising for now.
            if request.opcode == AOpcode::AcquireBlock && rng.chance(0.2) {
                opcode = DOpcode::GrantData;
            }

            param = match opcode {
                DOpcode::Grant | DOpcode::GrantData => rng.cap_permission(),
                _ => 0,
            };
            denied = self.config.can_deny && rng.chance(0.1);
            corrupt = opcode.has_payload() && (denied || rng.chance(0.1));
            data = align(rng.sample(0, 0x7FFF_FFFF), 160);
        } else {
            param = 0;
            denied = false;
            corrupt = false;
            data = 0xDEADBEEF_CAFEF00D;
        }

        Ok(TlD {
            opcode,
            param,
            size: request.size,
            source: request.source,
            sink,
            denied,
            corrupt,
            data,
        })
    }

    /// The D response to a C release.
    pub fn new_d_release_ack(&self, rng: &mut TlRng, randomise: bool, request: &TlC) -> TlD {
        debug_assert!(request.opcode.requires_response());
        TlD {
            opcode: DOpcode::ReleaseAck,
            param: 0,
            size: request.size,
            source: request.source,
            sink: self.d.routing_id(randomise.then_some(&mut *rng)),
            denied: false,
            corrupt: false,
            data: 0,
        }
    }

    fn respond_d(&mut self, rng: &mut TlRng, randomise: bool) {
        // Try to respond to all pending requests. This may fail if we run
        // out of unique transaction IDs; failed requests return to the queue
        // for next cycle.
        let num_a = self.pending_a.len();
        for _ in 0..num_a {
            let (req_randomise, request) = self.pending_a.pop_front().unwrap();

            // While an arithmetic/logical burst is being answered beat by
            // beat, only its own continuation beats may produce responses.
            let is_arith = matches!(
                request.opcode,
                AOpcode::ArithmeticData | AOpcode::LogicalData
            );
            if self.arith_beats_left > 0 && !(is_arith && request.source == self.arith_source) {
                self.pending_a.push_back((req_randomise, request));
                continue;
            }

            match self.respond_to_a(rng, randomise && req_randomise, &request) {
                Ok(()) => {}
                Err(NoAvailableId) => self.pending_a.push_back((req_randomise, request)),
            }
        }

        // Release acknowledgements wait while an arithmetic/logical stream
        // still owns the output.
        if self.arith_beats_left == 0 {
            let num_c = self.pending_c.len();
            for _ in 0..num_c {
                let (req_randomise, request) = self.pending_c.pop_front().unwrap();
                let response = self.new_d_release_ack(rng, randomise && req_randomise, &request);
                // Only possible response is ReleaseAck, which is a single beat.
                self.d.send(response);
            }
        }
    }

    fn respond_to_a(
        &mut self,
        rng: &mut TlRng,
        randomise: bool,
        request: &TlA,
    ) -> Result<(), NoAvailableId> {
        let response = self.new_d_response(rng, randomise, request)?;

        // Arithmetic and logical responses carry data, but so do their
        // requests: a single response beat answers each request beat rather
        // than waiting for the whole request.
        let multibeat = response.opcode.has_payload() && !request.opcode.has_payload();
        if multibeat {
            let beats = num_beats(true, request.size, self.d.width_bytes());
            self.d
                .push_message(TlMessage::with_beats(response, self.d.width_bytes(), beats));
        } else {
            self.d.send(response);
        }

        if matches!(
            request.opcode,
            AOpcode::ArithmeticData | AOpcode::LogicalData
        ) {
            if self.arith_beats_left == 0 {
                self.arith_beats_left = num_beats(true, request.size, self.d.width_bytes());
                self.arith_source = request.source;
            }
            self.arith_beats_left -= 1;
        }

        if response.opcode.requires_response() {
            self.d.start_transaction(response.sink as u64);
        }
        Ok(())
    }

    /// The probe generated for an acquire.
    pub fn new_b_response(&self, rng: &mut TlRng, randomise: bool, request: &TlA) -> TlB {
        let opcode = match request.opcode {
            AOpcode::AcquireBlock => BOpcode::ProbeBlock,
            AOpcode::AcquirePerm => BOpcode::ProbePerm,
            _ => unreachable!("unsupported A opcode for probe"),
        };

        TlB {
            opcode,
            param: if randomise { rng.cap_permission() } else { 0 },
            size: request.size,
            source: 0, // set per recipient host
            address: request.address,
        }
    }

    fn respond_b(&mut self, topo: &Topology, rng: &mut TlRng) {
        debug_assert!(self.pending_probe.is_empty() || self.config.protocol.is_coherent());

        let num_requests = self.pending_probe.len();
        for _ in 0..num_requests {
            let (req_randomise, request) = self.pending_probe.pop_front().unwrap();
            let response = self.new_b_response(rng, req_randomise, &request);

            match self.broadcast_probe(topo, rng, req_randomise, response) {
                Ok(()) => {}
                Err(NoAvailableId) => self.pending_probe.push_back((req_randomise, request)),
            }
        }
    }

    /// Sends a probe to every coherent host. Should exclude the host that
    /// triggered it, but that doesn't hurt this simulation.
    fn broadcast_probe(
        &mut self,
        topo: &Topology,
        rng: &mut TlRng,
        randomise: bool,
        template: TlB,
    ) -> Result<(), NoAvailableId> {
        // Pick each recipient's source ID up front so a mid-broadcast ID
        // clash doesn't leave a partial broadcast behind.
        let mut probes = Vec::new();
        for host in topo.coherent_hosts() {
            let cfg = &topo.hosts[host];
            let source = if randomise {
                cfg.first_id + rng.sample(0, (cfg.last_id - cfg.first_id) as u64) as u32
            } else {
                cfg.first_id
            };

            let mut probe = template;
            probe.source = source;

            if !self.b.id_available(probe_id(probe.source, probe.address)) {
                return Err(NoAvailableId);
            }
            probes.push(probe);
        }

        for probe in probes {
            // All supported B messages contain a single beat.
            self.b.start_transaction(probe_id(probe.source, probe.address));
            self.b.send(probe);
        }
        Ok(())
    }

    /// Creates and broadcasts a spontaneous probe (coherent devices only).
    pub fn queue_b_request(
        &mut self,
        topo: &Topology,
        rng: &mut TlRng,
        randomise: bool,
        patch: &BPatch,
    ) {
        if !self.config.protocol.is_coherent() || !self.b.can_start_new_transaction() {
            return;
        }

        let Some(host) = (if randomise {
            topo.random_host(rng, TlProtocol::C)
        } else {
            topo.coherent_hosts().next()
        }) else {
            return;
        };
        let host_cfg = &topo.hosts[host];

        // Probe addresses sit in this device's own routed region so the
        // eventual C response finds its way back here.
        let request = if randomise {
            let opcode = rng.b_opcode();
            let size = rng.sample(0, 5) as u8;
            let source = host_cfg.first_id
                + rng.sample(0, (host_cfg.last_id - host_cfg.first_id) as u64) as u32;

            // Can't reuse an address/source combination that's already in
            // use, so generate addresses until an unused one is found.
            let address = loop {
                let raw = rng.sample(0, 0x1000 - 1);
                let address = topo.device_address(align(raw, 1 << size), self.position);
                if self.b.id_available(probe_id(source, address)) {
                    break address;
                }
            };

            TlB {
                opcode,
                param: rng.cap_permission(),
                size,
                source,
                address,
            }
        } else {
            let size = self.b.beat_size();
            let source = host_cfg.first_id;

            // If this address/source combination is in use, try the next one.
            let mut address = topo.device_address(0x3000, self.position);
            while !self.b.id_available(probe_id(source, address)) {
                address += self.b.width_bytes() as u64;
            }

            TlB {
                opcode: BOpcode::ProbeBlock,
                param: 0,
                size,
                source,
                address,
            }
        };
        let request = TlB::patched(request, patch);

        let _ = self.broadcast_probe(topo, rng, randomise, request);
    }
}
