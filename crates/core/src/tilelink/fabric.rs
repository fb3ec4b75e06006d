//! Signal-level crossbar emulation of the network under test.
//!
//! Stands in for the interconnect netlist when the testbench runs
//! standalone: combinational address/ID routing between host and device
//! ports, ready/valid flow control, and per-destination burst locking so a
//! multi-beat message is never interleaved with another message on the same
//! channel end.
//!
//! Timing model: `eval` recomputes the routing from the currently driven
//! signals (idempotent, like a netlist evaluation); `commit` is called once
//! per cycle and registers the handshakes that complete, feeding every
//! accepted beat to the legality monitor.

use crate::tilelink::config::{EndpointConfig, TlConfig};
use crate::tilelink::endpoint::TlNetwork;
use crate::tilelink::monitor::TlMonitor;
use crate::tilelink::protocol::{num_beats, TlA, TlB, TlC, TlD, TlE};

/// A sender-driven input port: the fabric computes `ready`.
#[derive(Clone, Copy, Debug, Default)]
struct InPort<T> {
    valid: bool,
    beat: T,
    ready: bool,
}

/// A fabric-driven output port: the receiver drives `ready`.
#[derive(Clone, Copy, Debug, Default)]
struct OutPort<T> {
    valid: bool,
    beat: T,
    ready: bool,
}

/// Arbitration lock while a burst crosses a destination port.
#[derive(Clone, Copy, Debug)]
struct BurstLock {
    source_port: usize,
    beats_left: u32,
}

/// One channel's worth of crossbar: all input ports, all output ports, and
/// the per-destination arbitration state.
struct ChannelXbar<T> {
    ins: Vec<InPort<T>>,
    outs: Vec<OutPort<T>>,
    locks: Vec<Option<BurstLock>>,
    /// Input selected for each output during the last `eval`.
    selected: Vec<Option<usize>>,
}

impl<T: Copy + Default> ChannelXbar<T> {
    fn new(num_in: usize, num_out: usize) -> Self {
        Self {
            ins: vec![InPort::default(); num_in],
            outs: vec![OutPort::default(); num_out],
            locks: vec![None; num_out],
            selected: vec![None; num_out],
        }
    }

    /// Recomputes outputs from inputs. `route` maps a beat to its
    /// destination port.
    fn eval(&mut self, route: impl Fn(&T) -> Option<usize>) {
        for port in &mut self.ins {
            port.ready = false;
        }
        for port in &mut self.outs {
            port.valid = false;
        }

        for dest in 0..self.outs.len() {
            // A destination in the middle of a burst only listens to the
            // locked input; otherwise lowest valid input wins.
            let chosen = match self.locks[dest] {
                Some(lock) => self.ins[lock.source_port]
                    .valid
                    .then_some(lock.source_port)
                    .filter(|src| route(&self.ins[*src].beat) == Some(dest)),
                None => (0..self.ins.len())
                    .find(|src| self.ins[*src].valid && route(&self.ins[*src].beat) == Some(dest)),
            };

            self.selected[dest] = chosen;
            if let Some(src) = chosen {
                self.outs[dest].valid = true;
                self.outs[dest].beat = self.ins[src].beat;
                self.ins[src].ready = self.outs[dest].ready;
            }
        }
    }

    /// Registers this cycle's completed handshakes. `beats` gives the total
    /// beat count of the message a beat belongs to at a destination port;
    /// `observe` sees every accepted beat together with its source and
    /// destination ports.
    fn commit(
        &mut self,
        beats: impl Fn(usize, &T) -> u32,
        mut observe: impl FnMut(usize, usize, &T),
    ) {
        for dest in 0..self.outs.len() {
            let (Some(src), out) = (self.selected[dest], &self.outs[dest]) else {
                continue;
            };
            if !(out.valid && out.ready) {
                continue;
            }

            observe(src, dest, &out.beat);

            match &mut self.locks[dest] {
                Some(lock) => {
                    lock.beats_left -= 1;
                    if lock.beats_left == 0 {
                        self.locks[dest] = None;
                    }
                }
                None => {
                    let total = beats(dest, &out.beat);
                    if total > 1 {
                        self.locks[dest] = Some(BurstLock {
                            source_port: src,
                            beats_left: total - 1,
                        });
                    }
                }
            }
        }
    }
}

/// Address decode entry: `address & !mask == base` routes to `target`.
#[derive(Clone, Copy, Debug)]
struct AddressRange {
    base: u64,
    mask: u64,
    target: usize,
}

/// The emulated interconnect.
pub struct CrossbarFabric {
    a: ChannelXbar<TlA>,
    b: ChannelXbar<TlB>,
    c: ChannelXbar<TlC>,
    d: ChannelXbar<TlD>,
    e: ChannelXbar<TlE>,

    address_map: Vec<AddressRange>,
    host_ids: Vec<(u32, u32)>,
    device_ids: Vec<(u32, u32)>,
    host_widths: Vec<u32>,
    device_widths: Vec<u32>,
}

impl CrossbarFabric {
    pub fn new(config: &TlConfig) -> Self {
        let num_hosts = config.hosts.len();
        let num_devices = config.devices.len();

        Self {
            a: ChannelXbar::new(num_hosts, num_devices),
            b: ChannelXbar::new(num_devices, num_hosts),
            c: ChannelXbar::new(num_hosts, num_devices),
            d: ChannelXbar::new(num_devices, num_hosts),
            e: ChannelXbar::new(num_hosts, num_devices),
            address_map: Self::build_address_map(config),
            host_ids: config.hosts.iter().map(id_range).collect(),
            device_ids: config.devices.iter().map(id_range).collect(),
            host_widths: config.hosts.iter().map(|c| c.data_width / 8).collect(),
            device_widths: config.devices.iter().map(|c| c.data_width / 8).collect(),
        }
    }

    /// Routing entries come from the configuration when present; otherwise
    /// each device owns a 256MB-aligned window at `device * 0x1000_0000`.
    fn build_address_map(config: &TlConfig) -> Vec<AddressRange> {
        let mut map = Vec::new();

        for host in &config.hosts {
            for ((base, mask), target) in host
                .bases
                .iter()
                .zip(&host.masks)
                .zip(&host.targets)
            {
                map.push(AddressRange {
                    base: *base,
                    mask: *mask,
                    target: *target as usize,
                });
            }
            if !map.is_empty() {
                break;
            }
        }

        if map.is_empty() {
            for device in 0..config.devices.len() {
                map.push(AddressRange {
                    base: device as u64 * 0x1000_0000,
                    mask: 0x0FFF_FFFF,
                    target: device,
                });
            }
        }

        map
    }

    fn route_address(map: &[AddressRange], num_devices: usize, address: u64) -> Option<usize> {
        map.iter()
            .find(|range| address & !range.mask == range.base)
            .map(|range| range.target)
            .filter(|target| *target < num_devices)
    }

    fn route_id(ranges: &[(u32, u32)], id: u32) -> Option<usize> {
        ranges
            .iter()
            .position(|(first, last)| (*first..=*last).contains(&id))
    }

    /// Combinational routing pass, equivalent to a netlist `eval()`.
    pub fn eval(&mut self) {
        let map = &self.address_map;
        let num_devices = self.device_ids.len();
        let host_ids = &self.host_ids;
        let device_ids = &self.device_ids;

        self.a
            .eval(|beat: &TlA| Self::route_address(map, num_devices, beat.address));
        self.c
            .eval(|beat: &TlC| Self::route_address(map, num_devices, beat.address));
        self.b.eval(|beat: &TlB| Self::route_id(host_ids, beat.source));
        self.d.eval(|beat: &TlD| Self::route_id(host_ids, beat.source));
        self.e.eval(|beat: &TlE| Self::route_id(device_ids, beat.sink));
    }

    /// Registers this cycle's completed transfers with the monitor and
    /// advances burst arbitration.
    pub fn commit(&mut self, monitor: &mut TlMonitor) {
        let device_widths = &self.device_widths;
        let host_widths = &self.host_widths;

        self.a.commit(
            |dest, beat| num_beats(beat.opcode.has_payload(), beat.size, device_widths[dest]),
            |_src, dest, beat| monitor.observe_a(dest, beat),
        );
        self.b.commit(
            |_, _| 1,
            |src, dest, beat| monitor.observe_b(dest, src, beat),
        );
        self.c.commit(
            |dest, beat| num_beats(beat.opcode.has_payload(), beat.size, device_widths[dest]),
            |_src, dest, beat| monitor.observe_c(dest, beat),
        );
        self.d.commit(
            |dest, beat| num_beats(beat.opcode.has_payload(), beat.size, host_widths[dest]),
            |src, dest, beat| monitor.observe_d(dest, src, beat),
        );
        self.e
            .commit(|_, _| 1, |_src, dest, beat| monitor.observe_e(dest, beat));
    }
}

fn id_range(cfg: &EndpointConfig) -> (u32, u32) {
    (cfg.first_id, cfg.last_id)
}

impl TlNetwork for CrossbarFabric {
    fn host_a_ready(&self, host: usize) -> bool {
        self.a.ins[host].ready
    }
    fn host_a_valid(&self, host: usize) -> bool {
        self.a.ins[host].valid
    }
    fn drive_host_a(&mut self, host: usize, beat: TlA) {
        self.a.ins[host].beat = beat;
    }
    fn drive_host_a_valid(&mut self, host: usize, valid: bool) {
        self.a.ins[host].valid = valid;
    }
    fn dev_a_valid(&self, device: usize) -> bool {
        self.a.outs[device].valid
    }
    fn dev_a_beat(&self, device: usize) -> TlA {
        self.a.outs[device].beat
    }
    fn drive_dev_a_ready(&mut self, device: usize, ready: bool) {
        self.a.outs[device].ready = ready;
    }

    fn dev_b_ready(&self, device: usize) -> bool {
        self.b.ins[device].ready
    }
    fn dev_b_valid(&self, device: usize) -> bool {
        self.b.ins[device].valid
    }
    fn drive_dev_b(&mut self, device: usize, beat: TlB) {
        self.b.ins[device].beat = beat;
    }
    fn drive_dev_b_valid(&mut self, device: usize, valid: bool) {
        self.b.ins[device].valid = valid;
    }
    fn host_b_valid(&self, host: usize) -> bool {
        self.b.outs[host].valid
    }
    fn host_b_beat(&self, host: usize) -> TlB {
        self.b.outs[host].beat
    }
    fn drive_host_b_ready(&mut self, host: usize, ready: bool) {
        self.b.outs[host].ready = ready;
    }

    fn host_c_ready(&self, host: usize) -> bool {
        self.c.ins[host].ready
    }
    fn host_c_valid(&self, host: usize) -> bool {
        self.c.ins[host].valid
    }
    fn drive_host_c(&mut self, host: usize, beat: TlC) {
        self.c.ins[host].beat = beat;
    }
    fn drive_host_c_valid(&mut self, host: usize, valid: bool) {
        self.c.ins[host].valid = valid;
    }
    fn dev_c_valid(&self, device: usize) -> bool {
        self.c.outs[device].valid
    }
    fn dev_c_beat(&self, device: usize) -> TlC {
        self.c.outs[device].beat
    }
    fn drive_dev_c_ready(&mut self, device: usize, ready: bool) {
        self.c.outs[device].ready = ready;
    }

    fn dev_d_ready(&self, device: usize) -> bool {
        self.d.ins[device].ready
    }
    fn dev_d_valid(&self, device: usize) -> bool {
        self.d.ins[device].valid
    }
    fn drive_dev_d(&mut self, device: usize, beat: TlD) {
        self.d.ins[device].beat = beat;
    }
    fn drive_dev_d_valid(&mut self, device: usize, valid: bool) {
        self.d.ins[device].valid = valid;
    }
    fn host_d_valid(&self, host: usize) -> bool {
        self.d.outs[host].valid
    }
    fn host_d_beat(&self, host: usize) -> TlD {
        self.d.outs[host].beat
    }
    fn drive_host_d_ready(&mut self, host: usize, ready: bool) {
        self.d.outs[host].ready = ready;
    }

    fn host_e_ready(&self, host: usize) -> bool {
        self.e.ins[host].ready
    }
    fn host_e_valid(&self, host: usize) -> bool {
        self.e.ins[host].valid
    }
    fn drive_host_e(&mut self, host: usize, beat: TlE) {
        self.e.ins[host].beat = beat;
    }
    fn drive_host_e_valid(&mut self, host: usize, valid: bool) {
        self.e.ins[host].valid = valid;
    }
    fn dev_e_valid(&self, device: usize) -> bool {
        self.e.outs[device].valid
    }
    fn dev_e_beat(&self, device: usize) -> TlE {
        self.e.outs[device].beat
    }
    fn drive_dev_e_ready(&mut self, device: usize, ready: bool) {
        self.e.outs[device].ready = ready;
    }
}
