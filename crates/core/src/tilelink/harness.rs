//! Testbench driver for a TileLink network.
//!
//! Owns the endpoint models, the network, the RNG and the legality monitor,
//! and advances simulated time. Directed tests use the blocking `send`/
//! `await` helpers, which spin the cycle loop inline; random traffic mode
//! lets the endpoints inject, stall, retract and reorder on their own.

use log::info;

use crate::tilelink::config::TlConfig;
use crate::tilelink::endpoint::{DeviceEndpoint, HostEndpoint, TlNetwork, Topology};
use crate::tilelink::fabric::CrossbarFabric;
use crate::tilelink::message::{APatch, BPatch, CPatch, DPatch, EPatch};
use crate::tilelink::monitor::{TlMonitor, TrafficCounters, Violation};
use crate::tilelink::protocol::{TlA, TlB, TlC, TlD, TlE};
use crate::tilelink::random::TlRng;

/// Cycles an `await` helper spins before declaring the network stuck.
const AWAIT_TIMEOUT: u64 = 100;

/// A complete TileLink testbench over the emulated crossbar.
pub struct TlSimulation {
    topo: Topology,
    fabric: CrossbarFabric,
    monitor: TlMonitor,
    rng: TlRng,

    hosts: Vec<HostEndpoint>,
    devices: Vec<DeviceEndpoint>,

    cycle: u64,
    randomise: bool,
}

impl TlSimulation {
    pub fn new(config: TlConfig, seed: u64) -> Self {
        let topo = Topology::from_config(&config);
        let fabric = CrossbarFabric::new(&config);
        let monitor = TlMonitor::new(&config);

        let hosts = config
            .hosts
            .iter()
            .enumerate()
            .map(|(i, cfg)| HostEndpoint::new(i, cfg.clone()))
            .collect();
        let devices = config
            .devices
            .iter()
            .enumerate()
            .map(|(i, cfg)| DeviceEndpoint::new(i, cfg.clone()))
            .collect();

        Self {
            topo,
            fabric,
            monitor,
            rng: TlRng::new(seed),
            hosts,
            devices,
            cycle: 0,
            randomise: false,
        }
    }

    pub fn num_hosts(&self) -> usize {
        self.hosts.len()
    }

    pub fn num_devices(&self) -> usize {
        self.devices.len()
    }

    pub fn host(&mut self, position: usize) -> &mut HostEndpoint {
        &mut self.hosts[position]
    }

    pub fn device(&mut self, position: usize) -> &mut DeviceEndpoint {
        &mut self.devices[position]
    }

    pub fn topology(&self) -> &Topology {
        &self.topo
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// The address of `offset` within `device`'s routed region.
    pub fn device_address(&self, offset: u64, device: usize) -> u64 {
        self.topo.device_address(offset, device)
    }

    /// One full clock cycle.
    ///
    /// Flow control first (accepted beats leave the wire, receivers announce
    /// ready), then new beats are driven, then the network routes and the
    /// completed handshakes are registered, and finally every endpoint
    /// samples its inputs. A sender can only retract a beat that has not
    /// been accepted: acceptance drops the beat in the flow-control phase
    /// before the send slot is reconsidered.
    pub fn next_cycle(&mut self) {
        for host in &mut self.hosts {
            host.set_flow_control(&mut self.fabric);
        }
        for device in &mut self.devices {
            device.set_flow_control(&mut self.fabric);
        }

        for host in &mut self.hosts {
            host.set_outputs(&mut self.fabric, &self.topo, &mut self.rng, self.randomise);
        }
        for device in &mut self.devices {
            device.set_outputs(&mut self.fabric, &self.topo, &mut self.rng, self.randomise);
        }

        self.fabric.eval();
        self.fabric.commit(&mut self.monitor);

        for host in &mut self.hosts {
            host.get_inputs(&self.fabric, &mut self.rng, self.randomise);
        }
        for device in &mut self.devices {
            device.get_inputs(&self.fabric, &mut self.rng, self.randomise);
        }

        self.cycle += 1;
    }

    /// Runs for `n` cycles with no new stimulus beyond what is queued.
    pub fn idle_cycles(&mut self, n: u64) {
        for _ in 0..n {
            self.next_cycle();
        }
    }

    /// Runs traffic for `duration` cycles. With `randomise`, endpoints
    /// inject new requests and responses take random legal shapes; the final
    /// `drain` cycles generate nothing so in-flight transactions settle.
    pub fn run_traffic(&mut self, randomise: bool, duration: u64, drain: u64) {
        self.randomise = randomise;
        for _ in 0..duration {
            self.next_cycle();
        }

        self.randomise = false;
        for _ in 0..drain {
            self.next_cycle();
        }
    }

    /// Final bookkeeping; returns true when no legality assertion fired.
    pub fn finish(&mut self) -> bool {
        self.monitor.end_of_run();
        if self.monitor.is_clean() {
            info!("no assertions triggered over {} cycles", self.cycle);
        }
        self.monitor.is_clean()
    }

    pub fn violations(&self) -> &[Violation] {
        self.monitor.violations()
    }

    pub fn coverage(&self) -> &TrafficCounters {
        self.monitor.counters()
    }

    // ── Directed-test helpers ─────────────────────────────────────────────
    //
    // These mirror the flow of a hand-written stimulus: construct a request,
    // reserve its transaction ID, put it on the wire, then block on the
    // observing endpoint. Blocking helpers advance simulated time inline.

    /// A deterministic A request from `host` (full-width put to device 0).
    pub fn new_a_request(&mut self, host: usize) -> TlA {
        self.hosts[host]
            .new_a_request(&self.topo, &mut self.rng, false)
            .expect("host has no free source IDs")
    }

    /// Queues a single-beat A message as-is, reserving its source ID.
    pub fn send_a(&mut self, host: usize, beat: TlA) {
        self.hosts[host].a.send(beat);
    }

    pub fn start_a_transaction(&mut self, host: usize, source: u32) {
        self.hosts[host].a.start_transaction(source as u64);
    }

    /// Queues a complete A request, with `patch` forcing chosen fields.
    pub fn queue_a_request(&mut self, host: usize, patch: &APatch) {
        self.hosts[host].queue_a_request(&self.topo, &mut self.rng, false, patch);
    }

    /// Queues a complete C request, with `patch` forcing chosen fields.
    pub fn queue_c_request(&mut self, host: usize, patch: &CPatch) {
        self.hosts[host].queue_c_request(&self.topo, &mut self.rng, false, patch);
    }

    /// Queues a probe broadcast from `device`.
    pub fn queue_b_request(&mut self, device: usize, patch: &BPatch) {
        self.devices[device].queue_b_request(&self.topo, &mut self.rng, false, patch);
    }

    /// The deterministic D response `device` would give to `request`.
    pub fn new_d_response(&mut self, device: usize, request: &TlA) -> TlD {
        self.devices[device]
            .new_d_response(&mut self.rng, false, request)
            .expect("device has no free sink IDs")
    }

    /// Queues a single-beat D message as-is.
    pub fn send_d(&mut self, device: usize, beat: TlD) {
        self.devices[device].d.send(beat);
    }

    pub fn change_next_a_beat(&mut self, host: usize, patch: APatch) {
        self.hosts[host].a.change_next_beat(patch);
    }

    pub fn change_next_b_beat(&mut self, device: usize, patch: BPatch) {
        self.devices[device].b.change_next_beat(patch);
    }

    pub fn change_next_c_beat(&mut self, host: usize, patch: CPatch) {
        self.hosts[host].c.change_next_beat(patch);
    }

    pub fn change_next_d_beat(&mut self, device: usize, patch: DPatch) {
        self.devices[device].d.change_next_beat(patch);
    }

    pub fn change_next_e_beat(&mut self, host: usize, patch: EPatch) {
        self.hosts[host].e.change_next_beat(patch);
    }

    /// Blocks until a beat is visible on `device`'s A input.
    pub fn await_device_a(&mut self, device: usize) -> TlA {
        self.await_valid(|sim| sim.fabric.dev_a_valid(device));
        self.devices[device].a.force_ready();
        self.fabric.dev_a_beat(device)
    }

    /// Blocks until a beat is visible on `device`'s C input.
    pub fn await_device_c(&mut self, device: usize) -> TlC {
        self.await_valid(|sim| sim.fabric.dev_c_valid(device));
        self.devices[device].c.force_ready();
        self.fabric.dev_c_beat(device)
    }

    /// Blocks until a beat is visible on `device`'s E input.
    pub fn await_device_e(&mut self, device: usize) -> TlE {
        self.await_valid(|sim| sim.fabric.dev_e_valid(device));
        self.devices[device].e.force_ready();
        self.fabric.dev_e_beat(device)
    }

    /// Blocks until a beat is visible on `host`'s B input.
    pub fn await_host_b(&mut self, host: usize) -> TlB {
        self.await_valid(|sim| sim.fabric.host_b_valid(host));
        self.hosts[host].b.force_ready();
        self.fabric.host_b_beat(host)
    }

    /// Blocks until a beat is visible on `host`'s D input.
    pub fn await_host_d(&mut self, host: usize) -> TlD {
        self.await_valid(|sim| sim.fabric.host_d_valid(host));
        self.hosts[host].d.force_ready();
        self.fabric.host_d_beat(host)
    }

    fn await_valid(&mut self, observed: impl Fn(&Self) -> bool) {
        let mut waited = 0;
        while waited < AWAIT_TIMEOUT && !observed(self) {
            self.next_cycle();
            waited += 1;
        }
        assert!(observed(self), "no message received before timeout");
    }
}
