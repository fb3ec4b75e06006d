//! Protocol legality monitor.
//!
//! Watches every accepted beat on the network and checks the TileLink rules
//! the RTL assertion checker would enforce: opcode/param legality per
//! profile, burst continuity, mask shape, request/response pairing, and the
//! corrupt/denied relations. Violations are collected rather than aborting,
//! so a directed test can deliberately drive illegal stimulus and inspect
//! what was caught.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::tilelink::config::TlConfig;
use crate::tilelink::endpoint::probe_id;
use crate::tilelink::protocol::{
    align, complete_mask, num_beats, AOpcode, COpcode, DOpcode, TlA, TlB, TlC, TlD, TlE,
};

/// One legality failure, with the channel and the receiving endpoint.
#[derive(Clone, Debug)]
pub struct Violation {
    pub channel: &'static str,
    pub endpoint: usize,
    pub message: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{} -> endpoint {}] {}",
            self.channel, self.endpoint, self.message
        )
    }
}

/// Beat and violation counts, dumped as the coverage report.
#[derive(Debug, Default, Serialize)]
pub struct TrafficCounters {
    pub a_beats: u64,
    pub b_beats: u64,
    pub c_beats: u64,
    pub d_beats: u64,
    pub e_beats: u64,
    pub a_opcodes: BTreeMap<String, u64>,
    pub d_opcodes: BTreeMap<String, u64>,
    pub violations: u64,
}

/// An A transaction awaiting its D response.
#[derive(Clone, Copy, Debug)]
struct OpenA {
    opcode: AOpcode,
    size: u8,
}

/// A burst in progress on some channel end: the control template, the next
/// expected address, and how many beats remain.
#[derive(Clone, Copy, Debug)]
struct Burst<T> {
    template: T,
    next_address: u64,
    beats_left: u32,
}

pub struct TlMonitor {
    hosts: Vec<crate::tilelink::config::EndpointConfig>,
    devices: Vec<crate::tilelink::config::EndpointConfig>,

    /// A-channel transactions by source.
    open_a: HashMap<u32, OpenA>,
    /// Release sources awaiting a ReleaseAck.
    open_c: HashSet<u32>,
    /// Outstanding probes by (device, compound probe ID).
    open_b: HashSet<(usize, u64)>,
    /// Grant sinks awaiting an E acknowledgement, by (device, sink).
    open_d: HashSet<(usize, u32)>,

    a_burst: HashMap<usize, Burst<TlA>>,
    c_burst: HashMap<usize, Burst<TlC>>,
    d_burst: HashMap<usize, Burst<TlD>>,

    violations: Vec<Violation>,
    counters: TrafficCounters,
}

impl TlMonitor {
    pub fn new(config: &TlConfig) -> Self {
        Self {
            hosts: config.hosts.clone(),
            devices: config.devices.clone(),
            open_a: HashMap::new(),
            open_c: HashSet::new(),
            open_b: HashSet::new(),
            open_d: HashSet::new(),
            a_burst: HashMap::new(),
            c_burst: HashMap::new(),
            d_burst: HashMap::new(),
            violations: Vec::new(),
            counters: TrafficCounters::default(),
        }
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn counters(&self) -> &TrafficCounters {
        &self.counters
    }

    fn flag(&mut self, channel: &'static str, endpoint: usize, message: String) {
        self.counters.violations += 1;
        self.violations.push(Violation {
            channel,
            endpoint,
            message,
        });
    }

    /// Checks to run when the simulation stops: any partially transferred
    /// burst means beats were lost or invented.
    pub fn end_of_run(&mut self) {
        let unfinished_a: Vec<usize> = self.a_burst.keys().copied().collect();
        for dev in unfinished_a {
            self.flag("A", dev, "burst incomplete at end of simulation".into());
        }
        let unfinished_c: Vec<usize> = self.c_burst.keys().copied().collect();
        for dev in unfinished_c {
            self.flag("C", dev, "burst incomplete at end of simulation".into());
        }
        let unfinished_d: Vec<usize> = self.d_burst.keys().copied().collect();
        for host in unfinished_d {
            self.flag("D", host, "burst incomplete at end of simulation".into());
        }
    }

    fn width_bytes_of_device(&self, device: usize) -> u32 {
        self.devices[device].data_width / 8
    }

    fn width_bytes_of_host(&self, host: usize) -> u32 {
        self.hosts[host].data_width / 8
    }

    pub fn observe_a(&mut self, device: usize, beat: &TlA) {
        self.counters.a_beats += 1;
        *self
            .counters
            .a_opcodes
            .entry(format!("{:?}", beat.opcode))
            .or_default() += 1;

        let width = self.width_bytes_of_device(device);

        // A continuation beat of an in-progress burst follows different
        // rules: constant control fields, advancing address, full mask.
        if let Some(burst) = self.a_burst.get(&device).copied() {
            let t = &burst.template;
            if beat.address != burst.next_address {
                self.flag(
                    "A",
                    device,
                    format!(
                        "burst address {:#x}, expected {:#x}",
                        beat.address, burst.next_address
                    ),
                );
            }
            if (beat.opcode, beat.param, beat.size, beat.source)
                != (t.opcode, t.param, t.size, t.source)
            {
                self.flag("A", device, "burst control fields changed".into());
            }
            // Partial puts may deactivate lanes on any beat; every other
            // multibeat opcode must keep the full mask.
            if t.opcode.is_full() && beat.mask != complete_mask(0, width as u64, width as u64) {
                self.flag("A", device, format!("burst mask {:#x} not full", beat.mask));
            }

            if burst.beats_left == 1 {
                self.a_burst.remove(&device);
            } else {
                let entry = self.a_burst.get_mut(&device).unwrap();
                entry.beats_left -= 1;
                entry.next_address += width as u64;
            }
            return;
        }

        // First beat of a message.
        if !AOpcode::legal_for(self.devices[device].protocol).contains(&beat.opcode) {
            self.flag(
                "A",
                device,
                format!(
                    "opcode {:?} illegal for {:?} device",
                    beat.opcode, self.devices[device].protocol
                ),
            );
        }
        if !beat.opcode.param_legal(beat.param) {
            self.flag(
                "A",
                device,
                format!("param {} illegal for {:?}", beat.param, beat.opcode),
            );
        }
        if beat.address % (1u64 << beat.size) != 0 {
            self.flag(
                "A",
                device,
                format!(
                    "address {:#x} not aligned to size {}",
                    beat.address, beat.size
                ),
            );
        }
        if beat.mask.count_ones() as u64 > (1u64 << beat.size) {
            self.flag(
                "A",
                device,
                format!("mask {:#x} wider than size {}", beat.mask, beat.size),
            );
        }
        if beat.opcode.is_full()
            && beat.mask != complete_mask(beat.address, 1 << beat.size, width as u64)
        {
            self.flag(
                "A",
                device,
                format!(
                    "mask {:#x} does not cover a full size-{} access at {:#x}",
                    beat.mask, beat.size, beat.address
                ),
            );
        }
        if beat.corrupt && !beat.opcode.has_payload() {
            self.flag("A", device, "corrupt set without a payload".into());
        }

        if self.open_a.contains_key(&beat.source) {
            self.flag(
                "A",
                device,
                format!("source {} reused while transaction open", beat.source),
            );
        }
        self.open_a.insert(
            beat.source,
            OpenA {
                opcode: beat.opcode,
                size: beat.size,
            },
        );

        let beats = num_beats(beat.opcode.has_payload(), beat.size, width);
        if beats > 1 {
            self.a_burst.insert(
                device,
                Burst {
                    template: *beat,
                    next_address: beat.address + width as u64,
                    beats_left: beats - 1,
                },
            );
        }
    }

    pub fn observe_b(&mut self, host: usize, device: usize, beat: &TlB) {
        self.counters.b_beats += 1;

        if !self.hosts[host].protocol.is_coherent() {
            self.flag("B", host, "probe sent to a non-coherent host".into());
        }
        if beat.param > 2 {
            self.flag("B", host, format!("cap permission {} illegal", beat.param));
        }
        if beat.address % (1u64 << beat.size) != 0 {
            self.flag(
                "B",
                host,
                format!(
                    "address {:#x} not aligned to size {}",
                    beat.address, beat.size
                ),
            );
        }

        let id = (device, probe_id(beat.source, beat.address));
        if !self.open_b.insert(id) {
            self.flag(
                "B",
                host,
                format!(
                    "probe repeated for open (source {}, address {:#x})",
                    beat.source, beat.address
                ),
            );
        }
    }

    pub fn observe_c(&mut self, device: usize, beat: &TlC) {
        self.counters.c_beats += 1;

        let width = self.width_bytes_of_device(device);

        if let Some(burst) = self.c_burst.get(&device).copied() {
            let t = &burst.template;
            if beat.address != burst.next_address {
                self.flag(
                    "C",
                    device,
                    format!(
                        "burst address {:#x}, expected {:#x}",
                        beat.address, burst.next_address
                    ),
                );
            }
            if (beat.opcode, beat.param, beat.size, beat.source)
                != (t.opcode, t.param, t.size, t.source)
            {
                self.flag("C", device, "burst control fields changed".into());
            }

            let last = burst.beats_left == 1;
            if last {
                self.c_burst.remove(&device);
                self.close_c_message(device, &burst.template);
            } else {
                let entry = self.c_burst.get_mut(&device).unwrap();
                entry.beats_left -= 1;
                entry.next_address += width as u64;
            }
            return;
        }

        if !self.devices[device].protocol.is_coherent() {
            self.flag("C", device, "release sent to a non-coherent device".into());
        }
        if beat.param > 5 {
            self.flag(
                "C",
                device,
                format!("permission report {} illegal", beat.param),
            );
        }
        if beat.address % (1u64 << beat.size) != 0 {
            self.flag(
                "C",
                device,
                format!(
                    "address {:#x} not aligned to size {}",
                    beat.address, beat.size
                ),
            );
        }
        if beat.corrupt && !beat.opcode.has_payload() {
            self.flag("C", device, "corrupt set without a payload".into());
        }

        if matches!(beat.opcode, COpcode::ProbeAck | COpcode::ProbeAckData) {
            let id = (device, probe_id(beat.source, align(beat.address, 1 << beat.size)));
            if !self.open_b.contains(&id) {
                self.flag(
                    "C",
                    device,
                    format!(
                        "probe-ack without an open probe (source {}, address {:#x})",
                        beat.source, beat.address
                    ),
                );
            }
        }

        let beats = num_beats(beat.opcode.has_payload(), beat.size, width);
        if beats > 1 {
            self.c_burst.insert(
                device,
                Burst {
                    template: *beat,
                    next_address: beat.address + width as u64,
                    beats_left: beats - 1,
                },
            );
        } else {
            self.close_c_message(device, beat);
        }
    }

    /// Bookkeeping once the last beat of a C message has been seen.
    fn close_c_message(&mut self, device: usize, header: &TlC) {
        match header.opcode {
            COpcode::ProbeAck | COpcode::ProbeAckData => {
                let id = (
                    device,
                    probe_id(header.source, align(header.address, 1 << header.size)),
                );
                self.open_b.remove(&id);
            }
            COpcode::Release | COpcode::ReleaseData => {
                if !self.open_c.insert(header.source) {
                    self.flag(
                        "C",
                        device,
                        format!("release source {} reused while open", header.source),
                    );
                }
            }
        }
    }

    pub fn observe_d(&mut self, host: usize, device: usize, beat: &TlD) {
        self.counters.d_beats += 1;
        *self
            .counters
            .d_opcodes
            .entry(format!("{:?}", beat.opcode))
            .or_default() += 1;

        let width = self.width_bytes_of_host(host);

        if let Some(burst) = self.d_burst.get(&host).copied() {
            let t = &burst.template;
            if (beat.opcode, beat.param, beat.size, beat.source)
                != (t.opcode, t.param, t.size, t.source)
            {
                self.flag("D", host, "burst control fields changed".into());
            }
            if beat.denied && !beat.corrupt && beat.opcode.has_payload() {
                self.flag("D", host, "denied response not marked corrupt".into());
            }

            if burst.beats_left == 1 {
                self.d_burst.remove(&host);
                self.close_d_message(host, device, &burst.template);
            } else {
                self.d_burst.get_mut(&host).unwrap().beats_left -= 1;
            }
            return;
        }

        if beat.corrupt && !beat.opcode.has_payload() {
            self.flag("D", host, "corrupt set without a payload".into());
        }
        if beat.denied && beat.opcode.has_payload() && !beat.corrupt {
            self.flag("D", host, "denied response not marked corrupt".into());
        }
        if !beat.opcode.param_legal(beat.param) {
            self.flag(
                "D",
                host,
                format!("param {} illegal for {:?}", beat.param, beat.opcode),
            );
        }

        if beat.opcode == DOpcode::ReleaseAck {
            if !self.open_c.remove(&beat.source) {
                self.flag(
                    "D",
                    host,
                    format!("ReleaseAck without an open release on source {}", beat.source),
                );
            }
            return;
        }

        let Some(open) = self.open_a.get(&beat.source).copied() else {
            self.flag(
                "D",
                host,
                format!("response on source {} without a request", beat.source),
            );
            return;
        };

        if !DOpcode::legal_response_to(open.opcode).contains(&beat.opcode) {
            self.flag(
                "D",
                host,
                format!("{:?} is not a legal response to {:?}", beat.opcode, open.opcode),
            );
        }
        if beat.size != open.size {
            self.flag(
                "D",
                host,
                format!(
                    "response size {} differs from request size {}",
                    beat.size, open.size
                ),
            );
        }

        let beats = num_beats(beat.opcode.has_payload(), beat.size, width);
        if beats > 1 {
            self.d_burst.insert(
                host,
                Burst {
                    template: *beat,
                    next_address: 0,
                    beats_left: beats - 1,
                },
            );
        } else {
            self.close_d_message(host, device, beat);
        }
    }

    /// Bookkeeping once the last beat of a D message has been seen.
    fn close_d_message(&mut self, _host: usize, device: usize, header: &TlD) {
        self.open_a.remove(&header.source);
        if header.opcode.requires_response() {
            self.open_d.insert((device, header.sink));
        }
    }

    pub fn observe_e(&mut self, device: usize, beat: &TlE) {
        self.counters.e_beats += 1;

        if !self.open_d.remove(&(device, beat.sink)) {
            self.flag(
                "E",
                device,
                format!("grant-ack for sink {} without an open grant", beat.sink),
            );
        }
    }
}
