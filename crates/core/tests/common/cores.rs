//! A scripted stand-in for the core netlist.
//!
//! `FakeCore` exposes the fetch and data interfaces as plain fields so port
//! tests can poke signals directly, and carries an optional request script
//! so driver tests can run a whole simulation: each scripted data request is
//! asserted for one cycle, and the next is issued once the previous response
//! arrives.

use std::collections::VecDeque;

use rvtb_core::common::MemoryAddress;
use rvtb_core::port::{DcacheDut, IcacheDut};
use rvtb_core::sim::{CoreModel, HardwareModel};

/// One scripted data request, mirroring the request wires.
#[derive(Clone, Copy, Debug)]
pub struct DataRequest {
    pub op: u8,
    pub address: MemoryAddress,
    pub size: u8,
    pub size_ext: u8,
    pub amo: u8,
    pub value: u64,
    pub atp: u64,
    pub supervisor: bool,
    pub sum: bool,
    pub mxr: bool,
}

impl DataRequest {
    pub fn new(op: u8, address: MemoryAddress, size: u8) -> Self {
        Self {
            op,
            address,
            size,
            size_ext: 0,
            amo: 0,
            value: 0,
            atp: 0,
            supervisor: true,
            sum: false,
            mxr: false,
        }
    }

    pub fn load(address: MemoryAddress, size: u8) -> Self {
        Self::new(1, address, size)
    }

    pub fn store(address: MemoryAddress, size: u8, value: u64) -> Self {
        Self {
            value,
            ..Self::new(2, address, size)
        }
    }

    pub fn load_reserved(address: MemoryAddress, size: u8) -> Self {
        Self::new(5, address, size)
    }

    pub fn store_conditional(address: MemoryAddress, size: u8, value: u64) -> Self {
        Self {
            value,
            ..Self::new(6, address, size)
        }
    }

    pub fn amo(address: MemoryAddress, size: u8, function: u8, value: u64) -> Self {
        Self {
            amo: function << 2,
            value,
            ..Self::new(7, address, size)
        }
    }

    pub fn with_size_ext(mut self, size_ext: u8) -> Self {
        self.size_ext = size_ext;
        self
    }

    pub fn with_translation(mut self, atp: u64, supervisor: bool, sum: bool, mxr: bool) -> Self {
        self.atp = atp;
        self.supervisor = supervisor;
        self.sum = sum;
        self.mxr = mxr;
        self
    }
}

fn idle_request() -> DataRequest {
    DataRequest::load(0, 0)
}

/// Scripted core model. All wire state is public for direct-drive tests.
pub struct FakeCore {
    // Fetch interface.
    pub icache_req_valid: bool,
    pub icache_req_pc: MemoryAddress,
    pub icache_req_supervisor: bool,
    pub icache_req_sum: bool,
    pub icache_req_atp: u64,
    pub icache_resp_valid: bool,
    pub icache_resp_instr: u32,
    pub icache_resp_exception: bool,
    pub icache_resp_ex_code: u8,

    // Data interface.
    pub dcache_req_valid: bool,
    pub dcache_req: DataRequest,
    pub dcache_resp_valid: bool,
    pub dcache_resp_value: u64,
    pub dcache_ex_valid: bool,
    pub dcache_ex_exception: [u32; 3],
    pub dcache_notif_valid: bool,
    pub dcache_notif_ready: bool,

    // Scripting state, used only when driven by `RiscvSimulation`.
    pub script: VecDeque<DataRequest>,
    pub responses: Vec<Result<u64, (u8, u64)>>,

    clock: bool,
    in_reset: bool,
    waiting: bool,
    response_arrived: bool,
}

impl FakeCore {
    pub fn new() -> Self {
        Self {
            icache_req_valid: false,
            icache_req_pc: 0,
            icache_req_supervisor: true,
            icache_req_sum: false,
            icache_req_atp: 0,
            icache_resp_valid: false,
            icache_resp_instr: 0,
            icache_resp_exception: false,
            icache_resp_ex_code: 0,
            dcache_req_valid: false,
            dcache_req: idle_request(),
            dcache_resp_valid: false,
            dcache_resp_value: 0,
            dcache_ex_valid: false,
            dcache_ex_exception: [0; 3],
            dcache_notif_valid: false,
            dcache_notif_ready: false,
            script: VecDeque::new(),
            responses: Vec::new(),
            clock: false,
            in_reset: false,
            waiting: false,
            response_arrived: false,
        }
    }

    pub fn scripted(requests: impl IntoIterator<Item = DataRequest>) -> Self {
        let mut core = Self::new();
        core.script = requests.into_iter().collect();
        core
    }

    fn posedge(&mut self) {
        if self.in_reset {
            return;
        }

        // The port consumed last cycle's request; requests are one-shot.
        if self.dcache_req_valid {
            self.dcache_req_valid = false;
        }

        if self.response_arrived {
            self.waiting = false;
            self.response_arrived = false;
        }

        if !self.waiting {
            if let Some(request) = self.script.pop_front() {
                self.dcache_req = request;
                self.dcache_req_valid = true;
                self.waiting = true;
            }
        }
    }
}

impl Default for FakeCore {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwareModel for FakeCore {
    fn eval(&mut self) {
        // Responses are stable during the low half of the cycle; sample them
        // there, once each.
        if !self.clock && !self.response_arrived {
            if self.dcache_resp_valid {
                self.responses.push(Ok(self.dcache_resp_value));
                self.response_arrived = true;
            } else if self.dcache_ex_valid {
                let cause = self.dcache_ex_exception[2] as u8;
                let tval = ((self.dcache_ex_exception[1] as u64) << 32)
                    | self.dcache_ex_exception[0] as u64;
                self.responses.push(Err((cause, tval)));
                self.response_arrived = true;
            }
        }
    }

    fn set_clock(&mut self, level: bool) {
        if level && !self.clock {
            self.posedge();
        }
        self.clock = level;
    }

    fn set_reset(&mut self, active: bool) {
        self.in_reset = active;
    }
}

impl IcacheDut for FakeCore {
    fn icache_req_valid(&self) -> bool {
        self.icache_req_valid
    }
    fn icache_req_pc(&self) -> MemoryAddress {
        self.icache_req_pc
    }
    fn icache_req_supervisor(&self) -> bool {
        self.icache_req_supervisor
    }
    fn icache_req_sum(&self) -> bool {
        self.icache_req_sum
    }
    fn icache_req_atp(&self) -> u64 {
        self.icache_req_atp
    }

    fn set_icache_resp_valid(&mut self, valid: bool) {
        self.icache_resp_valid = valid;
    }
    fn set_icache_resp_instr(&mut self, instr: u32) {
        self.icache_resp_instr = instr;
    }
    fn set_icache_resp_exception(&mut self, exception: bool) {
        self.icache_resp_exception = exception;
    }
    fn set_icache_resp_ex_code(&mut self, code: u8) {
        self.icache_resp_ex_code = code;
    }
}

impl DcacheDut for FakeCore {
    fn dcache_req_valid(&self) -> bool {
        self.dcache_req_valid
    }
    fn dcache_req_address(&self) -> MemoryAddress {
        self.dcache_req.address
    }
    fn dcache_req_value(&self) -> u64 {
        self.dcache_req.value
    }
    fn dcache_req_op(&self) -> u8 {
        self.dcache_req.op
    }
    fn dcache_req_size(&self) -> u8 {
        self.dcache_req.size
    }
    fn dcache_req_size_ext(&self) -> u8 {
        self.dcache_req.size_ext
    }
    fn dcache_req_amo(&self) -> u8 {
        self.dcache_req.amo
    }
    fn dcache_req_supervisor(&self) -> bool {
        self.dcache_req.supervisor
    }
    fn dcache_req_sum(&self) -> bool {
        self.dcache_req.sum
    }
    fn dcache_req_mxr(&self) -> bool {
        self.dcache_req.mxr
    }
    fn dcache_req_atp(&self) -> u64 {
        self.dcache_req.atp
    }

    fn set_dcache_resp_valid(&mut self, valid: bool) {
        self.dcache_resp_valid = valid;
    }
    fn set_dcache_resp_value(&mut self, value: u64) {
        self.dcache_resp_value = value;
    }
    fn set_dcache_ex_valid(&mut self, valid: bool) {
        self.dcache_ex_valid = valid;
    }
    fn set_dcache_ex_exception(&mut self, packed: [u32; 3]) {
        self.dcache_ex_exception = packed;
    }

    fn dcache_notif_valid(&self) -> bool {
        self.dcache_notif_valid
    }
    fn set_dcache_notif_ready(&mut self, ready: bool) {
        self.dcache_notif_ready = ready;
    }
}

impl CoreModel for FakeCore {
    fn debug_pc(&self) -> MemoryAddress {
        0
    }
}
