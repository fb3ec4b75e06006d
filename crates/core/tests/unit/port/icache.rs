//! Fetch port tests.

use rvtb_core::mem::PagedMemory;
use rvtb_core::port::InstructionCachePort;

use crate::common::cores::FakeCore;

const INSTR_PAGE_FAULT: u8 = 12;

struct Rig {
    core: FakeCore,
    mem: PagedMemory,
    port: InstructionCachePort,
    cycle: u64,
}

impl Rig {
    fn new(latency: u64) -> Self {
        Self {
            core: FakeCore::new(),
            mem: PagedMemory::new(),
            port: InstructionCachePort::new(latency),
            cycle: 0,
        }
    }

    /// Issues one fetch and spins until the response. Returns the cycles
    /// taken; the response itself is read from the core's wires.
    fn fetch(&mut self, pc: u64) -> u64 {
        let issued_at = self.cycle;

        self.core.icache_req_pc = pc;
        self.core.icache_req_valid = true;
        self.port.get_inputs(&self.core, &mut self.mem, self.cycle);
        self.core.icache_req_valid = false;

        loop {
            self.cycle += 1;
            assert!(self.cycle < issued_at + 100, "no response from fetch port");

            self.port.set_flow_control(&mut self.core);
            self.port.set_outputs(&mut self.core, self.cycle);

            if self.core.icache_resp_valid {
                return self.cycle - issued_at;
            }
        }
    }
}

#[test]
fn fetches_the_loaded_instruction() {
    let mut rig = Rig::new(1);
    rig.mem.write32(0x8000_0000, 0x0000_0013); // nop

    let cycles = rig.fetch(0x8000_0000);

    assert_eq!(cycles, 1);
    assert_eq!(rig.core.icache_resp_instr, 0x0000_0013);
    assert!(!rig.core.icache_resp_exception);
}

#[test]
fn fetch_respects_configured_latency() {
    let mut rig = Rig::new(10);
    rig.mem.write32(0x8000_0000, 0x0000_0013);

    let cycles = rig.fetch(0x8000_0000);
    assert_eq!(cycles, 10);
}

#[test]
fn pc_is_masked_to_a_4_byte_boundary() {
    let mut rig = Rig::new(1);
    rig.mem.write32(0x8000_0000, 0x1111_1111);
    rig.mem.write32(0x8000_0004, 0x2222_2222);

    rig.fetch(0x8000_0002);
    assert_eq!(rig.core.icache_resp_instr, 0x1111_1111);

    rig.fetch(0x8000_0006);
    assert_eq!(rig.core.icache_resp_instr, 0x2222_2222);
}

#[test]
fn response_signals_clear_the_cycle_after() {
    let mut rig = Rig::new(1);
    rig.mem.write32(0x8000_0000, 0x0000_0013);

    rig.fetch(0x8000_0000);
    assert!(rig.core.icache_resp_valid);

    rig.cycle += 1;
    rig.port.set_flow_control(&mut rig.core);
    rig.port.set_outputs(&mut rig.core, rig.cycle);
    assert!(!rig.core.icache_resp_valid);
}

#[test]
fn fetch_from_unexecutable_page_faults() {
    let mut rig = Rig::new(1);

    // Gigapage leaf with R|W but no X.
    let root_ppn: u64 = 0x300;
    let va: u64 = 0x4000_0000;
    let l2 = (va >> 30) & 0x1FF;
    let perms = 1 | (1 << 1) | (1 << 2) | (1 << 6) | (1 << 7); // V|R|W|A|D
    rig.mem
        .write64((root_ppn << 12) + l2 * 8, (0x80000u64 << 10) | perms);

    rig.core.icache_req_atp = (8u64 << 60) | root_ppn;
    rig.fetch(va);

    assert!(rig.core.icache_resp_exception);
    assert_eq!(rig.core.icache_resp_ex_code, INSTR_PAGE_FAULT);
}

#[test]
fn translated_fetch_reads_the_mapped_frame() {
    let mut rig = Rig::new(1);

    let root_ppn: u64 = 0x300;
    let va: u64 = 0x4000_0000;
    let l2 = (va >> 30) & 0x1FF;
    let perms = 1 | (1 << 1) | (1 << 3) | (1 << 6); // V|R|X|A
    rig.mem
        .write64((root_ppn << 12) + l2 * 8, (0x80000u64 << 10) | perms);

    rig.mem.write32(0x8000_0000, 0x0040_0593); // li a1, 4
    rig.core.icache_req_atp = (8u64 << 60) | root_ppn;
    rig.fetch(va);

    assert!(!rig.core.icache_resp_exception);
    assert_eq!(rig.core.icache_resp_instr, 0x0040_0593);
}
