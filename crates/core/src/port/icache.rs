//! Instruction fetch port.
//!
//! Connects the fetch interface of the hardware model to paged memory. A
//! cache is not modelled, only the interface to one.

use log::trace;

use crate::common::{Fault, MemOp, MemoryAddress, MAX_PHYSICAL_ADDRESS};
use crate::mem::PagedMemory;
use crate::mmu::{translate, Atc};
use crate::port::{PortException, ResponsePipe};

/// Fetch-interface signals the hardware model exposes, hierarchy flattened.
pub trait IcacheDut {
    fn icache_req_valid(&self) -> bool;
    fn icache_req_pc(&self) -> MemoryAddress;
    /// True when fetching in supervisor mode.
    fn icache_req_supervisor(&self) -> bool;
    fn icache_req_sum(&self) -> bool;
    fn icache_req_atp(&self) -> u64;

    fn set_icache_resp_valid(&mut self, valid: bool);
    fn set_icache_resp_instr(&mut self, instr: u32);
    fn set_icache_resp_exception(&mut self, exception: bool);
    fn set_icache_resp_ex_code(&mut self, code: u8);
}

/// Memory port for the instruction fetch interface.
pub struct InstructionCachePort {
    pipe: ResponsePipe<u32>,
}

impl InstructionCachePort {
    pub fn new(latency: u64) -> Self {
        Self {
            pipe: ResponsePipe::new(latency),
        }
    }

    /// Phase 1: deassert last cycle's response signals.
    pub fn set_flow_control<D: IcacheDut>(&mut self, dut: &mut D) {
        dut.set_icache_resp_valid(false);
        dut.set_icache_resp_exception(false);
    }

    /// Phase 3: sample a fetch request and schedule its response.
    pub fn get_inputs<D: IcacheDut>(&mut self, dut: &D, memory: &mut PagedMemory, cycle: u64) {
        if !dut.icache_req_valid() {
            return;
        }

        // Always fetch from an aligned 4-byte block. If the lower bits were
        // non-zero, the pipeline extracts the part it needs.
        let pc = dut.icache_req_pc() & !0x3;

        let result = self.fetch(dut, memory, pc);
        self.pipe.schedule(cycle, result);
    }

    fn fetch<D: IcacheDut>(
        &mut self,
        dut: &D,
        memory: &mut PagedMemory,
        pc: MemoryAddress,
    ) -> Result<u32, PortException> {
        let to_exception = |fault: Fault| PortException {
            cause: fault.cause(MemOp::Fetch),
            tval: fault.addr(),
        };

        // Virtual -> physical translation if enabled. MXR never applies to
        // instruction fetch.
        let atc = Atc(dut.icache_req_atp());
        let address = translate(
            memory,
            pc,
            MemOp::Fetch,
            dut.icache_req_supervisor(),
            dut.icache_req_sum(),
            false,
            atc,
        )
        .map_err(to_exception)?;

        if address > MAX_PHYSICAL_ADDRESS {
            return Err(to_exception(Fault::Access(address)));
        }

        let instruction = memory.read32(address);
        trace!("fetch {:#x} -> {:#010x}", pc, instruction);
        Ok(instruction)
    }

    /// Phase 4: drive the head response if it is due.
    pub fn set_outputs<D: IcacheDut>(&mut self, dut: &mut D, cycle: u64) {
        if let Some(response) = self.pipe.due_front(cycle) {
            match response.payload {
                Ok(instruction) => {
                    dut.set_icache_resp_instr(instruction);
                    dut.set_icache_resp_valid(true);
                }
                Err(exception) => {
                    dut.set_icache_resp_instr(exception.tval as u32);
                    dut.set_icache_resp_valid(true);
                    dut.set_icache_resp_exception(true);
                    dut.set_icache_resp_ex_code(exception.cause as u8);
                }
            }
            response.all_sent = true;
        }
        self.pipe.retire_sent();
    }
}
