//! Raw word-interface memory ports.
//!
//! Some harness targets expose a bare memory bus instead of cache interfaces:
//! an enable, a 64-bit-word address, a write enable, a byte mask and write
//! data. These ports always respond with the 64-bit word at the requested
//! address after one cycle.

use crate::common::MemoryAddress;
use crate::mem::PagedMemory;
use crate::port::ResponsePipe;

/// Word-interface signals the hardware model exposes.
pub trait UncachedDut {
    fn mem_enable(&self) -> bool;
    /// Address in 64-bit words.
    fn mem_word_address(&self) -> u64;
    fn mem_write_enable(&self) -> bool;
    fn mem_write_mask(&self) -> u8;
    fn mem_write_data(&self) -> u64;

    fn set_mem_read_data(&mut self, data: u64);
}

/// Memory port for a raw word interface.
///
/// The `subword` flavour accepts the byte-mask patterns corresponding to
/// naturally aligned 1/2/4-byte writes; the plain flavour requires the full
/// mask. Any other mask is a fatal error.
pub struct UncachedPort {
    pipe: ResponsePipe<u64>,
    subword: bool,
}

impl UncachedPort {
    /// A port requiring full 64-bit writes (`mask == 0xFF`).
    pub fn new() -> Self {
        Self {
            pipe: ResponsePipe::new(1),
            subword: false,
        }
    }

    /// A port that decomposes subword byte masks into narrower writes.
    pub fn new_subword() -> Self {
        Self {
            pipe: ResponsePipe::new(1),
            subword: true,
        }
    }

    pub fn get_inputs<D: UncachedDut>(&mut self, dut: &D, memory: &mut PagedMemory, cycle: u64) {
        if !dut.mem_enable() {
            return;
        }

        let address: MemoryAddress = dut.mem_word_address() << 3;
        let data_read = memory.read64(address);

        if dut.mem_write_enable() {
            let data = dut.mem_write_data();
            let mask = dut.mem_write_mask();

            if !self.subword && mask != 0b1111_1111 {
                panic!("unsupported memory write mask: {:#010b}", mask);
            }

            match mask {
                0b0000_0001 => memory.write8(address, data as u8),
                0b0000_0010 => memory.write8(address + 1, (data >> 8) as u8),
                0b0000_0100 => memory.write8(address + 2, (data >> 16) as u8),
                0b0000_1000 => memory.write8(address + 3, (data >> 24) as u8),
                0b0001_0000 => memory.write8(address + 4, (data >> 32) as u8),
                0b0010_0000 => memory.write8(address + 5, (data >> 40) as u8),
                0b0100_0000 => memory.write8(address + 6, (data >> 48) as u8),
                0b1000_0000 => memory.write8(address + 7, (data >> 56) as u8),
                0b0000_0011 => memory.write16(address, data as u16),
                0b0000_1100 => memory.write16(address + 2, (data >> 16) as u16),
                0b0011_0000 => memory.write16(address + 4, (data >> 32) as u16),
                0b1100_0000 => memory.write16(address + 6, (data >> 48) as u16),
                0b0000_1111 => memory.write32(address, data as u32),
                0b1111_0000 => memory.write32(address + 4, (data >> 32) as u32),
                0b1111_1111 => memory.write64(address, data),
                _ => panic!("unsupported memory write mask: {:#010b}", mask),
            }
        }

        self.pipe.schedule(cycle, Ok(data_read));
    }

    pub fn set_outputs<D: UncachedDut>(&mut self, dut: &mut D, cycle: u64) {
        if let Some(response) = self.pipe.due_front(cycle) {
            if let Ok(data) = response.payload {
                dut.set_mem_read_data(data);
            }
            response.all_sent = true;
        }
        self.pipe.retire_sent();
    }
}

impl Default for UncachedPort {
    fn default() -> Self {
        Self::new()
    }
}
