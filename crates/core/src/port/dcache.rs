//! Data access port.
//!
//! Connects the data interface of the hardware model to paged memory: address
//! translation, loads and stores of 1/2/4/8 bytes, size extension, atomic
//! read-modify-write, and LR/SC reservations. A cache is not modelled, only
//! the interface to one.

use log::trace;

use crate::common::{Fault, MemOp, MemoryAddress, MAX_PHYSICAL_ADDRESS};
use crate::mem::PagedMemory;
use crate::mmu::{translate, Atc};
use crate::port::{PortException, ResponsePipe};

/// How loaded values and write operands are extended to 64 bits.
///
/// Wire encoding of the 2-bit `size_ext` request field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SizeExt {
    Zero = 0,
    One = 1,
    Signed = 2,
}

impl SizeExt {
    pub fn from_wire(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(SizeExt::Zero),
            1 => Some(SizeExt::One),
            2 => Some(SizeExt::Signed),
            _ => None,
        }
    }
}

/// Data-interface signals the hardware model exposes, hierarchy flattened.
pub trait DcacheDut {
    fn dcache_req_valid(&self) -> bool;
    fn dcache_req_address(&self) -> MemoryAddress;
    fn dcache_req_value(&self) -> u64;
    /// Operation encoding; see [`MemOp::from_wire`].
    fn dcache_req_op(&self) -> u8;
    /// log2 of the access width in bytes.
    fn dcache_req_size(&self) -> u8;
    fn dcache_req_size_ext(&self) -> u8;
    /// AMO function; the low two bits are ordering constraints.
    fn dcache_req_amo(&self) -> u8;
    fn dcache_req_supervisor(&self) -> bool;
    fn dcache_req_sum(&self) -> bool;
    fn dcache_req_mxr(&self) -> bool;
    fn dcache_req_atp(&self) -> u64;

    fn set_dcache_resp_valid(&mut self, valid: bool);
    fn set_dcache_resp_value(&mut self, value: u64);
    fn set_dcache_ex_valid(&mut self, valid: bool);
    /// The exception is wired as three 32-bit words: `[payload_lo,
    /// payload_hi, cause]`.
    fn set_dcache_ex_exception(&mut self, packed: [u32; 3]);

    /// Translation-structure flush notification from the model.
    fn dcache_notif_valid(&self) -> bool;
    fn set_dcache_notif_ready(&mut self, ready: bool);
}

/// The minimum viable LR/SC state: one reserved address, cleared whenever any
/// memory is written through this port or the model flushes its translation
/// structures.
#[derive(Clone, Copy, Debug, Default)]
pub struct Reservation {
    valid: bool,
    address: MemoryAddress,
}

impl Reservation {
    pub fn make(&mut self, address: MemoryAddress) {
        self.valid = true;
        self.address = address;
    }

    pub fn check(&self, address: MemoryAddress) -> bool {
        self.valid && self.address == address
    }

    pub fn clear(&mut self) {
        self.valid = false;
    }
}

/// Memory port for the data interface.
pub struct DataCachePort {
    pipe: ResponsePipe<u64>,
    reservation: Reservation,
    // The pipeline does not check the flush-notification ready signal until
    // the cycle after it raises valid, so the acknowledgement is delayed by
    // one cycle.
    delayed_notif_ready: bool,
}

impl DataCachePort {
    pub fn new(latency: u64) -> Self {
        Self {
            pipe: ResponsePipe::new(latency),
            reservation: Reservation::default(),
            delayed_notif_ready: false,
        }
    }

    /// Phase 1: deassert last cycle's response signals and service flush
    /// notifications.
    pub fn set_flow_control<D: DcacheDut>(&mut self, dut: &mut D) {
        dut.set_dcache_resp_valid(false);
        dut.set_dcache_ex_valid(false);

        dut.set_dcache_notif_ready(self.delayed_notif_ready);
        self.delayed_notif_ready = dut.dcache_notif_valid();

        if dut.dcache_notif_valid() {
            self.reservation.clear();
        }
    }

    /// Phase 3: sample a data request and schedule its response.
    pub fn get_inputs<D: DcacheDut>(&mut self, dut: &D, memory: &mut PagedMemory, cycle: u64) {
        if !dut.dcache_req_valid() {
            return;
        }

        let operation = MemOp::from_wire(dut.dcache_req_op())
            .unwrap_or_else(|| panic!("unsupported memory operation: {}", dut.dcache_req_op()));

        let result = self.access(dut, memory, operation);
        self.pipe.schedule(cycle, result);
    }

    fn access<D: DcacheDut>(
        &mut self,
        dut: &D,
        memory: &mut PagedMemory,
        operation: MemOp,
    ) -> Result<u64, PortException> {
        let virtual_address = dut.dcache_req_address();
        let size = dut.dcache_req_size();
        let to_exception = |fault: Fault| PortException {
            cause: fault.cause(operation),
            tval: fault.addr(),
        };

        if !aligned(virtual_address, size) {
            return Err(to_exception(Fault::Alignment(virtual_address)));
        }

        // Virtual -> physical translation if enabled.
        let atc = Atc(dut.dcache_req_atp());
        let address = translate(
            memory,
            virtual_address,
            operation,
            dut.dcache_req_supervisor(),
            dut.dcache_req_sum(),
            dut.dcache_req_mxr(),
            atc,
        )
        .map_err(to_exception)?;

        if address > MAX_PHYSICAL_ADDRESS {
            return Err(to_exception(Fault::Access(address)));
        }

        let mut data_read = read_memory(memory, operation, size, address);
        let mut operand = dut.dcache_req_value();

        // Sign extend data for signed loads and all atomics.
        if matches!(operation, MemOp::Load | MemOp::Amo | MemOp::LoadReserved) {
            let size_ext = SizeExt::from_wire(dut.dcache_req_size_ext())
                .unwrap_or_else(|| panic!("invalid size extension: {}", dut.dcache_req_size_ext()));
            let bytes = 1usize << size;
            data_read = size_extend(data_read, bytes, size_ext) as u64;
            operand = size_extend(operand, bytes, size_ext) as u64;
        }

        // Atomic data update. The bottom two bits of the amo field carry
        // ordering constraints and are ignored here.
        let data_write = if operation == MemOp::Amo {
            atomic_update(dut.dcache_req_amo() >> 2, data_read, operand)
        } else {
            operand
        };

        if operation == MemOp::LoadReserved {
            self.reservation.make(address);
        }

        if operation == MemOp::StoreConditional {
            // 0 = success, 1 = failure.
            data_read = !self.reservation.check(address) as u64;
        }

        self.write_memory(memory, operation, size, address, data_write);

        trace!(
            "dcache {:?} {:#x} -> {:#x}",
            operation,
            virtual_address,
            data_read
        );

        // Every operation sends a response: even without a payload the
        // request's completion must be signalled.
        Ok(data_read)
    }

    fn write_memory(
        &mut self,
        memory: &mut PagedMemory,
        operation: MemOp,
        size: u8,
        address: MemoryAddress,
        data: u64,
    ) {
        match operation {
            MemOp::Load | MemOp::LoadReserved | MemOp::Fetch => {}
            MemOp::StoreConditional if !self.reservation.check(address) => {
                // Failed SC: no write, reservation untouched.
            }
            MemOp::StoreConditional | MemOp::Amo | MemOp::Store => {
                match size {
                    0 => memory.write8(address, data as u8),
                    1 => memory.write16(address, data as u16),
                    2 => memory.write32(address, data as u32),
                    3 => memory.write64(address, data),
                    _ => panic!("unsupported memory request size: {}", size),
                }
                self.reservation.clear();
            }
        }
    }

    /// Phase 4: drive the head response if it is due.
    ///
    /// An exception suppresses the normal response valid; the 4-bit cause and
    /// 64-bit payload go out as three 32-bit words.
    pub fn set_outputs<D: DcacheDut>(&mut self, dut: &mut D, cycle: u64) {
        if let Some(response) = self.pipe.due_front(cycle) {
            match response.payload {
                Ok(value) => {
                    dut.set_dcache_resp_value(value);
                    dut.set_dcache_resp_valid(true);
                }
                Err(exception) => {
                    dut.set_dcache_resp_value(exception.tval);
                    dut.set_dcache_ex_valid(true);
                    dut.set_dcache_ex_exception([
                        (exception.tval & 0xFFFF_FFFF) as u32,
                        (exception.tval >> 32) as u32,
                        exception.cause as u32,
                    ]);
                }
            }
            response.all_sent = true;
        }
        self.pipe.retire_sent();
    }

    /// The port's LR/SC reservation slot.
    pub fn reservation(&self) -> &Reservation {
        &self.reservation
    }
}

fn aligned(address: MemoryAddress, log2_size: u8) -> bool {
    match log2_size {
        0 => true,
        1 => address & 0x1 == 0,
        2 => address & 0x3 == 0,
        3 => address & 0x7 == 0,
        _ => panic!("invalid alignment parameter: {}", log2_size),
    }
}

fn read_memory(
    memory: &mut PagedMemory,
    operation: MemOp,
    log2_size: u8,
    address: MemoryAddress,
) -> u64 {
    match operation {
        MemOp::Load | MemOp::LoadReserved | MemOp::Amo => match log2_size {
            0 => memory.read8(address) as u64,
            1 => memory.read16(address) as u64,
            2 => memory.read32(address) as u64,
            3 => memory.read64(address),
            _ => panic!("unsupported memory request size: {}", log2_size),
        },
        // No data read for stores.
        MemOp::Store | MemOp::StoreConditional | MemOp::Fetch => 0,
    }
}

/// Zero-extend the lowest `bytes` of `original`.
fn zero_extend(original: u64, bytes: usize) -> i64 {
    let shift = 64 - bytes * 8;
    ((original << shift) >> shift) as i64
}

/// One-extend the lowest `bytes` of `original`.
fn one_extend(original: u64, bytes: usize) -> i64 {
    !zero_extend(!original, bytes)
}

/// Sign-extend the lowest `bytes` of `original`.
fn sign_extend(original: u64, bytes: usize) -> i64 {
    let shift = 64 - bytes * 8;
    ((original as i64) << shift) >> shift
}

fn size_extend(original: u64, bytes: usize, size_ext: SizeExt) -> i64 {
    match size_ext {
        SizeExt::Zero => zero_extend(original, bytes),
        SizeExt::One => one_extend(original, bytes),
        SizeExt::Signed => sign_extend(original, bytes),
    }
}

/// Read-modify-write arithmetic for atomic operations, selected by the upper
/// bits of the AMO function field.
fn atomic_update(operation: u8, original: u64, operand: u64) -> u64 {
    match operation {
        0 => original.wrapping_add(operand),
        1 => operand,
        4 => original ^ operand,
        8 => original | operand,
        12 => original & operand,
        16 => (original as i64).min(operand as i64) as u64,
        20 => (original as i64).max(operand as i64) as u64,
        24 => original.min(operand),
        28 => original.max(operand),
        _ => panic!("unsupported atomic memory operation: {}", operation),
    }
}
