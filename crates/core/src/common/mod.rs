//! Common types shared by the memory model and the ports.

mod error;

pub use error::{ExcCause, Fault, SimError};

/// A physical or virtual address in the simulated 64-bit address space.
pub type MemoryAddress = u64;

/// The largest physical address Sv39 systems may produce (56 address bits).
///
/// Ports check translated addresses against this bound before dispatching to
/// memory; an out-of-range address is reported as an access fault.
pub const MAX_PHYSICAL_ADDRESS: MemoryAddress = (1 << 56) - 1;

/// Memory operations as encoded on the data request interface.
///
/// The numeric values match the `mem_op` encoding of the request wires and
/// must stay in sync with the RTL package.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MemOp {
    /// Instruction fetch. Never appears on the data interface; used by the
    /// walker to pick fetch-flavoured fault causes.
    Fetch = 0,
    Load = 1,
    Store = 2,
    LoadReserved = 5,
    StoreConditional = 6,
    Amo = 7,
}

impl MemOp {
    /// Decodes the wire encoding. Returns `None` for reserved values.
    pub fn from_wire(bits: u8) -> Option<Self> {
        match bits {
            1 => Some(MemOp::Load),
            2 => Some(MemOp::Store),
            5 => Some(MemOp::LoadReserved),
            6 => Some(MemOp::StoreConditional),
            7 => Some(MemOp::Amo),
            _ => None,
        }
    }

    /// Operations that read memory (AMO both reads and writes).
    pub fn reads(self) -> bool {
        matches!(self, MemOp::Load | MemOp::LoadReserved | MemOp::Amo)
    }

    /// Operations that write memory (AMO both reads and writes).
    pub fn writes(self) -> bool {
        matches!(self, MemOp::Store | MemOp::StoreConditional | MemOp::Amo)
    }
}
