//! Fault and error definitions.
//!
//! Two distinct failure families live here:
//! 1. **Faults** — memory/translation failures that are reported back to the
//!    hardware model on the wire as RISC-V exception causes. These are values,
//!    not errors: a translation returns `Result<MemoryAddress, Fault>` and the
//!    port converts the fault into the cause matching the original operation.
//! 2. **Simulator errors** — fatal host-side problems (unreadable files, bad
//!    configuration) that terminate the run with a message.

use std::fmt;

use thiserror::Error;

use super::{MemOp, MemoryAddress};

/// RISC-V exception causes driven onto the response wires.
///
/// Only the memory-related subset is ever produced by the harness. Values are
/// the architectural cause numbers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ExcCause {
    InstrAddressMisaligned = 0,
    InstrAccessFault = 1,
    LoadAddressMisaligned = 4,
    LoadAccessFault = 5,
    StoreAddressMisaligned = 6,
    StoreAccessFault = 7,
    InstrPageFault = 12,
    LoadPageFault = 13,
    StorePageFault = 15,
}

/// A memory or translation failure, carrying the faulting address.
///
/// The address is the virtual address for page and alignment faults and the
/// physical address for access faults (which are raised after translation).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    Page(MemoryAddress),
    Access(MemoryAddress),
    Alignment(MemoryAddress),
}

impl Fault {
    /// The faulting address, reported as the exception payload.
    pub fn addr(&self) -> MemoryAddress {
        match *self {
            Fault::Page(a) | Fault::Access(a) | Fault::Alignment(a) => a,
        }
    }

    /// Converts the fault into the exception cause appropriate for the
    /// operation that triggered it. AMO and store-conditional failures report
    /// as store faults.
    pub fn cause(&self, op: MemOp) -> ExcCause {
        match self {
            Fault::Page(_) => match op {
                MemOp::Fetch => ExcCause::InstrPageFault,
                MemOp::Load | MemOp::LoadReserved => ExcCause::LoadPageFault,
                MemOp::Store | MemOp::StoreConditional | MemOp::Amo => ExcCause::StorePageFault,
            },
            Fault::Access(_) => match op {
                MemOp::Fetch => ExcCause::InstrAccessFault,
                MemOp::Load | MemOp::LoadReserved => ExcCause::LoadAccessFault,
                MemOp::Store | MemOp::StoreConditional | MemOp::Amo => ExcCause::StoreAccessFault,
            },
            Fault::Alignment(_) => match op {
                MemOp::Fetch => ExcCause::InstrAddressMisaligned,
                MemOp::Load | MemOp::LoadReserved => ExcCause::LoadAddressMisaligned,
                MemOp::Store | MemOp::StoreConditional | MemOp::Amo => {
                    ExcCause::StoreAddressMisaligned
                }
            },
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Page(a) => write!(f, "PageFault({:#x})", a),
            Fault::Access(a) => write!(f, "AccessFault({:#x})", a),
            Fault::Alignment(a) => write!(f, "AlignmentFault({:#x})", a),
        }
    }
}

impl std::error::Error for Fault {}

/// Fatal simulator-level errors. These print to stderr and end the run with a
/// non-zero exit status; nothing recovers from them.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("could not read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("received non-RISC-V binary")]
    WrongArchitecture,

    #[error("malformed ELF image: {0}")]
    MalformedElf(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown protocol selected: {0}")]
    UnknownProtocol(String),

    #[error("simulation timed out after {0} cycles")]
    Timeout(u64),
}
