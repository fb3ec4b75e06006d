//! Sv39 address translation.

mod pte;
mod ptw;
mod sv39;

pub use pte::PageTableEntry;
pub use ptw::translate;
pub use sv39::{Atc, AtpMode, Sv39Addr, LEVELS, PAGESIZE, PTESIZE, VALEN, XLEN};
