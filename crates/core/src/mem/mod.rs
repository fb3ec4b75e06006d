//! Simulated main memory.
//!
//! Uses a simple form of paging so only the parts of the 64-bit address space
//! that are actually touched get simulated. The host-target interface (magic
//! `tohost`/`fromhost` writes) is intercepted here, before data reaches a page.

mod block;
mod htif;
mod paged;

pub use block::DataBlock;
pub use htif::Htif;
pub use paged::{PagedMemory, LOG2_PAGE_SIZE, PAGE_SIZE};
