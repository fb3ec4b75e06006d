//! Software-side verification harness core for a RISC-V processor.
//!
//! This crate implements the two simulation substrates the hardware testbenches
//! are built on:
//! 1. **Memory model:** Sparse paged physical memory, ELF image loading, an Sv39
//!    page-table walker, and latency-pipelined memory ports (instruction fetch,
//!    data access with atomics and LR/SC, raw word ports).
//! 2. **TileLink testbench:** Host/device endpoint models for channels A–E with
//!    randomized and directed traffic, message/beat generation, transaction ID
//!    accounting, and a protocol legality monitor.
//!
//! The hardware model itself is external: components talk to it through the
//! signal-level traits in [`sim`] and [`tilelink`], and an in-crate crossbar
//! emulation stands in for the netlist so the testbench runs standalone.

/// Common types: addresses, memory operations, faults, exception causes.
pub mod common;
/// Simulation parameters (latency, timeout, trace outputs).
pub mod config;
/// ELF image loading and boot argument setup.
pub mod loader;
/// Sparse paged physical memory and the host-target interface.
pub mod mem;
/// Sv39 address translation (control register, PTEs, the walker).
pub mod mmu;
/// Latency-pipelined memory ports (instruction, data, uncached word).
pub mod port;
/// Cycle drivers and the hardware-model trait surface.
pub mod sim;
/// TileLink protocol testbench (endpoints, messages, monitor, fabric).
pub mod tilelink;

pub use crate::config::SimConfig;
pub use crate::mem::PagedMemory;
pub use crate::sim::RiscvSimulation;
pub use crate::tilelink::harness::TlSimulation;
