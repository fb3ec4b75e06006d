//! TileLink protocol testbench.
//!
//! Models both ends of a TileLink interconnect: host and device endpoints
//! with all five channels (A–E), randomized and directed message generation,
//! source/sink ID accounting, and a legality monitor standing in for the
//! RTL assertion checker. The interconnect itself is reached through the
//! [`TlNetwork`] signal trait; [`fabric::CrossbarFabric`] provides an
//! in-crate emulation so everything runs without a netlist.

pub mod config;
pub mod endpoint;
pub mod fabric;
pub mod harness;
pub mod message;
pub mod monitor;
pub mod protocol;
pub mod random;

pub use config::{EndpointConfig, TlConfig};
pub use endpoint::{DeviceEndpoint, HostEndpoint, TlNetwork, Topology};
pub use harness::TlSimulation;
pub use protocol::{AOpcode, BOpcode, COpcode, DOpcode, TlA, TlB, TlC, TlD, TlE, TlProtocol};
