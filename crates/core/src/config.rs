//! Simulation parameters.

use std::path::PathBuf;

use serde::Deserialize;

mod defaults {
    /// Force end of simulation after this many cycles unless overridden.
    pub const TIMEOUT: u64 = 1_000_000;

    /// Cycles between a request arriving at main memory and the response
    /// leaving.
    pub const MEMORY_LATENCY: u64 = 10;
}

/// Parameters of one simulation run.
///
/// Deserializable so that external drivers can supply it as JSON; the CLI
/// builds it from flags.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Cycle cap; exceeding it is a fatal error.
    pub timeout: u64,

    /// Memory port latency in cycles.
    pub memory_latency: u64,

    /// Treat a `tohost` write of 1 as a pass (exit code 0) instead of taking
    /// the written value as the exit code.
    pub pass_value_one: bool,

    /// Per-instruction CSV trace output.
    pub csv_trace: Option<PathBuf>,

    /// Waveform outputs, forwarded to the hardware model's trace hooks. At
    /// most one of these is honoured per build.
    pub vcd_trace: Option<PathBuf>,
    pub fst_trace: Option<PathBuf>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            timeout: defaults::TIMEOUT,
            memory_latency: defaults::MEMORY_LATENCY,
            pass_value_one: false,
            csv_trace: None,
            vcd_trace: None,
            fst_trace: None,
        }
    }
}
