//! TileLink protocol testbench CLI.
//!
//! Drives the endpoint models from `rvtb_core` against the built-in crossbar
//! emulation: run directed tests by index, generate random traffic for a
//! while, or both. Legality violations are collected by the monitor and
//! reported at the end; a clean run prints "No assertions triggered".

mod directed;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use log::{warn, LevelFilter};

use rvtb_core::tilelink::config::{read_config, TlConfig};
use rvtb_core::TlSimulation;

#[derive(Parser, Debug)]
#[command(
    name = "rvtb",
    version,
    about = "TileLink protocol testbench",
    long_about = "Drive directed tests and random traffic at a TileLink network.\n\n\
                  Tests are selected by index (see --list-tests). With --run N, random\n\
                  traffic is generated for N cycles after any selected tests."
)]
struct Cli {
    /// Force end of simulation after a fixed number of cycles
    #[arg(long, default_value_t = 1_000_000)]
    timeout: u64,

    /// Endpoint configuration file (defaults to the built-in topology)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Dump VCD output to a file (only effective with a netlist binding)
    #[arg(long)]
    vcd: Option<PathBuf>,

    /// Dump FST output to a file (only effective with a netlist binding)
    #[arg(long)]
    fst: Option<PathBuf>,

    /// Dump coverage information to a file
    #[arg(long)]
    coverage: Option<PathBuf>,

    /// Set the random seed
    #[arg(long, default_value_t = 0)]
    random_seed: u64,

    /// Generate random traffic for the given duration (in cycles)
    #[arg(long, default_value_t = 0)]
    run: u64,

    /// List all available tests and exit
    #[arg(long)]
    list_tests: bool,

    /// Display basic (-v) or detailed (-vv) logging information
    #[arg(short = 'v', action = ArgAction::Count)]
    verbose: u8,

    /// Tests to run, by index
    tests: Vec<usize>,
}

/// Cycles of settling time between directed tests.
const INTER_TEST_CYCLES: u64 = 100;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new().filter_level(level).init();

    if cli.vcd.is_some() || cli.fst.is_some() {
        warn!("waveform tracing needs a netlist binding; the emulated fabric produces none");
    }

    let tests = directed::catalogue();
    if cli.list_tests {
        for (i, test) in tests.iter().enumerate() {
            println!("\t{}\t{}", i, test.description);
        }
        return ExitCode::SUCCESS;
    }

    let config = match &cli.config {
        Some(path) => match read_config(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => TlConfig::default_topology(),
    };

    let mut sim = TlSimulation::new(config, cli.random_seed);

    for &index in &cli.tests {
        let Some(test) = tests.get(index) else {
            eprintln!("no such test: {} (see --list-tests)", index);
            return ExitCode::FAILURE;
        };

        println!("Test selected: {}", test.description);
        (test.run)(&mut sim);

        // A few empty cycles to let signals propagate between tests.
        sim.idle_cycles(INTER_TEST_CYCLES);

        if sim.cycle() > cli.timeout {
            eprintln!("simulation timed out after {} cycles", cli.timeout);
            return ExitCode::FAILURE;
        }
    }

    if cli.run > 0 {
        sim.run_traffic(true, cli.run, INTER_TEST_CYCLES);
    }

    let clean = sim.finish();

    if let Some(path) = &cli.coverage {
        match serde_json::to_string_pretty(sim.coverage()) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    eprintln!("could not write coverage to {}: {}", path.display(), e);
                }
            }
            Err(e) => eprintln!("could not serialize coverage: {}", e),
        }
    }

    if clean {
        println!("No assertions triggered");
        ExitCode::SUCCESS
    } else {
        for violation in sim.violations() {
            eprintln!("assertion: {}", violation);
        }
        ExitCode::FAILURE
    }
}
