//! End-to-end driver tests with a scripted core model.

use rvtb_core::common::SimError;
use rvtb_core::{RiscvSimulation, SimConfig};

use crate::common::cores::{DataRequest, FakeCore};
use crate::common::elf::{build_elf, Section};
use crate::common::init_logging;

const TOHOST: u64 = 0x8000_1000;

fn config() -> SimConfig {
    SimConfig {
        memory_latency: 1,
        timeout: 10_000,
        ..SimConfig::default()
    }
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[test]
fn scripted_run_exits_through_tohost() {
    init_logging();

    let core = FakeCore::scripted([
        DataRequest::store(0x2000, 3, 0x1122_3344_5566_7788),
        DataRequest::load(0x2000, 3),
        DataRequest::store(TOHOST, 3, 42),
    ]);

    let mut sim = RiscvSimulation::new(core, config());
    sim.memory().htif_mut().set_targets(TOHOST, u64::MAX);

    let exit_code = sim.run().unwrap();
    assert_eq!(exit_code, 42);

    // The run ends on the tohost write; its own response is never consumed.
    assert_eq!(sim.dut().responses, vec![Ok(0), Ok(0x1122_3344_5566_7788)]);
}

#[test]
fn run_times_out_without_an_exit() {
    init_logging();

    let mut sim = RiscvSimulation::new(
        FakeCore::new(),
        SimConfig {
            timeout: 50,
            memory_latency: 1,
            ..SimConfig::default()
        },
    );

    let result = sim.run();
    assert!(matches!(result, Err(SimError::Timeout(50))));
}

#[test]
fn pass_value_one_convention_is_honoured() {
    init_logging();

    let core = FakeCore::scripted([DataRequest::store(TOHOST, 3, 1)]);
    let mut sim = RiscvSimulation::new(
        core,
        SimConfig {
            pass_value_one: true,
            memory_latency: 1,
            timeout: 1_000,
            ..SimConfig::default()
        },
    );
    sim.memory().htif_mut().set_targets(TOHOST, u64::MAX);

    assert_eq!(sim.run().unwrap(), 0);
}

#[test]
fn loaded_program_installs_entry_trampoline() {
    init_logging();

    let image = build_elf(
        0x8000_0000,
        &[Section::progbits(0x8000_0000, vec![0x13, 0, 0, 0])],
        &[("tohost", TOHOST), ("fromhost", TOHOST + 0x40)],
    );

    let core = FakeCore::scripted([DataRequest::store(TOHOST, 3, 7)]);
    let mut sim = RiscvSimulation::new(core, config());
    sim.load_program_bytes(&image, &args(&["prog"])).unwrap();

    assert_eq!(sim.run().unwrap(), 7);

    // The reset path writes the redirect stub at address zero, pointing at
    // the image's entry.
    assert_eq!(sim.memory().read64(0x00), 0x0105350300000517);
    assert_eq!(sim.memory().read64(0x08), 0x0000000000008502);
    assert_eq!(sim.memory().read64(0x10), 0x8000_0000);
}

#[test]
fn memory_latency_defers_the_exit_write() {
    init_logging();

    // With a large latency the exit write still lands in the same cycle the
    // request is processed (the response is what is delayed), so the run
    // finishes but the response never gets collected.
    let core = FakeCore::scripted([DataRequest::store(TOHOST, 3, 3)]);
    let mut sim = RiscvSimulation::new(
        core,
        SimConfig {
            memory_latency: 20,
            timeout: 1_000,
            ..SimConfig::default()
        },
    );
    sim.memory().htif_mut().set_targets(TOHOST, u64::MAX);

    assert_eq!(sim.run().unwrap(), 3);
    assert!(sim.dut().responses.is_empty());
}
