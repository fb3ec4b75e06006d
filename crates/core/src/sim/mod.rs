//! Cycle drivers and the hardware-model trait surface.
//!
//! The hardware model is a pre-generated cycle-level netlist that the harness
//! only knows through named signals and an `eval()` step. [`HardwareModel`]
//! captures that contract; [`CoreModel`] adds the fetch and data interfaces a
//! RISC-V core exposes. [`RiscvSimulation`] is the driver that loads an ELF,
//! serves both memory interfaces each cycle, and ends the run when the
//! program signals an exit through `tohost`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::{error, info};

use crate::common::{MemoryAddress, SimError};
use crate::config::SimConfig;
use crate::loader;
use crate::mem::PagedMemory;
use crate::port::{DataCachePort, DcacheDut, IcacheDut, InstructionCachePort};

/// The minimal contract with a cycle-level hardware model.
pub trait HardwareModel {
    /// Re-evaluate the netlist with the current input signals.
    fn eval(&mut self);

    fn set_clock(&mut self, level: bool);

    /// Assert (`true`) or release the active reset.
    fn set_reset(&mut self, active: bool);

    /// Trace hooks. Waveform emission belongs to the netlist; models without
    /// tracing support ignore these.
    fn trace_init(&mut self, _vcd: Option<&Path>, _fst: Option<&Path>) {}
    fn trace_dump(&mut self, _half_cycles: u64) {}
    fn trace_close(&mut self) {}

    /// Called once when the simulation ends.
    fn finish(&mut self) {}
}

/// Per-instruction trace snapshot, read on PC change when CSV tracing is on.
#[derive(Clone, Copy, Debug, Default)]
pub struct TraceInfo {
    pub pc: MemoryAddress,
    pub instr_word: u32,
    pub mode: u8,
    pub gpr_written: bool,
    pub gpr: u8,
    pub gpr_data: u64,
    pub csr_written: bool,
    pub csr: u16,
    pub csr_data: u64,
}

/// A RISC-V core netlist: the base model plus both memory interfaces.
pub trait CoreModel: HardwareModel + IcacheDut + DcacheDut {
    /// Drive initial values onto the model's inputs before reset.
    fn init(&mut self) {}

    /// The architectural PC, for logging and CSV tracing.
    fn debug_pc(&self) -> MemoryAddress;

    /// Extended trace state. Only needed when CSV tracing is enabled.
    fn trace_info(&self) -> Option<TraceInfo> {
        None
    }
}

/// A simulator which can execute RISC-V binaries against a core netlist.
pub struct RiscvSimulation<D: CoreModel> {
    dut: D,
    config: SimConfig,

    memory: PagedMemory,
    instruction_port: InstructionCachePort,
    data_port: DataCachePort,

    cycle: u64,
    entry_point: MemoryAddress,

    csv: Option<BufWriter<File>>,
    last_pc: MemoryAddress,
}

impl<D: CoreModel> RiscvSimulation<D> {
    pub fn new(dut: D, config: SimConfig) -> Self {
        let latency = config.memory_latency;
        Self {
            dut,
            config,
            memory: PagedMemory::new(),
            instruction_port: InstructionCachePort::new(latency),
            data_port: DataCachePort::new(latency),
            cycle: 0,
            entry_point: 0,
            csv: None,
            last_pc: 0,
        }
    }

    pub fn memory(&mut self) -> &mut PagedMemory {
        &mut self.memory
    }

    pub fn dut(&mut self) -> &mut D {
        &mut self.dut
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Loads the program and its arguments, and wires up the host-call
    /// addresses. `args[0]` is the program path.
    pub fn load_program(&mut self, args: &[String]) -> Result<(), SimError> {
        let path = args
            .first()
            .ok_or_else(|| SimError::Config("no binary file specified".into()))?;

        let image = loader::load_elf(Path::new(path), args, &mut self.memory)?;
        self.entry_point = image.entry;
        self.memory
            .htif_mut()
            .set_targets(image.tohost, image.fromhost);
        self.memory
            .htif_mut()
            .pass_value_one(self.config.pass_value_one);
        Ok(())
    }

    /// Loads a program image already in memory; for tests and embedding.
    pub fn load_program_bytes(&mut self, bytes: &[u8], args: &[String]) -> Result<(), SimError> {
        let image = loader::load_elf_bytes(bytes, args, &mut self.memory)?;
        self.entry_point = image.entry;
        self.memory
            .htif_mut()
            .set_targets(image.tohost, image.fromhost);
        self.memory
            .htif_mut()
            .pass_value_one(self.config.pass_value_one);
        Ok(())
    }

    /// Holds reset for ten clock cycles, then installs the entry trampoline.
    pub fn reset(&mut self) {
        self.dut.set_reset(true);

        for _ in 0..10 {
            self.dut.set_clock(true);
            self.dut.eval();
            self.dut.set_clock(false);
            self.dut.eval();
        }

        self.dut.set_reset(false);
        self.write_entry_trampoline();
    }

    /// The reset vector is fixed at zero, so a small trampoline there
    /// redirects execution to the image's entry point.
    fn write_entry_trampoline(&mut self) {
        // auipc a0, 0; ld a0, 16(a0)
        self.memory.write64(0x00, 0x0105350300000517);
        // jr a0
        self.memory.write64(0x08, 0x0000000000008502);
        // target pc
        self.memory.write64(0x10, self.entry_point);
    }

    /// Runs until the program exits via `tohost` or the timeout fires.
    /// Returns the program's exit code.
    pub fn run(&mut self) -> Result<u64, SimError> {
        self.trace_init()?;

        self.dut.init();
        self.reset();

        while self.memory.htif().exit_code().is_none() {
            if self.cycle >= self.config.timeout {
                self.dut.finish();
                self.dut.trace_close();
                error!("simulation timed out after {} cycles", self.config.timeout);
                return Err(SimError::Timeout(self.config.timeout));
            }
            self.step_cycle();
        }

        self.dut.finish();
        self.dut.trace_close();
        if let Some(csv) = &mut self.csv {
            let _ = csv.flush();
        }

        Ok(self.memory.htif().exit_code().unwrap_or(0))
    }

    /// One full clock cycle.
    ///
    /// The timing requirements are delicate. The model commits state on the
    /// posedge, so responses driven last cycle must survive the posedge
    /// evaluation before flow control drops them. The model may react to
    /// newly driven responses combinationally; the negedge evaluation
    /// settles that reaction before requests are sampled.
    pub fn step_cycle(&mut self) {
        self.dut.set_clock(true);
        self.dut.eval();
        self.dut.trace_dump(2 * self.cycle);

        self.instruction_port.set_flow_control(&mut self.dut);
        self.data_port.set_flow_control(&mut self.dut);

        self.instruction_port.set_outputs(&mut self.dut, self.cycle);
        self.data_port.set_outputs(&mut self.dut, self.cycle);

        self.dut.set_clock(false);
        self.dut.eval();
        self.dut.trace_dump(2 * self.cycle + 1);

        self.instruction_port
            .get_inputs(&self.dut, &mut self.memory, self.cycle);
        self.data_port
            .get_inputs(&self.dut, &mut self.memory, self.cycle);

        self.trace_state_change();
        self.cycle += 1;
    }

    fn trace_init(&mut self) -> Result<(), SimError> {
        self.dut
            .trace_init(self.config.vcd_trace.as_deref(), self.config.fst_trace.as_deref());

        if let Some(path) = &self.config.csv_trace {
            let file = File::create(path).map_err(|e| SimError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
            let mut writer = BufWriter::new(file);
            // This is a subset of the fields instruction-trace consumers
            // expect; the rest are filled in by post-processing scripts that
            // can decode instructions.
            let _ = writeln!(writer, "pc,gpr,csr,binary,mode");
            self.csv = Some(writer);
        }
        Ok(())
    }

    fn trace_state_change(&mut self) {
        if self.dut.debug_pc() == self.last_pc {
            return;
        }
        self.last_pc = self.dut.debug_pc();
        info!("PC: {:#x}", self.last_pc);

        let (Some(csv), Some(trace)) = (&mut self.csv, self.dut.trace_info()) else {
            return;
        };

        let mut line = format!("{:016x},", trace.pc);
        if trace.gpr_written && trace.gpr != 0 {
            line.push_str(&format!("{:x}:{:016x}", trace.gpr, trace.gpr_data));
        }
        line.push(',');
        if trace.csr_written {
            line.push_str(&format!("{:x}:{:016x}", trace.csr, trace.csr_data));
        }
        line.push(',');
        line.push_str(&format!("{:08x},{}", trace.instr_word, trace.mode));
        let _ = writeln!(csv, "{}", line);
    }
}
