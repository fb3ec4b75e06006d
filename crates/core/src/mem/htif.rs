//! Host-target interface.
//!
//! Bare-metal test programs communicate with the simulator by writing to the
//! well-known `tohost`/`fromhost` symbols. Writes to either address are
//! intercepted before they reach a memory page:
//!
//! * High 56 bits equal to `0x0101_0000_0000_00` — the low byte is a character
//!   to emit on stdout.
//! * Anything else — the write data is the exit code and the simulation ends.
//!
//! Some test suites instead treat the value `1` as "pass" (exit code 0) and
//! everything else as a failure; that convention is available behind
//! [`Htif::pass_value_one`].

use std::io::Write;

use log::info;

use crate::common::MemoryAddress;

/// Putchar requests carry this pattern in the upper 56 bits.
const PUTCHAR_TAG: u64 = 0x0101_0000_0000_0000;

/// Intercepts writes to the `tohost`/`fromhost` addresses.
#[derive(Debug)]
pub struct Htif {
    tohost: MemoryAddress,
    fromhost: MemoryAddress,
    pass_value_one: bool,
    exit_code: Option<u64>,
}

impl Htif {
    /// An address that never matches any request. Used when the ELF does not
    /// define one of the host symbols.
    pub const UNMAPPED: MemoryAddress = MemoryAddress::MAX;

    pub fn new() -> Self {
        Self {
            tohost: Self::UNMAPPED,
            fromhost: Self::UNMAPPED,
            pass_value_one: false,
            exit_code: None,
        }
    }

    /// Installs the host symbol addresses resolved from the loaded ELF.
    pub fn set_targets(&mut self, tohost: MemoryAddress, fromhost: MemoryAddress) {
        self.tohost = tohost;
        self.fromhost = fromhost;
    }

    /// Selects the "write of 1 means pass" exit convention.
    pub fn pass_value_one(&mut self, enable: bool) {
        self.pass_value_one = enable;
    }

    /// Whether a write to `address` is a host call rather than a plain store.
    pub fn intercepts(&self, address: MemoryAddress) -> bool {
        address == self.tohost || address == self.fromhost
    }

    /// Handles an intercepted write. This behaviour follows riscv-tests.
    pub fn host_write(&mut self, address: MemoryAddress, write_data: u64) {
        debug_assert!(self.intercepts(address));

        if (write_data & 0xffff_ffff_ffff_ff00) == PUTCHAR_TAG {
            let byte = (write_data & 0xff) as u8;
            let mut out = std::io::stdout();
            let _ = out.write_all(&[byte]);
            let _ = out.flush();
        } else {
            let code = if self.pass_value_one {
                if write_data == 1 { 0 } else { write_data }
            } else {
                write_data
            };
            info!("exiting with argument {}", write_data);
            self.exit_code = Some(code);
        }
    }

    /// The exit code requested by the program, once one has been written.
    pub fn exit_code(&self) -> Option<u64> {
        self.exit_code
    }
}

impl Default for Htif {
    fn default() -> Self {
        Self::new()
    }
}
