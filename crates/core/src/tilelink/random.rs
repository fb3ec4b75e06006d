//! Seeded randomness for traffic generation.
//!
//! All randomized decisions in the testbench flow through [`TlRng`] so a run
//! is reproducible from its `--random-seed`.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::tilelink::protocol::{AOpcode, BOpcode, COpcode, TlProtocol};

pub struct TlRng(StdRng);

impl TlRng {
    pub fn new(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }

    /// Uniform sample; both bounds inclusive.
    pub fn sample(&mut self, min: u64, max: u64) -> u64 {
        self.0.gen_range(min..=max)
    }

    pub fn chance(&mut self, probability: f64) -> bool {
        self.0.gen_bool(probability)
    }

    pub fn bits64(&mut self) -> u64 {
        self.0.gen()
    }

    pub fn a_opcode(&mut self, protocol: TlProtocol) -> AOpcode {
        let legal = AOpcode::legal_for(protocol);
        legal[self.sample(0, legal.len() as u64 - 1) as usize]
    }

    pub fn b_opcode(&mut self) -> BOpcode {
        if self.chance(0.5) {
            BOpcode::ProbeBlock
        } else {
            BOpcode::ProbePerm
        }
    }

    /// A spontaneous C request: only Release(Data) can happen without a
    /// preceding probe, and ROM-terminated converters never see the payload
    /// form.
    pub fn c_request_opcode(&mut self, protocol: TlProtocol) -> COpcode {
        match protocol {
            TlProtocol::CRomTerm => COpcode::Release,
            _ => {
                if self.chance(0.5) {
                    COpcode::Release
                } else {
                    COpcode::ReleaseData
                }
            }
        }
    }

    pub fn arithmetic_param(&mut self) -> u8 {
        self.sample(0, 4) as u8
    }

    pub fn logical_param(&mut self) -> u8 {
        self.sample(0, 3) as u8
    }

    pub fn intent_param(&mut self) -> u8 {
        self.sample(0, 1) as u8
    }

    pub fn cap_permission(&mut self) -> u8 {
        self.sample(0, 2) as u8
    }

    pub fn grow_permission(&mut self) -> u8 {
        self.sample(0, 2) as u8
    }

    pub fn prune_permission(&mut self) -> u8 {
        self.sample(0, 2) as u8
    }

    pub fn report_permission(&mut self) -> u8 {
        self.sample(3, 5) as u8
    }

    /// A prune or report permission, evenly split.
    pub fn shrink_permission(&mut self) -> u8 {
        if self.chance(0.5) {
            self.prune_permission()
        } else {
            self.report_permission()
        }
    }
}
