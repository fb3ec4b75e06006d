//! TileLink wire-level definitions: protocol profiles, opcodes, permission
//! parameters, and the per-channel beat layouts.

use std::fmt;

/// Protocol conformance levels, ordered so that comparison gives the set
/// relation `TL-UL ⊂ TL-UH ⊂ TL-C`.
///
/// The two TERM variants exist for converter components which terminate
/// coherence traffic and instantly deny some requests; the traffic generator
/// does not track those follow-on dependencies, so such components advertise
/// a restricted operation set instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum TlProtocol {
    Ul = 0,
    Uh = 1,
    CIoTerm = 2,
    CRomTerm = 3,
    C = 4,
}

impl TlProtocol {
    /// The highest protocol level two link partners have in common.
    pub fn common(self, other: TlProtocol) -> TlProtocol {
        self.min(other)
    }

    /// Whether this endpoint participates in the coherence channels (B/C/E).
    pub fn is_coherent(self) -> bool {
        self == TlProtocol::C
    }
}

/// A-channel opcodes (host → device requests).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum AOpcode {
    PutFullData = 0,
    PutPartialData = 1,
    ArithmeticData = 2,
    LogicalData = 3,
    Get = 4,
    Intent = 5,
    AcquireBlock = 6,
    AcquirePerm = 7,
}

impl AOpcode {
    pub fn has_payload(self) -> bool {
        matches!(
            self,
            AOpcode::PutFullData
                | AOpcode::PutPartialData
                | AOpcode::ArithmeticData
                | AOpcode::LogicalData
        )
    }

    /// Opcodes whose byte mask must exactly cover the requested size.
    pub fn is_full(self) -> bool {
        !matches!(self, AOpcode::PutPartialData)
    }

    /// The opcodes legal at each protocol level.
    pub fn legal_for(protocol: TlProtocol) -> &'static [AOpcode] {
        const TL_UL: &[AOpcode] = &[AOpcode::PutFullData, AOpcode::PutPartialData, AOpcode::Get];
        const TL_UH: &[AOpcode] = &[
            AOpcode::PutFullData,
            AOpcode::PutPartialData,
            AOpcode::Get,
            AOpcode::ArithmeticData,
            AOpcode::LogicalData,
            AOpcode::Intent,
        ];
        const TL_C: &[AOpcode] = &[
            AOpcode::PutFullData,
            AOpcode::PutPartialData,
            AOpcode::Get,
            AOpcode::ArithmeticData,
            AOpcode::LogicalData,
            AOpcode::Intent,
            AOpcode::AcquireBlock,
            AOpcode::AcquirePerm,
        ];

        match protocol {
            TlProtocol::Ul => TL_UL,
            TlProtocol::Uh => TL_UH,
            _ => TL_C,
        }
    }

    /// The range of legal `param` values for this opcode.
    pub fn param_legal(self, param: u8) -> bool {
        match self {
            AOpcode::PutFullData | AOpcode::PutPartialData | AOpcode::Get => param == 0,
            AOpcode::ArithmeticData => param <= 4,
            AOpcode::LogicalData => param <= 3,
            AOpcode::Intent => param <= 1,
            AOpcode::AcquireBlock | AOpcode::AcquirePerm => param <= 2,
        }
    }
}

/// B-channel opcodes (device → host probes). Forwarded A messages are not
/// supported, so only the probe pair exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BOpcode {
    ProbeBlock = 6,
    ProbePerm = 7,
}

impl BOpcode {
    pub fn has_payload(self) -> bool {
        false
    }
}

/// C-channel opcodes (host → device responses and releases). Forwarded C
/// messages are not supported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum COpcode {
    ProbeAck = 4,
    ProbeAckData = 5,
    Release = 6,
    ReleaseData = 7,
}

impl COpcode {
    pub fn has_payload(self) -> bool {
        matches!(self, COpcode::ProbeAckData | COpcode::ReleaseData)
    }

    pub fn requires_response(self) -> bool {
        matches!(self, COpcode::Release | COpcode::ReleaseData)
    }
}

/// D-channel opcodes (device → host responses).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DOpcode {
    AccessAck = 0,
    AccessAckData = 1,
    HintAck = 2,
    Grant = 4,
    GrantData = 5,
    ReleaseAck = 6,
}

impl DOpcode {
    pub fn has_payload(self) -> bool {
        matches!(self, DOpcode::AccessAckData | DOpcode::GrantData)
    }

    pub fn requires_response(self) -> bool {
        matches!(self, DOpcode::Grant | DOpcode::GrantData)
    }

    /// The responses a request opcode may legally receive.
    pub fn legal_response_to(request: AOpcode) -> &'static [DOpcode] {
        match request {
            AOpcode::PutFullData | AOpcode::PutPartialData => &[DOpcode::AccessAck],
            AOpcode::ArithmeticData | AOpcode::LogicalData | AOpcode::Get => {
                &[DOpcode::AccessAckData]
            }
            AOpcode::Intent => &[DOpcode::HintAck],
            AOpcode::AcquireBlock => &[DOpcode::Grant, DOpcode::GrantData],
            AOpcode::AcquirePerm => &[DOpcode::Grant],
        }
    }

    pub fn param_legal(self, param: u8) -> bool {
        match self {
            DOpcode::Grant | DOpcode::GrantData => param <= 2,
            _ => param == 0,
        }
    }
}

// Permission transfer parameter values.
pub mod param {
    pub const ARITHMETIC_MIN: u8 = 0;
    pub const ARITHMETIC_MAX: u8 = 1;
    pub const ARITHMETIC_MINU: u8 = 2;
    pub const ARITHMETIC_MAXU: u8 = 3;
    pub const ARITHMETIC_ADD: u8 = 4;

    pub const LOGICAL_XOR: u8 = 0;
    pub const LOGICAL_OR: u8 = 1;
    pub const LOGICAL_AND: u8 = 2;
    pub const LOGICAL_SWAP: u8 = 3;

    pub const INTENT_PREFETCH_READ: u8 = 0;
    pub const INTENT_PREFETCH_WRITE: u8 = 1;

    pub const CAP_TO_T: u8 = 0;
    pub const CAP_TO_B: u8 = 1;
    pub const CAP_TO_N: u8 = 2;

    pub const GROW_N_TO_B: u8 = 0;
    pub const GROW_N_TO_T: u8 = 1;
    pub const GROW_B_TO_T: u8 = 2;

    pub const PRUNE_T_TO_B: u8 = 0;
    pub const PRUNE_T_TO_N: u8 = 1;
    pub const PRUNE_B_TO_N: u8 = 2;

    pub const REPORT_T_TO_T: u8 = 3;
    pub const REPORT_B_TO_B: u8 = 4;
    pub const REPORT_N_TO_N: u8 = 5;
}

/// One A-channel beat.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TlA {
    pub opcode: AOpcode,
    pub param: u8,
    /// log2 of the transfer size in bytes.
    pub size: u8,
    pub source: u32,
    pub address: u64,
    pub mask: u64,
    pub corrupt: bool,
    pub data: u64,
}

impl Default for TlA {
    fn default() -> Self {
        Self {
            opcode: AOpcode::Get,
            param: 0,
            size: 0,
            source: 0,
            address: 0,
            mask: 0,
            corrupt: false,
            data: 0,
        }
    }
}

/// One B-channel beat.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TlB {
    pub opcode: BOpcode,
    pub param: u8,
    pub size: u8,
    pub source: u32,
    pub address: u64,
}

impl Default for TlB {
    fn default() -> Self {
        Self {
            opcode: BOpcode::ProbeBlock,
            param: 0,
            size: 0,
            source: 0,
            address: 0,
        }
    }
}

/// One C-channel beat.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TlC {
    pub opcode: COpcode,
    pub param: u8,
    pub size: u8,
    pub source: u32,
    pub address: u64,
    pub corrupt: bool,
    pub data: u64,
}

impl Default for TlC {
    fn default() -> Self {
        Self {
            opcode: COpcode::ProbeAck,
            param: 0,
            size: 0,
            source: 0,
            address: 0,
            corrupt: false,
            data: 0,
        }
    }
}

/// One D-channel beat.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TlD {
    pub opcode: DOpcode,
    pub param: u8,
    pub size: u8,
    pub source: u32,
    pub sink: u32,
    pub denied: bool,
    pub corrupt: bool,
    pub data: u64,
}

impl Default for TlD {
    fn default() -> Self {
        Self {
            opcode: DOpcode::AccessAck,
            param: 0,
            size: 0,
            source: 0,
            sink: 0,
            denied: false,
            corrupt: false,
            data: 0,
        }
    }
}

/// One E-channel beat.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TlE {
    pub sink: u32,
}

impl fmt::Display for TlA {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "A[{:?} param={} size={} src={} addr={:#x} mask={:#x} corrupt={} data={:#x}]",
            self.opcode,
            self.param,
            self.size,
            self.source,
            self.address,
            self.mask,
            self.corrupt as u8,
            self.data
        )
    }
}

impl fmt::Display for TlB {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "B[{:?} param={} size={} src={} addr={:#x}]",
            self.opcode, self.param, self.size, self.source, self.address
        )
    }
}

impl fmt::Display for TlC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "C[{:?} param={} size={} src={} addr={:#x} corrupt={} data={:#x}]",
            self.opcode,
            self.param,
            self.size,
            self.source,
            self.address,
            self.corrupt as u8,
            self.data
        )
    }
}

impl fmt::Display for TlD {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "D[{:?} param={} size={} src={} sink={} denied={} corrupt={} data={:#x}]",
            self.opcode,
            self.param,
            self.size,
            self.source,
            self.sink,
            self.denied as u8,
            self.corrupt as u8,
            self.data
        )
    }
}

impl fmt::Display for TlE {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E[sink={}]", self.sink)
    }
}

/// Rounds `address` down to a multiple of `unit`.
pub fn align(address: u64, unit: u64) -> u64 {
    address - (address % unit)
}

/// The byte mask with every lane of a request active.
///
/// Requests at least as large as the channel set all bits; narrower requests
/// set a contiguous group positioned by the address within the channel.
pub fn complete_mask(address: u64, size_bytes: u64, channel_bytes: u64) -> u64 {
    if size_bytes >= channel_bytes {
        lane_mask(channel_bytes)
    } else {
        let mask = lane_mask(size_bytes);
        mask << (address % channel_bytes)
    }
}

/// The all-lanes mask for a transfer of `size` (log2 bytes).
pub fn full_mask(size: u8) -> u64 {
    lane_mask(1u64 << size)
}

fn lane_mask(bytes: u64) -> u64 {
    if bytes >= 64 {
        u64::MAX
    } else {
        (1u64 << bytes) - 1
    }
}

/// Converts a channel width in bits to the `size` of a single beat.
pub fn bits_to_size(bits: u32) -> u8 {
    debug_assert!(bits >= 8 && bits.is_power_of_two());
    ((bits / 8).trailing_zeros()) as u8
}

/// The number of beats in a message of `size` (log2 bytes), given whether the
/// opcode carries a payload.
pub fn num_beats(has_payload: bool, size: u8, channel_width_bytes: u32) -> u32 {
    if has_payload {
        ((1u64 << size) as u32 / channel_width_bytes).max(1)
    } else {
        1
    }
}
