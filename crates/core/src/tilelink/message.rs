//! TileLink messages.
//!
//! A "message" is the sequence of beats which together form one request or
//! response. The header beat fixes the control fields; later beats advance
//! the address and payload by one channel width each.

use crate::tilelink::protocol::{complete_mask, AOpcode, TlA, TlB, TlC, TlD, TlE};
use crate::tilelink::random::TlRng;

/// Channel-specific beat behaviour: how beats derive from a message header,
/// and how directed tests patch individual beats.
pub trait Channel: Copy + std::fmt::Debug + std::fmt::Display {
    /// Field overrides applied to a single beat.
    type Patch: Default + Clone;

    fn name() -> &'static str;
    fn has_payload(&self) -> bool;

    /// Applies the patch's field overrides.
    fn patched(beat: Self, patch: &Self::Patch) -> Self;
    /// Whether the patch asks for the beat to be silently dropped.
    fn patch_drops(patch: &Self::Patch) -> bool;
    /// Whether the patch asks for the beat to be emitted twice.
    fn patch_duplicates(patch: &Self::Patch) -> bool;

    /// Beat `index` of a message with this header.
    fn nth_beat(header: &Self, index: u32, width_bytes: u32) -> Self;
    /// Per-beat randomized mutations (corrupt flips, partial masks).
    fn randomise_beat(beat: &mut Self, width_bytes: u32, rng: &mut TlRng);
}

/// Field overrides for one A beat. `None` leaves the field untouched.
#[derive(Clone, Debug, Default)]
pub struct APatch {
    pub opcode: Option<AOpcode>,
    pub param: Option<u8>,
    pub size: Option<u8>,
    pub source: Option<u32>,
    pub address: Option<u64>,
    pub mask: Option<u64>,
    pub corrupt: Option<bool>,
    pub data: Option<u64>,
    pub drop_beat: bool,
    pub duplicate_beat: bool,
}

/// Field overrides for one B beat.
#[derive(Clone, Debug, Default)]
pub struct BPatch {
    pub opcode: Option<crate::tilelink::protocol::BOpcode>,
    pub param: Option<u8>,
    pub size: Option<u8>,
    pub source: Option<u32>,
    pub address: Option<u64>,
    pub drop_beat: bool,
    pub duplicate_beat: bool,
}

/// Field overrides for one C beat.
#[derive(Clone, Debug, Default)]
pub struct CPatch {
    pub opcode: Option<crate::tilelink::protocol::COpcode>,
    pub param: Option<u8>,
    pub size: Option<u8>,
    pub source: Option<u32>,
    pub address: Option<u64>,
    pub corrupt: Option<bool>,
    pub data: Option<u64>,
    pub drop_beat: bool,
    pub duplicate_beat: bool,
}

/// Field overrides for one D beat.
#[derive(Clone, Debug, Default)]
pub struct DPatch {
    pub opcode: Option<crate::tilelink::protocol::DOpcode>,
    pub param: Option<u8>,
    pub size: Option<u8>,
    pub source: Option<u32>,
    pub sink: Option<u32>,
    pub denied: Option<bool>,
    pub corrupt: Option<bool>,
    pub data: Option<u64>,
    pub drop_beat: bool,
    pub duplicate_beat: bool,
}

/// Field overrides for one E beat.
#[derive(Clone, Debug, Default)]
pub struct EPatch {
    pub sink: Option<u32>,
    pub drop_beat: bool,
    pub duplicate_beat: bool,
}

macro_rules! patch_field {
    ($beat:ident, $patch:ident, $($field:ident),+) => {
        $(if let Some(value) = $patch.$field {
            $beat.$field = value;
        })+
    };
}

impl Channel for TlA {
    type Patch = APatch;

    fn name() -> &'static str {
        "A"
    }

    fn has_payload(&self) -> bool {
        self.opcode.has_payload()
    }

    fn patched(mut beat: Self, patch: &APatch) -> Self {
        patch_field!(beat, patch, opcode, param, size, source, address, mask, corrupt, data);
        beat
    }

    fn patch_drops(patch: &APatch) -> bool {
        patch.drop_beat
    }

    fn patch_duplicates(patch: &APatch) -> bool {
        patch.duplicate_beat
    }

    fn nth_beat(header: &Self, index: u32, width_bytes: u32) -> Self {
        let mut beat = *header;
        beat.address += (index * width_bytes) as u64;
        beat.data += index as u64;
        beat
    }

    fn randomise_beat(beat: &mut Self, width_bytes: u32, rng: &mut TlRng) {
        if beat.opcode == AOpcode::PutPartialData {
            beat.mask =
                complete_mask(beat.address, 1 << beat.size, width_bytes as u64) & rng.bits64();
        }
        if beat.has_payload() {
            beat.corrupt = rng.chance(0.05);
        }
    }
}

impl Channel for TlB {
    type Patch = BPatch;

    fn name() -> &'static str {
        "B"
    }

    fn has_payload(&self) -> bool {
        self.opcode.has_payload()
    }

    fn patched(mut beat: Self, patch: &BPatch) -> Self {
        patch_field!(beat, patch, opcode, param, size, source, address);
        beat
    }

    fn patch_drops(patch: &BPatch) -> bool {
        patch.drop_beat
    }

    fn patch_duplicates(patch: &BPatch) -> bool {
        patch.duplicate_beat
    }

    fn nth_beat(header: &Self, index: u32, _width_bytes: u32) -> Self {
        // All supported B messages are a single beat.
        debug_assert_eq!(index, 0);
        *header
    }

    fn randomise_beat(_beat: &mut Self, _width_bytes: u32, _rng: &mut TlRng) {}
}

impl Channel for TlC {
    type Patch = CPatch;

    fn name() -> &'static str {
        "C"
    }

    fn has_payload(&self) -> bool {
        self.opcode.has_payload()
    }

    fn patched(mut beat: Self, patch: &CPatch) -> Self {
        patch_field!(beat, patch, opcode, param, size, source, address, corrupt, data);
        beat
    }

    fn patch_drops(patch: &CPatch) -> bool {
        patch.drop_beat
    }

    fn patch_duplicates(patch: &CPatch) -> bool {
        patch.duplicate_beat
    }

    fn nth_beat(header: &Self, index: u32, width_bytes: u32) -> Self {
        let mut beat = *header;
        beat.address += (index * width_bytes) as u64;
        beat.data += index as u64;
        beat
    }

    fn randomise_beat(beat: &mut Self, _width_bytes: u32, rng: &mut TlRng) {
        if beat.has_payload() {
            beat.corrupt = rng.chance(0.05);
        }
    }
}

impl Channel for TlD {
    type Patch = DPatch;

    fn name() -> &'static str {
        "D"
    }

    fn has_payload(&self) -> bool {
        self.opcode.has_payload()
    }

    fn patched(mut beat: Self, patch: &DPatch) -> Self {
        patch_field!(beat, patch, opcode, param, size, source, sink, denied, corrupt, data);
        beat
    }

    fn patch_drops(patch: &DPatch) -> bool {
        patch.drop_beat
    }

    fn patch_duplicates(patch: &DPatch) -> bool {
        patch.duplicate_beat
    }

    fn nth_beat(header: &Self, index: u32, _width_bytes: u32) -> Self {
        let mut beat = *header;
        beat.data += index as u64;
        beat
    }

    fn randomise_beat(beat: &mut Self, _width_bytes: u32, rng: &mut TlRng) {
        if beat.has_payload() {
            beat.corrupt = beat.denied || rng.chance(0.05);
        }
    }
}

impl Channel for TlE {
    type Patch = EPatch;

    fn name() -> &'static str {
        "E"
    }

    fn has_payload(&self) -> bool {
        false
    }

    fn patched(mut beat: Self, patch: &EPatch) -> Self {
        patch_field!(beat, patch, sink);
        beat
    }

    fn patch_drops(patch: &EPatch) -> bool {
        patch.drop_beat
    }

    fn patch_duplicates(patch: &EPatch) -> bool {
        patch.duplicate_beat
    }

    fn nth_beat(header: &Self, index: u32, _width_bytes: u32) -> Self {
        // All E messages are a single beat.
        debug_assert_eq!(index, 0);
        *header
    }

    fn randomise_beat(_beat: &mut Self, _width_bytes: u32, _rng: &mut TlRng) {}
}

/// One in-flight message on a channel end.
#[derive(Clone, Debug)]
pub struct TlMessage<C: Channel> {
    /// First beat of the message, carrying all control signals.
    pub header: C,
    width_bytes: u32,
    beats_to_send: u32,
    beats_generated: u32,
}

impl<C: Channel> TlMessage<C> {
    /// A message with an explicit beat count. Generating fewer beats than the
    /// size implies lets directed tests insert specific content later.
    pub fn with_beats(header: C, width_bytes: u32, num_beats: u32) -> Self {
        assert!(num_beats > 0);
        assert!(width_bytes > 0);
        Self {
            header,
            width_bytes,
            beats_to_send: num_beats,
            beats_generated: 0,
        }
    }

    /// Whether any beat has been emitted yet.
    pub fn in_progress(&self) -> bool {
        self.beats_generated > 0
    }

    pub fn finished(&self) -> bool {
        self.beats_generated == self.beats_to_send
    }

    /// 1-based index of the most recently generated beat, for logging.
    pub fn current_beat(&self) -> u32 {
        self.beats_generated
    }

    pub fn total_beats(&self) -> u32 {
        self.beats_to_send
    }

    /// Rolls back the beat counter by one. Used when a driven beat is
    /// retracted before acceptance, and by directed tests to force extra
    /// beats into a burst.
    pub fn unsend(&mut self) {
        debug_assert!(self.beats_generated > 0);
        self.beats_generated -= 1;
    }

    /// Produces the next beat, advancing address and payload offsets.
    pub fn next_beat(&mut self, rng: Option<&mut TlRng>) -> C {
        debug_assert!(!self.finished());
        let mut beat = C::nth_beat(&self.header, self.beats_generated, self.width_bytes);
        if let Some(rng) = rng {
            C::randomise_beat(&mut beat, self.width_bytes, rng);
        }
        self.beats_generated += 1;
        beat
    }
}
