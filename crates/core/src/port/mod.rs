//! Latency-pipelined memory ports.
//!
//! A port adapts one hardware memory interface to the paged memory model.
//! Every cycle, the driver invokes the port's phases in a fixed order around
//! the model's two half-cycle evaluations:
//!
//! 1. Posedge `eval()` — the model commits last cycle's response signals.
//! 2. `set_flow_control` — drop the response signals the model consumed.
//! 3. `set_outputs` — if the head of the response queue is due, drive the
//!    response signals.
//! 4. Negedge `eval()` — the model reacts to the newly driven response.
//! 5. `get_inputs` — if the model asserts a request, perform it against
//!    memory and enqueue a response due `latency` cycles later.
//!
//! The split is mandatory: it avoids combinational loops through the model
//! and still allows single-cycle cache-hit latency.

mod dcache;
mod icache;
mod uncached;

use std::collections::VecDeque;

use crate::common::{ExcCause, MemoryAddress};

pub use dcache::{DataCachePort, DcacheDut, Reservation, SizeExt};
pub use icache::{IcacheDut, InstructionCachePort};
pub use uncached::{UncachedDut, UncachedPort};

/// An exception to be reported on the wire instead of a normal response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PortException {
    pub cause: ExcCause,
    /// The faulting address, driven as the exception payload.
    pub tval: MemoryAddress,
}

/// One queued response: the payload (or exception), and the cycle it becomes
/// visible to the hardware model.
#[derive(Debug)]
pub struct MemoryResponse<T> {
    pub due_cycle: u64,
    pub payload: Result<T, PortException>,
    pub all_sent: bool,
}

/// The latency queue shared by all port flavours.
///
/// Responses are delivered strictly in arrival order; at most one response is
/// presented per cycle once its delivery cycle is reached.
#[derive(Debug)]
pub struct ResponsePipe<T> {
    latency: u64,
    responses: VecDeque<MemoryResponse<T>>,
}

impl<T> ResponsePipe<T> {
    pub fn new(latency: u64) -> Self {
        assert!(latency >= 1, "memory latency must be at least one cycle");
        Self {
            latency,
            responses: VecDeque::new(),
        }
    }

    /// Queues a response for a request observed in `cycle`. It becomes
    /// deliverable in `cycle + latency`.
    pub fn schedule(&mut self, cycle: u64, payload: Result<T, PortException>) {
        self.responses.push_back(MemoryResponse {
            due_cycle: cycle + self.latency,
            payload,
            all_sent: false,
        });
    }

    /// The head response, if it is due in `cycle`.
    pub fn due_front(&mut self, cycle: u64) -> Option<&mut MemoryResponse<T>> {
        self.responses
            .front_mut()
            .filter(|resp| resp.due_cycle <= cycle)
    }

    /// Removes the head response once it has been fully consumed.
    pub fn retire_sent(&mut self) {
        if self.responses.front().is_some_and(|r| r.all_sent) {
            self.responses.pop_front();
        }
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}
