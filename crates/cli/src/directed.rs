//! Directed test catalogue.
//!
//! Each test scripts a specific stimulus against the network: the first
//! group should complete with no legality violations, the rest deliberately
//! drive one illegal condition each so the monitor's checks can be
//! exercised one at a time.

use rvtb_core::tilelink::message::{APatch, DPatch};
use rvtb_core::tilelink::protocol::{AOpcode, DOpcode};
use rvtb_core::TlSimulation;

pub struct TlTest {
    pub description: &'static str,
    pub run: fn(&mut TlSimulation),
}

/// Cycles of deterministic settling used by the illegal-stimulus tests.
const RUN_CYCLES: u64 = 1000;
const DRAIN_CYCLES: u64 = 100;

// ── Tests which should trigger no assertions ─────────────────────────────

fn valid_write_operation(sim: &mut TlSimulation) {
    let request = sim.new_a_request(0);
    sim.start_a_transaction(0, request.source);
    sim.send_a(0, request);

    let req_received = sim.await_device_a(0);
    assert_eq!(req_received.address, request.address);
    assert_eq!(req_received.opcode, request.opcode);
    assert_eq!(req_received.mask, request.mask);
    assert_eq!(req_received.data, request.data);

    let resp_received = sim.await_host_d(0);
    assert!(!resp_received.denied);
    assert!(!resp_received.corrupt);
    assert_eq!(resp_received.source, request.source);
    assert_eq!(resp_received.opcode, DOpcode::AccessAck); // For Put requests
}

fn valid_read_operation(sim: &mut TlSimulation) {
    let mut request = sim.new_a_request(1);
    request.opcode = AOpcode::Get;
    sim.start_a_transaction(1, request.source);
    sim.send_a(1, request);
    sim.change_next_d_beat(
        0,
        DPatch {
            data: Some(0x1234),
            ..DPatch::default()
        },
    );

    let req_received = sim.await_device_a(0);
    assert_eq!(req_received.address, request.address);
    assert_eq!(req_received.opcode, request.opcode);
    assert_eq!(req_received.mask, request.mask);

    let resp_received = sim.await_host_d(1);
    assert!(!resp_received.denied);
    assert!(!resp_received.corrupt);
    assert_eq!(resp_received.data, 0x1234);
    assert_eq!(resp_received.source, request.source);
    assert_eq!(resp_received.opcode, DOpcode::AccessAckData); // Get and atomics
}

fn valid_dev1_operation(sim: &mut TlSimulation) {
    let mut request = sim.new_a_request(1);
    request.address = sim.device_address(0x3000, 1);
    sim.start_a_transaction(1, request.source);
    sim.send_a(1, request);

    let req_received = sim.await_device_a(1);
    assert_eq!(req_received.address, request.address);
    assert_eq!(req_received.opcode, request.opcode);
    assert_eq!(req_received.mask, request.mask);
    assert_eq!(req_received.data, request.data);

    let resp_received = sim.await_host_d(1);
    assert!(!resp_received.denied);
    assert!(!resp_received.corrupt);
    assert_eq!(resp_received.source, request.source);
    assert_eq!(resp_received.opcode, DOpcode::AccessAck);
}

fn multiple_valid_requests(sim: &mut TlSimulation) {
    let dev0_request = sim.new_a_request(0);
    sim.start_a_transaction(0, dev0_request.source);
    sim.send_a(0, dev0_request);

    let mut dev1_request = sim.new_a_request(1);
    dev1_request.address = sim.device_address(0x3000, 1);
    sim.start_a_transaction(1, dev1_request.source);
    sim.send_a(1, dev1_request);

    let _dev0_received = sim.await_device_a(0);
    let _dev1_received = sim.await_device_a(1);

    let dev0_d = sim.await_host_d(0);
    assert!(!dev0_d.denied);
    assert!(!dev0_d.corrupt);
    assert_eq!(dev0_d.source, dev0_request.source);
    assert_eq!(dev0_d.opcode, DOpcode::AccessAck);

    let dev1_d = sim.await_host_d(1);
    assert!(!dev1_d.denied);
    assert!(!dev1_d.corrupt);
    assert_eq!(dev1_d.source, dev1_request.source);
    assert_eq!(dev1_d.opcode, DOpcode::AccessAck);
}

fn multibeat_tlc(sim: &mut TlSimulation) {
    let mut request = sim.new_a_request(0);
    request.size = 4; // 2^4 = 16 bytes = 2 beats
    sim.start_a_transaction(0, request.source);
    sim.send_a(0, request);

    let req_received = sim.await_device_a(0);
    assert_eq!(req_received.data, request.data);

    let mut request2 = request;
    request2.address += 8;
    request2.data = 0x87654321;
    sim.send_a(0, request2);

    // Wait at least one cycle so there is time for the previous beat to go
    // invalid.
    sim.next_cycle();

    let req2_received = sim.await_device_a(0);
    assert_eq!(req2_received.data, request2.data);

    let _resp_received = sim.await_host_d(0);
}

fn multibeat_tlul(sim: &mut TlSimulation) {
    // Multibeat messages are illegal on TL-UL itself; an adapter in the
    // network is expected to split them.
    let mut request = sim.new_a_request(0);
    request.size = 4;
    request.address = sim.device_address(0x3000, 2);
    sim.start_a_transaction(0, request.source);
    sim.send_a(0, request);

    let mut request2 = request;
    request2.address += 8;
    request2.data = 0x87654321;
    sim.send_a(0, request2);

    let req_received = sim.await_device_a(2);
    assert_eq!(req_received.data, request.data);

    sim.next_cycle();

    let req2_received = sim.await_device_a(2);
    assert_eq!(req2_received.data, request2.data);

    let _resp_received = sim.await_host_d(0);
}

fn a_corrupt_payload(sim: &mut TlSimulation) {
    // Requests with data payloads are allowed to be marked corrupt.
    let mut request = sim.new_a_request(0);
    request.corrupt = true;
    sim.start_a_transaction(0, request.source);
    sim.send_a(0, request);

    let _req_received = sim.await_device_a(0);
    let _resp_received = sim.await_host_d(0);
}

fn all_passing_tests(sim: &mut TlSimulation) {
    valid_write_operation(sim);
    valid_read_operation(sim);
    valid_dev1_operation(sim);
    multiple_valid_requests(sim);
    multibeat_tlc(sim);
    multibeat_tlul(sim);
    a_corrupt_payload(sim);
}

// ── Illegal stimulus on channel A ────────────────────────────────────────

fn a_illegal_opcode(sim: &mut TlSimulation) {
    // Send a TL-UH request to a TL-UL device.
    sim.queue_a_request(
        0,
        &APatch {
            opcode: Some(AOpcode::ArithmeticData),
            address: Some(sim.device_address(0x3000, 2)),
            ..APatch::default()
        },
    );

    sim.run_traffic(false, RUN_CYCLES, DRAIN_CYCLES);
}

fn a_illegal_param(sim: &mut TlSimulation) {
    sim.queue_a_request(
        0,
        &APatch {
            opcode: Some(AOpcode::PutFullData),
            param: Some(2), // Only 0 allowed
            ..APatch::default()
        },
    );

    sim.run_traffic(false, RUN_CYCLES, DRAIN_CYCLES);
}

fn a_size_too_small(sim: &mut TlSimulation) {
    sim.queue_a_request(
        0,
        &APatch {
            opcode: Some(AOpcode::Get),
            size: Some(1),    // 2^1 = 2 byte request
            mask: Some(0xF),  // 4 bits implies 4 bytes
            ..APatch::default()
        },
    );

    sim.run_traffic(false, RUN_CYCLES, DRAIN_CYCLES);
}

fn a_size_mask_mismatch(sim: &mut TlSimulation) {
    sim.queue_a_request(
        0,
        &APatch {
            opcode: Some(AOpcode::PutFullData),
            size: Some(3),    // 2^3 = 8 byte request
            mask: Some(0xF),  // 4 bits implies 4 bytes
            ..APatch::default()
        },
    );

    sim.run_traffic(false, RUN_CYCLES, DRAIN_CYCLES);
}

fn a_unaligned_address(sim: &mut TlSimulation) {
    sim.queue_a_request(
        0,
        &APatch {
            size: Some(3),
            address: Some(0x3001),
            ..APatch::default()
        },
    );

    sim.run_traffic(false, RUN_CYCLES, DRAIN_CYCLES);
}

fn a_multibeat_addr_inc(sim: &mut TlSimulation) {
    // Multibeat requests must increment the address by the bus width.
    sim.queue_a_request(
        0,
        &APatch {
            opcode: Some(AOpcode::PutFullData),
            size: Some(4), // 2 beats
            address: Some(0x3000),
            ..APatch::default()
        },
    );
    sim.change_next_a_beat(0, APatch::default()); // First beat as-is
    sim.change_next_a_beat(
        0,
        APatch {
            address: Some(0x3000), // Increment of 0
            ..APatch::default()
        },
    );

    sim.run_traffic(false, RUN_CYCLES, DRAIN_CYCLES);
}

fn a_multibeat_ctrl_const(sim: &mut TlSimulation) {
    // Multibeat requests must keep opcode, param, size, and source constant.
    sim.queue_a_request(
        0,
        &APatch {
            opcode: Some(AOpcode::PutFullData),
            size: Some(4),
            ..APatch::default()
        },
    );
    sim.change_next_a_beat(0, APatch::default()); // First beat as-is
    sim.change_next_a_beat(
        0,
        APatch {
            size: Some(3), // Not allowed
            ..APatch::default()
        },
    );

    sim.run_traffic(false, RUN_CYCLES, DRAIN_CYCLES);
}

fn a_too_many_beats(sim: &mut TlSimulation) {
    // Lower-level methods are needed to force the extra beat.
    let mut request = sim.new_a_request(0);
    request.size = 4; // 16 bytes = 2 beats
    sim.send_a(0, request);

    let req_received = sim.await_device_a(0);
    assert_eq!(req_received.data, request.data);

    let mut request2 = request;
    request2.address += 8;
    request2.data = 0x87654321;
    sim.send_a(0, request2);
    sim.next_cycle();

    let req2_received = sim.await_device_a(0);
    assert_eq!(req2_received.data, request2.data);

    let mut request3 = request2;
    request3.address += 8;
    request3.data = 0x18273645;
    sim.send_a(0, request3);
    sim.next_cycle();

    let req3_received = sim.await_device_a(0);
    assert_eq!(req3_received.data, request3.data);

    let response = sim.new_d_response(0, &req3_received);
    sim.send_d(0, response);

    let _resp_received = sim.await_host_d(0);
}

fn a_too_few_beats(sim: &mut TlSimulation) {
    // Lower-level methods are needed to force the early response.
    let mut request = sim.new_a_request(0);
    request.size = 4; // 16 bytes = 2 beats
    sim.send_a(0, request);

    let req_received = sim.await_device_a(0);
    assert_eq!(req_received.data, request.data);

    let response = sim.new_d_response(0, &req_received);
    sim.send_d(0, response);

    let _resp_received = sim.await_host_d(0);
}

fn a_noncontiguous_mask(sim: &mut TlSimulation) {
    sim.queue_a_request(
        0,
        &APatch {
            opcode: Some(AOpcode::Get),
            size: Some(2),
            mask: Some(0x33), // In binary: 00110011
            ..APatch::default()
        },
    );

    sim.run_traffic(false, RUN_CYCLES, DRAIN_CYCLES);
}

fn a_multibeat_bad_mask(sim: &mut TlSimulation) {
    // Every beat of a multibeat request must drive the full mask.
    sim.queue_a_request(
        0,
        &APatch {
            opcode: Some(AOpcode::PutFullData),
            size: Some(4),
            ..APatch::default()
        },
    );
    sim.change_next_a_beat(0, APatch::default()); // First beat as-is
    sim.change_next_a_beat(
        0,
        APatch {
            mask: Some(0xF0), // Not allowed
            ..APatch::default()
        },
    );

    sim.run_traffic(false, RUN_CYCLES, DRAIN_CYCLES);
}

fn a_misaligned_mask(sim: &mut TlSimulation) {
    // A narrow request's mask must sit at the address's offset within the
    // bus width.
    sim.queue_a_request(
        0,
        &APatch {
            opcode: Some(AOpcode::PutFullData),
            size: Some(0),           // 1 byte request
            address: Some(0x3001),   // Offset = 1
            mask: Some(0x4),         // Offset = 2 (mismatch)
            ..APatch::default()
        },
    );

    sim.run_traffic(false, RUN_CYCLES, DRAIN_CYCLES);
}

fn a_corrupt_without_payload(sim: &mut TlSimulation) {
    sim.queue_a_request(
        0,
        &APatch {
            opcode: Some(AOpcode::Get),
            corrupt: Some(true),
            ..APatch::default()
        },
    );

    sim.run_traffic(false, RUN_CYCLES, DRAIN_CYCLES);
}

// ── Illegal stimulus on channel D ────────────────────────────────────────

fn d_illegal_opcode(sim: &mut TlSimulation) {
    sim.queue_a_request(
        0,
        &APatch {
            opcode: Some(AOpcode::PutFullData),
            ..APatch::default()
        },
    );
    sim.change_next_d_beat(
        0,
        DPatch {
            opcode: Some(DOpcode::HintAck), // Should be AccessAck
            ..DPatch::default()
        },
    );

    sim.run_traffic(false, RUN_CYCLES, DRAIN_CYCLES);
}

fn d_illegal_param(sim: &mut TlSimulation) {
    sim.queue_a_request(
        0,
        &APatch {
            opcode: Some(AOpcode::PutFullData),
            ..APatch::default()
        },
    );
    sim.change_next_d_beat(
        0,
        DPatch {
            param: Some(2), // Should be 0
            ..DPatch::default()
        },
    );

    sim.run_traffic(false, RUN_CYCLES, DRAIN_CYCLES);
}

fn d_size_mismatch(sim: &mut TlSimulation) {
    sim.queue_a_request(
        0,
        &APatch {
            size: Some(3),
            ..APatch::default()
        },
    );
    sim.change_next_d_beat(
        0,
        DPatch {
            size: Some(2),
            ..DPatch::default()
        },
    );

    sim.run_traffic(false, RUN_CYCLES, DRAIN_CYCLES);
}

fn d_too_many_beats(sim: &mut TlSimulation) {
    // The duplicate beat is reported as a response without a request: the
    // expected beats are exhausted before the extra one arrives.
    sim.queue_a_request(
        0,
        &APatch {
            opcode: Some(AOpcode::Get),
            size: Some(4), // 2 beats
            address: Some(0x3000),
            ..APatch::default()
        },
    );
    sim.change_next_d_beat(0, DPatch::default()); // First beat as-is
    sim.change_next_d_beat(
        0,
        DPatch {
            duplicate_beat: true,
            ..DPatch::default()
        },
    );
    sim.change_next_d_beat(0, DPatch::default());

    sim.run_traffic(false, RUN_CYCLES, DRAIN_CYCLES);
}

fn d_too_few_beats(sim: &mut TlSimulation) {
    // Reported as an incomplete burst at the end of the run.
    sim.queue_a_request(
        0,
        &APatch {
            opcode: Some(AOpcode::Get),
            size: Some(4), // 2 beats
            ..APatch::default()
        },
    );
    sim.change_next_d_beat(0, DPatch::default()); // First beat as-is
    sim.change_next_d_beat(
        0,
        DPatch {
            drop_beat: true,
            ..DPatch::default()
        },
    );

    sim.run_traffic(false, RUN_CYCLES, DRAIN_CYCLES);
}

fn d_response_without_request(sim: &mut TlSimulation) {
    sim.queue_a_request(0, &APatch::default());
    sim.change_next_d_beat(
        0,
        DPatch {
            source: Some(1), // Should match host 0
            ..DPatch::default()
        },
    );

    sim.run_traffic(false, RUN_CYCLES, DRAIN_CYCLES);
}

fn d_denied_without_corrupt(sim: &mut TlSimulation) {
    sim.queue_a_request(
        0,
        &APatch {
            opcode: Some(AOpcode::Get),
            ..APatch::default()
        },
    );
    sim.change_next_d_beat(
        0,
        DPatch {
            denied: Some(true),
            corrupt: Some(false),
            ..DPatch::default()
        },
    );

    sim.run_traffic(false, RUN_CYCLES, DRAIN_CYCLES);
}

pub fn catalogue() -> Vec<TlTest> {
    vec![
        TlTest {
            description: "All tests which should trigger no assertions",
            run: all_passing_tests,
        },
        TlTest {
            description: "Valid write operation (should pass)",
            run: valid_write_operation,
        },
        TlTest {
            description: "Valid read operation (should pass)",
            run: valid_read_operation,
        },
        TlTest {
            description: "Non-default host/device (should pass)",
            run: valid_dev1_operation,
        },
        TlTest {
            description: "Concurrent requests (should pass)",
            run: multiple_valid_requests,
        },
        TlTest {
            description: "Multibeat request (should pass)",
            run: multibeat_tlc,
        },
        TlTest {
            description: "Multibeat request on TL-UL (should pass)",
            run: multibeat_tlul,
        },
        TlTest {
            description: "Request with payload is marked corrupt (should pass)",
            run: a_corrupt_payload,
        },
        TlTest {
            description: "Illegal opcode on A channel",
            run: a_illegal_opcode,
        },
        TlTest {
            description: "Illegal parameter on A channel",
            run: a_illegal_param,
        },
        TlTest {
            description: "Request size smaller than mask",
            run: a_size_too_small,
        },
        TlTest {
            description: "Request size doesn't match mask for \"full\" access",
            run: a_size_mask_mismatch,
        },
        TlTest {
            description: "Misaligned request address",
            run: a_unaligned_address,
        },
        TlTest {
            description: "Multibeat requests must increment the address",
            run: a_multibeat_addr_inc,
        },
        TlTest {
            description: "Multibeat requests must keep control signals constant",
            run: a_multibeat_ctrl_const,
        },
        TlTest {
            description: "Multibeat request with too many beats",
            run: a_too_many_beats,
        },
        TlTest {
            description: "Multibeat request with too few beats",
            run: a_too_few_beats,
        },
        TlTest {
            description: "Noncontiguous mask for a \"full\" request",
            run: a_noncontiguous_mask,
        },
        TlTest {
            description: "Multibeat request with incomplete mask",
            run: a_multibeat_bad_mask,
        },
        TlTest {
            description: "Mask is correct size but in wrong position",
            run: a_misaligned_mask,
        },
        TlTest {
            description: "Request without payload is marked corrupt",
            run: a_corrupt_without_payload,
        },
        TlTest {
            description: "Illegal opcode on D channel",
            run: d_illegal_opcode,
        },
        TlTest {
            description: "Illegal parameter on D channel",
            run: d_illegal_param,
        },
        TlTest {
            description: "Response size differs from request size",
            run: d_size_mismatch,
        },
        TlTest {
            description: "Multibeat response with too many beats",
            run: d_too_many_beats,
        },
        TlTest {
            description: "Multibeat response with too few beats",
            run: d_too_few_beats,
        },
        TlTest {
            description: "Response received with no matching request",
            run: d_response_without_request,
        },
        TlTest {
            description: "Response denied but not marked corrupt",
            run: d_denied_without_corrupt,
        },
    ]
}
