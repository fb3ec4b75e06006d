//! Legality monitor tests, driven with hand-built beats.

use rvtb_core::tilelink::config::TlConfig;
use rvtb_core::tilelink::monitor::TlMonitor;
use rvtb_core::tilelink::protocol::{AOpcode, DOpcode, TlA, TlD};

fn monitor() -> TlMonitor {
    TlMonitor::new(&TlConfig::default_topology())
}

fn get(source: u32, size: u8, address: u64) -> TlA {
    TlA {
        opcode: AOpcode::Get,
        param: 0,
        size,
        source,
        address,
        mask: rvtb_core::tilelink::protocol::complete_mask(address, 1 << size, 8),
        corrupt: false,
        data: 0,
    }
}

fn put(source: u32, size: u8, address: u64) -> TlA {
    TlA {
        opcode: AOpcode::PutFullData,
        mask: rvtb_core::tilelink::protocol::complete_mask(address, 1 << size, 8),
        data: 0x1234,
        ..get(source, size, address)
    }
}

fn access_ack_data(source: u32, size: u8) -> TlD {
    TlD {
        opcode: DOpcode::AccessAckData,
        param: 0,
        size,
        source,
        sink: 0,
        denied: false,
        corrupt: false,
        data: 0,
    }
}

#[test]
fn legal_request_response_pair_is_clean() {
    let mut m = monitor();

    m.observe_a(0, &get(0, 3, 0x3000));
    m.observe_d(0, 0, &access_ack_data(0, 3));

    m.end_of_run();
    assert!(m.is_clean(), "{:?}", m.violations());
    assert_eq!(m.counters().a_beats, 1);
    assert_eq!(m.counters().d_beats, 1);
}

#[test]
fn opcode_illegal_for_device_profile() {
    let mut m = monitor();

    // Device 2 is TL-UL; arithmetic data is TL-UH and above.
    let mut beat = put(2, 3, 0x2000_3000);
    beat.opcode = AOpcode::ArithmeticData;
    m.observe_a(2, &beat);

    assert!(!m.is_clean());
}

#[test]
fn nonzero_param_on_put() {
    let mut m = monitor();

    let mut beat = put(0, 3, 0x3000);
    beat.param = 2;
    m.observe_a(0, &beat);

    assert!(!m.is_clean());
}

#[test]
fn misaligned_address() {
    let mut m = monitor();
    m.observe_a(0, &get(0, 3, 0x3001));
    assert!(!m.is_clean());
}

#[test]
fn mask_wider_than_size() {
    let mut m = monitor();

    let mut beat = get(0, 1, 0x3000);
    beat.mask = 0xF; // four lanes for a two-byte request
    m.observe_a(0, &beat);

    assert!(!m.is_clean());
}

#[test]
fn noncontiguous_mask_on_full_access() {
    let mut m = monitor();

    let mut beat = get(0, 2, 0x3000);
    beat.mask = 0x33;
    m.observe_a(0, &beat);

    assert!(!m.is_clean());
}

#[test]
fn corrupt_without_payload() {
    let mut m = monitor();

    let mut beat = get(0, 3, 0x3000);
    beat.corrupt = true;
    m.observe_a(0, &beat);

    assert!(!m.is_clean());
}

#[test]
fn burst_must_advance_the_address() {
    let mut m = monitor();

    let first = put(0, 4, 0x3000); // two beats
    m.observe_a(0, &first);
    m.observe_a(0, &first); // identical second beat: address did not advance

    assert!(!m.is_clean());
}

#[test]
fn burst_control_fields_must_hold() {
    let mut m = monitor();

    let first = put(0, 4, 0x3000);
    m.observe_a(0, &first);

    let mut second = first;
    second.address += 8;
    second.size = 3;
    m.observe_a(0, &second);

    assert!(!m.is_clean());
}

#[test]
fn complete_burst_is_clean() {
    let mut m = monitor();

    let first = put(0, 4, 0x3000);
    m.observe_a(0, &first);
    let mut second = first;
    second.address += 8;
    m.observe_a(0, &second);

    // One AccessAck closes the transaction.
    m.observe_d(
        0,
        0,
        &TlD {
            opcode: DOpcode::AccessAck,
            size: 4,
            ..access_ack_data(0, 4)
        },
    );

    m.end_of_run();
    assert!(m.is_clean(), "{:?}", m.violations());
}

#[test]
fn response_without_request() {
    let mut m = monitor();
    m.observe_d(0, 0, &access_ack_data(0, 3));
    assert!(!m.is_clean());
}

#[test]
fn response_size_must_match_request() {
    let mut m = monitor();

    m.observe_a(0, &get(0, 3, 0x3000));
    m.observe_d(0, 0, &access_ack_data(0, 2));

    assert!(!m.is_clean());
}

#[test]
fn wrong_response_opcode_for_request() {
    let mut m = monitor();

    m.observe_a(0, &put(0, 3, 0x3000));
    m.observe_d(
        0,
        0,
        &TlD {
            opcode: DOpcode::HintAck,
            ..access_ack_data(0, 3)
        },
    );

    assert!(!m.is_clean());
}

#[test]
fn denied_data_response_must_be_corrupt() {
    let mut m = monitor();

    m.observe_a(0, &get(0, 3, 0x3000));
    m.observe_d(
        0,
        0,
        &TlD {
            denied: true,
            corrupt: false,
            ..access_ack_data(0, 3)
        },
    );

    assert!(!m.is_clean());
}

#[test]
fn denied_ack_without_payload_may_omit_corrupt() {
    let mut m = monitor();

    m.observe_a(0, &put(0, 3, 0x3000));
    m.observe_d(
        0,
        0,
        &TlD {
            opcode: DOpcode::AccessAck,
            denied: true,
            ..access_ack_data(0, 3)
        },
    );

    m.end_of_run();
    assert!(m.is_clean(), "{:?}", m.violations());
}

#[test]
fn source_reuse_while_open_is_flagged() {
    let mut m = monitor();

    m.observe_a(0, &get(0, 3, 0x3000));
    m.observe_a(0, &get(0, 3, 0x3100)); // same source, no response yet

    assert!(!m.is_clean());
}

#[test]
fn incomplete_burst_is_flagged_at_end_of_run() {
    let mut m = monitor();

    m.observe_a(0, &put(0, 4, 0x3000)); // first of two beats, second never sent

    assert!(m.is_clean());
    m.end_of_run();
    assert!(!m.is_clean());
}

#[test]
fn grant_ack_pairing() {
    let mut m = monitor();

    let mut acquire = get(0, 3, 0x3000);
    acquire.opcode = AOpcode::AcquireBlock;
    m.observe_a(0, &acquire);

    m.observe_d(
        0,
        0,
        &TlD {
            opcode: DOpcode::Grant,
            sink: 0,
            ..access_ack_data(0, 3)
        },
    );

    // Acknowledging an unknown sink is flagged; the open one is fine.
    m.observe_e(0, &rvtb_core::tilelink::protocol::TlE { sink: 0 });
    m.end_of_run();
    assert!(m.is_clean(), "{:?}", m.violations());

    m.observe_e(0, &rvtb_core::tilelink::protocol::TlE { sink: 0 });
    assert!(!m.is_clean());
}
