//! Page table walker tests.
//!
//! Verifies Sv39 address translation:
//! - Bare-mode bypass
//! - Page walks (levels 2, 1, 0) and superpage leaves
//! - Permission checks (R/W/X/U, SUM, MXR)
//! - Accessed/Dirty bit updates and their idempotence
//! - Canonical address checks and malformed tables

use rvtb_core::common::{Fault, MemOp};
use rvtb_core::mem::PagedMemory;
use rvtb_core::mmu::{translate, Atc};

// ══════════════════════════════════════════════════════════
// Helpers
// ══════════════════════════════════════════════════════════

const ROOT_PPN: u64 = 0x80000; // Tables based at 0x8000_0000

// PTE permission bits.
const V: u64 = 1 << 0;
const R: u64 = 1 << 1;
const W: u64 = 1 << 2;
const X: u64 = 1 << 3;
const U: u64 = 1 << 4;
const A: u64 = 1 << 6;
const D: u64 = 1 << 7;

fn make_pte(ppn: u64, perms: u64) -> u64 {
    (ppn << 10) | perms | V
}

fn sv39_atc() -> Atc {
    Atc((8 << 60) | ROOT_PPN)
}

fn write_pte(mem: &mut PagedMemory, table_ppn: u64, index: u64, pte: u64) {
    mem.write64((table_ppn << 12) + index * 8, pte);
}

/// Installs a full three-level mapping for `va` with the given leaf
/// permissions, returning the leaf PTE's address.
fn map_4kb(mem: &mut PagedMemory, va: u64, target_ppn: u64, perms: u64) -> u64 {
    let l2 = (va >> 30) & 0x1FF;
    let l1 = (va >> 21) & 0x1FF;
    let l0 = (va >> 12) & 0x1FF;

    let l1_table = ROOT_PPN + 1;
    let l0_table = ROOT_PPN + 2;

    write_pte(mem, ROOT_PPN, l2, make_pte(l1_table, 0)); // pointer
    write_pte(mem, l1_table, l1, make_pte(l0_table, 0)); // pointer
    write_pte(mem, l0_table, l0, make_pte(target_ppn, perms));

    (l0_table << 12) + l0 * 8
}

// ══════════════════════════════════════════════════════════
// 1. Bare mode
// ══════════════════════════════════════════════════════════

#[test]
fn bare_mode_is_identity_with_no_side_effects() {
    let mut mem = PagedMemory::new();

    let pa = translate(&mut mem, 0x1234_5678, MemOp::Load, true, false, false, Atc(0));
    assert_eq!(pa, Ok(0x1234_5678));
    assert_eq!(mem.allocated_pages(), 0);
}

// ══════════════════════════════════════════════════════════
// 2. Walks and superpages
// ══════════════════════════════════════════════════════════

#[test]
fn sv39_4kb_page_walk() {
    let mut mem = PagedMemory::new();
    let va = 0x4000_1234;
    let target_ppn = ROOT_PPN + 10;

    map_4kb(&mut mem, va, target_ppn, R | W | X | A | D);

    let pa = translate(&mut mem, va, MemOp::Load, true, false, false, sv39_atc());
    assert_eq!(pa, Ok((target_ppn << 12) | 0x234));
}

#[test]
fn sv39_megapage_walk() {
    let mut mem = PagedMemory::new();
    let va = 0x4020_0456;
    let l2 = (va >> 30) & 0x1FF;
    let l1 = (va >> 21) & 0x1FF;

    let l1_table = ROOT_PPN + 1;
    let target_ppn = 0x200; // 2MB aligned

    write_pte(&mut mem, ROOT_PPN, l2, make_pte(l1_table, 0));
    write_pte(&mut mem, l1_table, l1, make_pte(target_ppn, R | W | X | A | D));

    let pa = translate(&mut mem, va, MemOp::Load, true, false, false, sv39_atc());
    assert_eq!(pa, Ok((target_ppn << 12) | 0x456));
}

#[test]
fn sv39_gigapage_keeps_low_vpns() {
    let mut mem = PagedMemory::new();
    let va = 0x8020_1456; // VPN2=2, VPN1=1, VPN0=1
    let l2 = (va >> 30) & 0x1FF;

    let target_ppn = 0x40000; // 1GB aligned

    write_pte(&mut mem, ROOT_PPN, l2, make_pte(target_ppn, R | W | X | A | D));

    let pa = translate(&mut mem, va, MemOp::Load, true, false, false, sv39_atc());
    // Low VPN fields pass straight through for a superpage leaf.
    assert_eq!(pa, Ok((target_ppn << 12) | (va & 0x3FFF_FFFF)));
}

// ══════════════════════════════════════════════════════════
// 3. Invalid and malformed tables
// ══════════════════════════════════════════════════════════

#[test]
fn invalid_pte_is_a_page_fault() {
    let mut mem = PagedMemory::new();

    let result = translate(&mut mem, 0x1000, MemOp::Load, true, false, false, sv39_atc());
    assert_eq!(result, Err(Fault::Page(0x1000)));
}

#[test]
fn write_without_read_is_reserved() {
    let mut mem = PagedMemory::new();
    let va = 0x4000_1000;
    map_4kb(&mut mem, va, ROOT_PPN + 10, W | A | D); // W without R

    let result = translate(&mut mem, va, MemOp::Store, true, false, false, sv39_atc());
    assert_eq!(result, Err(Fault::Page(va)));
}

#[test]
fn pointer_at_level_zero_is_a_page_fault() {
    let mut mem = PagedMemory::new();
    let va = 0x1000;
    map_4kb(&mut mem, va, ROOT_PPN + 10, 0); // leaf with no permissions

    let result = translate(&mut mem, va, MemOp::Load, true, false, false, sv39_atc());
    assert_eq!(result, Err(Fault::Page(va)));
}

#[test]
fn misaligned_superpage_is_a_page_fault() {
    let mut mem = PagedMemory::new();
    let va = 0x4000_0000;
    let l2 = (va >> 30) & 0x1FF;
    let l1_table = ROOT_PPN + 1;

    write_pte(&mut mem, ROOT_PPN, l2, make_pte(l1_table, 0));
    // Megapage leaf with non-zero PPN0.
    write_pte(&mut mem, l1_table, 0, make_pte(0x201, R | W | X | A | D));

    let result = translate(&mut mem, va, MemOp::Load, true, false, false, sv39_atc());
    assert_eq!(result, Err(Fault::Page(va)));
}

#[test]
fn non_canonical_address_is_a_page_fault() {
    let mut mem = PagedMemory::new();

    // Bit 38 set means bits 63:39 must be set too.
    let va = 1u64 << 38;
    let result = translate(&mut mem, va, MemOp::Load, true, false, false, sv39_atc());
    assert_eq!(result, Err(Fault::Page(va)));

    // The properly sign-extended form walks normally (and faults on the
    // empty table instead).
    let canonical = 0xFFFF_FFC0_0000_0000u64 | va;
    let result = translate(&mut mem, canonical, MemOp::Load, true, false, false, sv39_atc());
    assert_eq!(result, Err(Fault::Page(canonical)));
}

// ══════════════════════════════════════════════════════════
// 4. Permissions
// ══════════════════════════════════════════════════════════

#[test]
fn store_needs_write_permission() {
    let mut mem = PagedMemory::new();
    let va = 0x4000_2000;
    map_4kb(&mut mem, va, ROOT_PPN + 10, R | A | D);

    let result = translate(&mut mem, va, MemOp::Store, true, false, false, sv39_atc());
    assert_eq!(result, Err(Fault::Page(va)));
}

#[test]
fn fetch_needs_execute_permission() {
    let mut mem = PagedMemory::new();
    let va = 0x4000_3000;
    map_4kb(&mut mem, va, ROOT_PPN + 10, R | W | A | D);

    let result = translate(&mut mem, va, MemOp::Fetch, true, false, false, sv39_atc());
    assert_eq!(result, Err(Fault::Page(va)));
}

#[test]
fn amo_needs_both_read_and_write() {
    let mut mem = PagedMemory::new();
    let va = 0x4000_4000;
    map_4kb(&mut mem, va, ROOT_PPN + 10, R | A | D); // read-only

    let result = translate(&mut mem, va, MemOp::Amo, true, false, false, sv39_atc());
    assert_eq!(result, Err(Fault::Page(va)));
}

#[test]
fn mxr_allows_loads_from_executable_pages() {
    let mut mem = PagedMemory::new();
    let va = 0x4000_5000;
    map_4kb(&mut mem, va, ROOT_PPN + 10, X | A | D); // execute-only

    let denied = translate(&mut mem, va, MemOp::Load, true, false, false, sv39_atc());
    assert_eq!(denied, Err(Fault::Page(va)));

    let allowed = translate(&mut mem, va, MemOp::Load, true, false, true, sv39_atc());
    assert!(allowed.is_ok());
}

#[test]
fn user_cannot_access_supervisor_page() {
    let mut mem = PagedMemory::new();
    let va = 0x4000_6000;
    map_4kb(&mut mem, va, ROOT_PPN + 10, R | W | X | A | D); // U=0

    let result = translate(&mut mem, va, MemOp::Load, false, false, false, sv39_atc());
    assert_eq!(result, Err(Fault::Page(va)));
}

#[test]
fn supervisor_access_to_user_page_needs_sum() {
    let mut mem = PagedMemory::new();
    let va = 0x4000_7000;
    map_4kb(&mut mem, va, ROOT_PPN + 10, R | W | X | U | A | D);

    let denied = translate(&mut mem, va, MemOp::Load, true, false, false, sv39_atc());
    assert_eq!(denied, Err(Fault::Page(va)));

    let allowed = translate(&mut mem, va, MemOp::Load, true, true, false, sv39_atc());
    assert!(allowed.is_ok());
}

#[test]
fn supervisor_cannot_fetch_user_page_even_with_sum() {
    let mut mem = PagedMemory::new();
    let va = 0x4000_8000;
    map_4kb(&mut mem, va, ROOT_PPN + 10, R | X | U | A | D);

    let result = translate(&mut mem, va, MemOp::Fetch, true, true, false, sv39_atc());
    assert_eq!(result, Err(Fault::Page(va)));
}

#[test]
fn user_access_to_user_page_is_allowed() {
    let mut mem = PagedMemory::new();
    let va = 0x4000_9000;
    map_4kb(&mut mem, va, ROOT_PPN + 10, R | W | U | A | D);

    let result = translate(&mut mem, va, MemOp::Load, false, false, false, sv39_atc());
    assert!(result.is_ok());
}

// ══════════════════════════════════════════════════════════
// 5. Accessed / Dirty updates
// ══════════════════════════════════════════════════════════

#[test]
fn load_sets_accessed_bit() {
    let mut mem = PagedMemory::new();
    let va = 0x4000_A000;
    let pte_addr = map_4kb(&mut mem, va, ROOT_PPN + 10, R | W);

    translate(&mut mem, va, MemOp::Load, true, false, false, sv39_atc()).unwrap();

    let pte = mem.read64(pte_addr);
    assert_eq!(pte & A, A);
    assert_eq!(pte & D, 0);
}

#[test]
fn store_sets_accessed_and_dirty_bits() {
    let mut mem = PagedMemory::new();
    let va = 0x4000_B000;
    let pte_addr = map_4kb(&mut mem, va, ROOT_PPN + 10, R | W);

    translate(&mut mem, va, MemOp::Store, true, false, false, sv39_atc()).unwrap();

    let pte = mem.read64(pte_addr);
    assert_eq!(pte & (A | D), A | D);
}

#[test]
fn repeated_translation_leaves_pte_unchanged() {
    let mut mem = PagedMemory::new();
    let va = 0x4000_C000;
    let pte_addr = map_4kb(&mut mem, va, ROOT_PPN + 10, R | W);

    translate(&mut mem, va, MemOp::Store, true, false, false, sv39_atc()).unwrap();
    let after_first = mem.read64(pte_addr);

    translate(&mut mem, va, MemOp::Store, true, false, false, sv39_atc()).unwrap();
    translate(&mut mem, va, MemOp::Load, true, false, false, sv39_atc()).unwrap();
    assert_eq!(mem.read64(pte_addr), after_first);
}
