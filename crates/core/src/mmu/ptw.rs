//! Sv39 page table walker.
//!
//! This is the algorithm given in the RISC-V privileged spec:
//!
//! 1. Check that every bit of `va[XLEN-1:VALEN]` equals `va[VALEN-1]`; if not,
//!    raise a page fault for the original access type.
//! 2. Let `a` = `atc.ppn × PAGESIZE` and `i` = `LEVELS − 1`.
//! 3. Read the PTE at `a + va.vpn[i] × PTESIZE`. If the PTE address violates
//!    the physical address bound, raise an access fault.
//! 4. If `pte.v = 0`, or `pte.r = 0` and `pte.w = 1`, raise a page fault.
//! 5. If `pte.r = 1` or `pte.x = 1` this is a leaf; otherwise descend:
//!    `i = i − 1` (page fault if `i < 0`), `a = pte.ppn × PAGESIZE`, go to 3.
//! 6. Check the leaf's permissions against the access type, privilege, and
//!    the SUM and MXR bits; on failure raise a page fault.
//! 7. If `i > 0` and any `pte.ppn[j]` for `j < i` is non-zero, this is a
//!    misaligned superpage; raise a page fault.
//! 8. Set `pte.a`, and `pte.d` for writes, writing the PTE back. The update
//!    and the read in step 3 must not be separated by another PTE store; the
//!    single-threaded driver guarantees that here.
//! 9. Assemble the physical address: the page offset from the virtual
//!    address, `ppn[j] = va.vpn[j]` for `j < i`, `ppn[j] = pte.ppn[j]` for
//!    `j ≥ i`.

use log::trace;

use crate::common::{Fault, MemOp, MemoryAddress, MAX_PHYSICAL_ADDRESS};
use crate::mem::PagedMemory;
use crate::mmu::sv39::{Atc, AtpMode, Sv39Addr, LEVELS, PAGESIZE, PTESIZE, VALEN};
use crate::mmu::PageTableEntry;

/// Translates a virtual address to a physical address.
///
/// With translation off (`atc.mode = Bare`) the address passes through
/// untouched and no memory is accessed. Only Sv39 is implemented among the
/// translating modes.
pub fn translate(
    memory: &mut PagedMemory,
    virtual_address: MemoryAddress,
    operation: MemOp,
    supervisor: bool,
    sum: bool,
    mxr: bool,
    atc: Atc,
) -> Result<MemoryAddress, Fault> {
    if atc.is_bare() {
        return Ok(virtual_address);
    }
    assert_eq!(
        atc.mode(),
        Some(AtpMode::Sv39),
        "only Bare and Sv39 translation modes are implemented"
    );

    let va = Sv39Addr(virtual_address);

    // 1. All upper bits must match the MSB of the virtual address.
    let msb = (virtual_address >> (VALEN - 1)) & 0x1 != 0;
    let upper = (virtual_address as i64) >> VALEN;
    if (msb && upper != -1) || (!msb && upper != 0) {
        return Err(Fault::Page(virtual_address));
    }

    // 2. Start at the root of the page table.
    let mut a = atc.ppn() * PAGESIZE;
    let mut level = LEVELS - 1;
    let (mut pte, mut pte_address);

    loop {
        // 3. Access the page table entry. (Memory latency is not simulated.)
        pte_address = a + va.vpn(level) * PTESIZE;
        if pte_address > MAX_PHYSICAL_ADDRESS {
            return Err(Fault::Access(pte_address));
        }
        pte = PageTableEntry(memory.read64(pte_address));

        // 4. Check that the PTE is valid.
        if !pte.valid() || (!pte.readable() && pte.writable()) {
            return Err(Fault::Page(virtual_address));
        }

        // 5. Stop at a leaf, or descend a level.
        if pte.is_leaf() {
            break;
        }
        if level == 0 {
            return Err(Fault::Page(virtual_address));
        }
        level -= 1;
        a = pte.ppn() * PAGESIZE;
    }

    // 6. Check permissions.
    let read = operation.reads();
    let write = operation.writes();
    let execute = operation == MemOp::Fetch;
    let permitted = !((read && !(pte.readable() || (mxr && pte.executable())))
        || (write && !pte.writable())
        || (execute && !pte.executable())
        || (supervisor && pte.user_mode_accessible() && (!sum || execute))
        || (!supervisor && !pte.user_mode_accessible()));
    if !permitted {
        return Err(Fault::Page(virtual_address));
    }

    // 7. Check for a misaligned superpage.
    for j in 0..level {
        if pte.ppn_level(j) != 0 {
            return Err(Fault::Page(virtual_address));
        }
    }

    // 8. Update the accessed/dirty bits in place.
    if !pte.accessed() || (write && !pte.dirty()) {
        pte.set_accessed();
        if write {
            pte.set_dirty();
        }
        memory.write64(pte_address, pte.raw());
    }

    // 9. Assemble the physical address.
    let ppn0 = if level > 0 { va.vpn(0) } else { pte.ppn_level(0) };
    let ppn1 = if level > 1 { va.vpn(1) } else { pte.ppn_level(1) };
    let ppn2 = pte.ppn_level(2);
    let pa = Sv39Addr::assemble(va.offset(), ppn0, ppn1, ppn2);

    trace!("translated {:#x} -> {:#x}", virtual_address, pa);
    Ok(pa)
}
