//! ELF image loading and boot argument setup.
//!
//! The loader copies every allocatable section of a RISC-V ELF-64 executable
//! into paged memory, writes the program's argument image at physical address
//! zero, and resolves the entry point and the `tohost`/`fromhost` host-call
//! symbols. It is deliberately minimal: anything malformed is fatal, and only
//! the fields the harness needs are examined.

use std::fs;
use std::path::Path;

use goblin::elf::header::EM_RISCV;
use goblin::elf::section_header::{SHF_ALLOC, SHT_NOBITS, SHT_SYMTAB};
use goblin::elf::Elf;
use log::{debug, warn};

use crate::common::{MemoryAddress, SimError};
use crate::mem::{DataBlock, Htif, PagedMemory};

/// Addresses resolved while loading an executable.
#[derive(Clone, Copy, Debug)]
pub struct LoadedImage {
    /// Address of the first instruction to execute.
    pub entry: MemoryAddress,
    /// Address of the `tohost` symbol, or [`Htif::UNMAPPED`] if absent.
    pub tohost: MemoryAddress,
    /// Address of the `fromhost` symbol, or [`Htif::UNMAPPED`] if absent.
    pub fromhost: MemoryAddress,
}

/// Builds the argument image stored at physical address zero.
///
/// Target memory layout:
/// ```text
/// 0x00  zero word
/// 0x04  argc word
/// 0x08  argv pointers (64-bit each)
/// ....  zero word
/// ....  argument strings, NUL terminated
/// ```
pub fn argument_image(args: &[String]) -> DataBlock {
    let argc = args.len();
    let strings_base = 4 + 4 + argc * 8 + 4;

    let mut data = vec![0u8; strings_base];
    data[4..8].copy_from_slice(&(argc as u32).to_le_bytes());

    let mut cursor = strings_base;
    for (i, arg) in args.iter().enumerate() {
        let ptr_at = 4 + 4 + i * 8;
        data[ptr_at..ptr_at + 8].copy_from_slice(&(cursor as u64).to_le_bytes());

        data.extend_from_slice(arg.as_bytes());
        data.push(0);
        cursor += arg.len() + 1;
    }

    DataBlock::new(0, data)
}

/// Looks up a symbol by name in the first symbol table. Missing symbols are
/// recoverable: the returned sentinel never matches any memory request.
fn symbol_location(elf: &Elf, name: &str) -> MemoryAddress {
    let has_symtab = elf
        .section_headers
        .iter()
        .any(|sh| sh.sh_type == SHT_SYMTAB);

    if has_symtab {
        for sym in elf.syms.iter() {
            if elf.strtab.get_at(sym.st_name) == Some(name) {
                return sym.st_value;
            }
        }
    }

    warn!("couldn't find symbol \"{}\" in ELF", name);
    Htif::UNMAPPED
}

/// Loads a RISC-V executable image and its arguments into `memory`.
///
/// `args` is the program's argv, including the program name at index zero.
pub fn load_elf_bytes(
    bytes: &[u8],
    args: &[String],
    memory: &mut PagedMemory,
) -> Result<LoadedImage, SimError> {
    let elf = Elf::parse(bytes).map_err(|e| SimError::MalformedElf(e.to_string()))?;

    if elf.header.e_machine != EM_RISCV {
        return Err(SimError::WrongArchitecture);
    }

    // Program arguments.
    memory.write_block(&argument_image(args));

    // Program. Only sections to be placed in memory are interesting: ALLOC
    // means "put in memory", NOBITS means the data is not in the file.
    for sh in &elf.section_headers {
        if sh.sh_flags & (SHF_ALLOC as u64) == 0 || sh.sh_type == SHT_NOBITS || sh.sh_size == 0 {
            continue;
        }

        let start = sh.sh_offset as usize;
        let end = start + sh.sh_size as usize;
        let content = bytes
            .get(start..end)
            .ok_or_else(|| SimError::MalformedElf("section extends past end of file".into()))?;

        debug!(
            "loading section: {:#x}..{:#x} ({} bytes)",
            sh.sh_addr,
            sh.sh_addr + sh.sh_size,
            sh.sh_size
        );
        memory.write_block(&DataBlock::new(sh.sh_addr, content.to_vec()));
    }

    Ok(LoadedImage {
        entry: elf.header.e_entry,
        tohost: symbol_location(&elf, "tohost"),
        fromhost: symbol_location(&elf, "fromhost"),
    })
}

/// Reads an executable from disk and loads it. See [`load_elf_bytes`].
pub fn load_elf(
    path: &Path,
    args: &[String],
    memory: &mut PagedMemory,
) -> Result<LoadedImage, SimError> {
    let bytes = fs::read(path).map_err(|e| SimError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    load_elf_bytes(&bytes, args, memory)
}
