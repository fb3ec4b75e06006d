//! Synthetic ELF-64 image builder.
//!
//! Emits just enough of a little-endian RISC-V executable for the loader:
//! a file header, a null section, any number of PROGBITS/NOBITS sections,
//! and a symbol table with named symbols.

const EHDR_SIZE: usize = 64;
const SHDR_SIZE: usize = 64;
const SYM_SIZE: usize = 24;

pub const EM_RISCV: u16 = 243;

const SHT_PROGBITS: u32 = 1;
const SHT_SYMTAB: u32 = 2;
const SHT_STRTAB: u32 = 3;
pub const SHT_NOBITS: u32 = 8;
const SHF_ALLOC: u64 = 0x2;

/// One section to place in the image.
pub struct Section {
    pub addr: u64,
    pub data: Vec<u8>,
    pub sh_type: u32,
    pub alloc: bool,
}

impl Section {
    pub fn progbits(addr: u64, data: Vec<u8>) -> Self {
        Self {
            addr,
            data,
            sh_type: SHT_PROGBITS,
            alloc: true,
        }
    }

    pub fn nobits(addr: u64, size: usize) -> Self {
        Self {
            addr,
            data: vec![0xAA; size],
            sh_type: SHT_NOBITS,
            alloc: true,
        }
    }
}

struct Shdr {
    sh_type: u32,
    sh_flags: u64,
    sh_addr: u64,
    sh_offset: u64,
    sh_size: u64,
    sh_link: u32,
    sh_entsize: u64,
}

fn push_shdr(out: &mut Vec<u8>, shdr: &Shdr) {
    out.extend_from_slice(&0u32.to_le_bytes()); // sh_name
    out.extend_from_slice(&shdr.sh_type.to_le_bytes());
    out.extend_from_slice(&shdr.sh_flags.to_le_bytes());
    out.extend_from_slice(&shdr.sh_addr.to_le_bytes());
    out.extend_from_slice(&shdr.sh_offset.to_le_bytes());
    out.extend_from_slice(&shdr.sh_size.to_le_bytes());
    out.extend_from_slice(&shdr.sh_link.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // sh_info
    out.extend_from_slice(&0u64.to_le_bytes()); // sh_addralign
    out.extend_from_slice(&shdr.sh_entsize.to_le_bytes());
    debug_assert_eq!(out.len() % SHDR_SIZE, 0);
}

/// Builds an executable image for `machine` with the given sections and
/// symbols.
pub fn build_elf_for(
    machine: u16,
    entry: u64,
    sections: &[Section],
    symbols: &[(&str, u64)],
) -> Vec<u8> {
    // Sections: null, user sections, symtab, strtab.
    let num_sections = 1 + sections.len() + 2;
    let symtab_index = 1 + sections.len();
    let strtab_index = symtab_index + 1;

    // String table: leading NUL, then each symbol name.
    let mut strtab = vec![0u8];
    let name_offsets: Vec<usize> = symbols
        .iter()
        .map(|(name, _)| {
            let offset = strtab.len();
            strtab.extend_from_slice(name.as_bytes());
            strtab.push(0);
            offset
        })
        .collect();

    // Symbol table: null symbol, then the named ones.
    let mut symtab = vec![0u8; SYM_SIZE];
    for ((_, value), name_offset) in symbols.iter().zip(&name_offsets) {
        symtab.extend_from_slice(&(*name_offset as u32).to_le_bytes()); // st_name
        symtab.push(0x10); // st_info: GLOBAL | NOTYPE
        symtab.push(0); // st_other
        symtab.extend_from_slice(&1u16.to_le_bytes()); // st_shndx
        symtab.extend_from_slice(&value.to_le_bytes());
        symtab.extend_from_slice(&0u64.to_le_bytes()); // st_size
    }

    // File layout: header, section headers, then payloads in order.
    let shoff = EHDR_SIZE;
    let mut payload_offset = EHDR_SIZE + num_sections * SHDR_SIZE;

    let mut image = Vec::new();

    // ELF header.
    image.extend_from_slice(&[0x7F, b'E', b'L', b'F', 2, 1, 1, 0]); // ident
    image.extend_from_slice(&[0; 8]); // ident padding
    image.extend_from_slice(&2u16.to_le_bytes()); // e_type: EXEC
    image.extend_from_slice(&machine.to_le_bytes());
    image.extend_from_slice(&1u32.to_le_bytes()); // e_version
    image.extend_from_slice(&entry.to_le_bytes());
    image.extend_from_slice(&0u64.to_le_bytes()); // e_phoff
    image.extend_from_slice(&(shoff as u64).to_le_bytes());
    image.extend_from_slice(&0u32.to_le_bytes()); // e_flags
    image.extend_from_slice(&(EHDR_SIZE as u16).to_le_bytes());
    image.extend_from_slice(&0u16.to_le_bytes()); // e_phentsize
    image.extend_from_slice(&0u16.to_le_bytes()); // e_phnum
    image.extend_from_slice(&(SHDR_SIZE as u16).to_le_bytes());
    image.extend_from_slice(&(num_sections as u16).to_le_bytes());
    image.extend_from_slice(&0u16.to_le_bytes()); // e_shstrndx
    assert_eq!(image.len(), EHDR_SIZE);

    // Null section header.
    push_shdr(
        &mut image,
        &Shdr {
            sh_type: 0,
            sh_flags: 0,
            sh_addr: 0,
            sh_offset: 0,
            sh_size: 0,
            sh_link: 0,
            sh_entsize: 0,
        },
    );

    let mut payloads: Vec<&[u8]> = Vec::new();

    for section in sections {
        // NOBITS sections record a size but store no file content.
        let in_file = section.sh_type != SHT_NOBITS;
        push_shdr(
            &mut image,
            &Shdr {
                sh_type: section.sh_type,
                sh_flags: if section.alloc { SHF_ALLOC } else { 0 },
                sh_addr: section.addr,
                sh_offset: payload_offset as u64,
                sh_size: section.data.len() as u64,
                sh_link: 0,
                sh_entsize: 0,
            },
        );
        if in_file {
            payloads.push(&section.data);
            payload_offset += section.data.len();
        }
    }

    push_shdr(
        &mut image,
        &Shdr {
            sh_type: SHT_SYMTAB,
            sh_flags: 0,
            sh_addr: 0,
            sh_offset: payload_offset as u64,
            sh_size: symtab.len() as u64,
            sh_link: strtab_index as u32,
            sh_entsize: SYM_SIZE as u64,
        },
    );
    payloads.push(&symtab);
    payload_offset += symtab.len();

    push_shdr(
        &mut image,
        &Shdr {
            sh_type: SHT_STRTAB,
            sh_flags: 0,
            sh_addr: 0,
            sh_offset: payload_offset as u64,
            sh_size: strtab.len() as u64,
            sh_link: 0,
            sh_entsize: 0,
        },
    );
    payloads.push(&strtab);

    for payload in payloads {
        image.extend_from_slice(payload);
    }

    image
}

/// A RISC-V executable image.
pub fn build_elf(entry: u64, sections: &[Section], symbols: &[(&str, u64)]) -> Vec<u8> {
    build_elf_for(EM_RISCV, entry, sections, symbols)
}
