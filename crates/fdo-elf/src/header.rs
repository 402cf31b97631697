//! ELF header structures, normalized to `u64` regardless of the file's class.

#[derive(Clone, Debug)]
pub struct ElfHeader {
    pub class: u8,
    pub entry: u64,
    pub shoff: u64,
    pub shentsize: u16,
    pub shnum: u16,
    pub shstrndx: u16,
}

#[derive(Clone, Debug)]
pub struct SectionHeader {
    pub name: u32,
    pub sh_type: u32,
    pub addr: u64,
    pub offset: u64,
    pub size: u64,
    pub link: u32,
    pub entsize: u64,
}
