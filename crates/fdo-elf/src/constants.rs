//! ELF specification constants (subset needed for symbol/debug-line lookup).

pub const ELF_MAGIC: u32 = 0x464C_457F; // 0x7F 'E' 'L' 'F'
pub const ELF_CLASS_32: u8 = 1;
pub const ELF_CLASS_64: u8 = 2;
pub const ELF_DATA_LSB: u8 = 1;

pub const SHT_SYMTAB: u32 = 2;
pub const SHT_NOTE: u32 = 7;
pub const SHT_DYNSYM: u32 = 11;

// Symbol type (lower 4 bits of st_info).
pub const STT_FUNC: u8 = 2;

// Symbol section index specials.
pub const SHN_UNDEF: u16 = 0;

pub const NT_GNU_BUILD_ID: u32 = 3;
pub const GNU_NOTE_NAME: &str = "GNU\0";
