//! Address/interval primitives and the ELF + debug-line query facade.
//!
//! This crate never sees a sample or a profile; it only answers "what
//! function contains this address" and "what source/debug line does this
//! address map to". Everything above it (`fdo-raw`, `fdo-profile`) treats
//! it as a read-only service, per the symbol-table assumption in spec §1.

mod constants;
mod debug;
mod facade;
mod file;
mod header;
mod interval;

pub use debug::{DebugInfo, SourceLoc};
pub use facade::ElfFacade;
pub use file::{ElfFile, FunctionSymbol};
pub use header::{ElfHeader, SectionHeader};
pub use interval::{Address, Interval, IntervalMap};

use thiserror::Error;

/// ELF parsing and symbol-resolution errors.
#[derive(Error, Debug)]
pub enum ElfError {
    #[error("ELF data too small")]
    TooSmall,
    #[error("invalid ELF magic number")]
    InvalidMagic,
    #[error("only little-endian ELF is supported")]
    NotLittleEndian,
    #[error("unsupported ELF class: {0}")]
    UnsupportedClass(u8),
    #[error("section header out of bounds")]
    SectionOutOfBounds,
    #[error("overlapping function symbol intervals for {first} and {second}")]
    OverlappingIntervals { first: String, second: String },
    #[error("failed to run {cmd}: {source}")]
    Addr2Line {
        cmd: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ElfError>;
