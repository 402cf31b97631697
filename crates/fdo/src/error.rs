//! The top-level `Error` wrapping each pipeline crate's own error type.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("ELF error: {0}")]
    Elf(#[from] fdo_elf::ElfError),
    #[error("raw-sample error: {0}")]
    Raw(#[from] fdo_raw::RawError),
    #[error("profile error: {0}")]
    Profile(#[from] fdo_profile::ProfileError),
    #[error("linear-IR artifact error: {0}")]
    Ir(#[from] fdo_ir::IrError),
    #[error("linker-script error: {0}")]
    Linker(#[from] fdo_layout::LinkerError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid argument: {0}")]
    InvalidArg(String),
    #[error("`--read-aggregated` and `--write-aggregated` are mutually exclusive")]
    ConflictingAggregatedFlags,
}

pub type Result<T> = std::result::Result<T, Error>;
