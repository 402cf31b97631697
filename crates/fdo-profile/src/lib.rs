//! The decoded-profile data model (spec §3): location decoding (§4.3), the
//! digest registry (§4.6), per-function partitioning (§4.4), CFG attribution
//! (§4.5), the textual/binary store (§4.7), trim (§4.9), and merge (§4.10).

mod attribute;
mod decode;
mod digest;
mod function;
mod location;
mod merge;
mod partition;
mod sexp;
mod store;
mod trim;

pub use attribute::{attribute, AttributedFunction, BlockCounts, CallCount, SuccessorCount};
pub use decode::{decode, DecodeConfig};
pub use digest::{digest_bytes, CheckOutcome, DigestConfig, DigestKind, DigestPolicy, DigestRegistry};
pub use function::{FunctionId, FunctionRecord, PerFunctionAgg};
pub use location::{file_belongs_to_function, DebugLoc, Location, RelLoc, DEFAULT_LINEAR_IR_EXTENSION};
pub use merge::merge;
pub use store::{read_binary, read_textual, write_binary, write_textual};
pub use trim::{trim, TrimPredicate};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Address = fdo_elf::Address;

/// Non-fatal bookkeeping accumulated while decoding and attributing (spec
/// §4.1's "ignored" counter and §4.5's tie-break diagnostic generalized to
/// one place, since the distilled spec names them without giving them a
/// home).
#[derive(Clone, Copy, Debug, Default)]
pub struct Diagnostics {
    pub ambiguous_debug_ties: u64,
    pub synthetic_call_edges: u64,
}

/// Errors surfaced by location decoding, digesting, attribution, the store,
/// and merge.
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("address {addr:#x}: offset does not fit a machine int")]
    OffsetTooLarge { addr: Address },
    #[error("function `{name}` re-observed with different bounds")]
    FunctionBoundaryDrift { name: String },
    #[error("digest config must enable at least one of function/unit")]
    EmptyDigestConfig,
    #[error("missing digest for `{name}`")]
    DigestMissing { name: String },
    #[error("digest mismatch for `{name}`")]
    DigestMismatch { name: String },
    #[error("incompatible profile format version: found {found}, expected {expected}")]
    IncompatibleVersion { found: u32, expected: u32 },
    #[error("build-id mismatch on merge: `{a}` vs `{b}`")]
    BuildidMismatch { a: String, b: String },
    #[error("conflicting addr2loc entry at {addr:#x} on merge")]
    LocationConflict { addr: Address },
    #[error("malformed textual profile: {detail}")]
    MalformedSexp { detail: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("binary encode failed: {detail}")]
    Encode { detail: String },
    #[error("binary decode failed: {detail}")]
    Decode { detail: String },
    #[error(transparent)]
    Raw(#[from] fdo_raw::RawError),
    #[error(transparent)]
    Elf(#[from] fdo_elf::ElfError),
}

pub type Result<T> = std::result::Result<T, ProfileError>;

/// The decoded, symbolic profile (spec §3's "Decoded profile").
///
/// Immutable after `decode` except through [`trim`] and [`merge`] (spec §3
/// Lifecycle).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DecodedProfile {
    pub addr2loc: FxHashMap<Address, Location>,
    pub name2id: FxHashMap<String, FunctionId>,
    pub functions: FxHashMap<FunctionId, FunctionRecord>,
    pub crcs: DigestRegistry,
    pub buildid: Option<String>,
}

impl DecodedProfile {
    pub fn function_by_name(&self, name: &str) -> Option<&FunctionRecord> {
        self.name2id.get(name).and_then(|id| self.functions.get(id))
    }

    pub fn total_samples(&self) -> u64 {
        self.functions.values().map(|f| f.count).sum()
    }
}
