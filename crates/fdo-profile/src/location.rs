//! The `Location` record (spec §3) and the debug-line ownership test used
//! during decoding (spec §4.3 step 2d).

use serde::{Deserialize, Serialize};

use crate::function::FunctionId;
use crate::Address;

/// Default linear-IR source extension. Configurable via [`crate::DecodeConfig`]
/// since the compiler driver that names these files is an external
/// collaborator (spec §1).
pub const DEFAULT_LINEAR_IR_EXTENSION: &str = ".ll";

/// Set iff the address falls inside a resolved function (spec §3).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelLoc {
    pub function_id: FunctionId,
    pub offset: u64,
    pub cfg_label: Option<fdo_ir::Label>,
}

/// Set iff the debug line belongs to the compiler-emitted linear IR for the
/// owning function (spec §3, §4.3 step 2d).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugLoc {
    pub file: String,
    pub line: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub addr: Address,
    pub rel: Option<RelLoc>,
    pub dbg: Option<DebugLoc>,
}

/// Whether `file` is the linear-IR source owning `function_name`: it carries
/// `extension`, and its basename (with the extension stripped) prefixes the
/// function's own name — compilers that emit one linear-IR file per
/// compilation unit typically mangle the unit name into each function symbol
/// (spec §4.3 step 2d: "the file's base name matches the function's owning
/// unit").
pub fn file_belongs_to_function(file: &str, function_name: &str, extension: &str) -> bool {
    let base = std::path::Path::new(file)
        .file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("");
    match base.strip_suffix(extension) {
        Some(stem) if !stem.is_empty() => function_name.starts_with(stem),
        _ => false,
    }
}
