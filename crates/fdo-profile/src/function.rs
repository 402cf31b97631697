//! Per-function record and its restricted counter sub-tables (spec §3
//! "Function record").

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::Address;

/// A dense index assigned at first sight (spec §9: breaks the cyclic
/// function/location reference).
pub type FunctionId = u32;

/// The aggregated counter structure, restricted to one function's address
/// range (spec §3: "`agg` mirrors the aggregated counter structure").
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PerFunctionAgg {
    pub instructions: FxHashMap<Address, u64>,
    pub branches: FxHashMap<(Address, Address), u64>,
    pub mispredicts: FxHashMap<(Address, Address), u64>,
    pub traces: FxHashMap<(Address, Address), u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub id: FunctionId,
    pub name: String,
    pub start: Address,
    pub finish: Address,
    pub has_linearids: bool,
    pub count: u64,
    pub malformed_traces: u64,
    pub agg: PerFunctionAgg,
}

impl FunctionRecord {
    pub fn new(id: FunctionId, name: String, start: Address, finish: Address) -> Self {
        Self {
            id,
            name,
            start,
            finish,
            has_linearids: false,
            count: 0,
            malformed_traces: 0,
            agg: PerFunctionAgg::default(),
        }
    }
}
