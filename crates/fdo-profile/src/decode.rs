//! Address → location decoding (spec §4.3).

use rustc_hash::FxHashMap;
use tracing::warn;

use crate::digest::DigestRegistry;
use crate::function::{FunctionId, FunctionRecord};
use crate::location::{file_belongs_to_function, DebugLoc, Location, RelLoc, DEFAULT_LINEAR_IR_EXTENSION};
use crate::partition::partition;
use crate::{Address, DecodedProfile, Diagnostics, ProfileError, Result};

use fdo_elf::ElfFacade;
use fdo_raw::AggregatedRawProfile;

/// Knobs the decoder needs that spec.md §6 calls out as "core-visible
/// configuration".
#[derive(Clone, Debug)]
pub struct DecodeConfig {
    /// When true, a symbol re-observed with different bounds is coalesced
    /// with a warning instead of failing with `FunctionBoundaryDrift` (spec
    /// §6: "locally-duplicated non-unique function names are silently
    /// coalesced").
    pub ignore_local_dup: bool,
    /// The linear-IR source extension a debug-line file must carry to be
    /// treated as `dbg` rather than ordinary source info (spec §3, §4.3).
    pub linear_ir_extension: String,
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            ignore_local_dup: false,
            linear_ir_extension: DEFAULT_LINEAR_IR_EXTENSION.to_string(),
        }
    }
}

/// Resolve every address `agg` touches through `elf`, intern functions, and
/// partition the aggregated counters onto them (spec §4.3, §4.4).
pub fn decode(
    agg: &AggregatedRawProfile,
    elf: &mut ElfFacade,
    config: &DecodeConfig,
) -> Result<(DecodedProfile, Diagnostics)> {
    let addresses = agg.addresses();
    elf.resolve_all(&addresses)?;

    let mut addr2loc: FxHashMap<Address, Location> = FxHashMap::default();
    let mut name2id: FxHashMap<String, FunctionId> = FxHashMap::default();
    let mut functions: FxHashMap<FunctionId, FunctionRecord> = FxHashMap::default();
    let diagnostics = Diagnostics::default();
    let mut next_id: FunctionId = 0;

    for &addr in &addresses {
        let Some(interval) = elf.function_containing(addr) else {
            addr2loc.insert(
                addr,
                Location {
                    addr,
                    rel: None,
                    dbg: None,
                },
            );
            continue;
        };
        let name = interval.v.name.clone();
        let (start, finish) = (interval.l, interval.r);

        let offset = addr - start;
        u32::try_from(offset).map_err(|_| ProfileError::OffsetTooLarge { addr })?;

        let id = if let Some(&existing_id) = name2id.get(&name) {
            let f = functions.get(&existing_id).expect("interned function missing");
            if f.start != start || f.finish != finish {
                if config.ignore_local_dup {
                    warn!(name = %name, "coalescing locally-duplicated function with differing bounds");
                } else {
                    return Err(ProfileError::FunctionBoundaryDrift { name });
                }
            }
            existing_id
        } else {
            let new_id = next_id;
            next_id += 1;
            name2id.insert(name.clone(), new_id);
            functions.insert(new_id, FunctionRecord::new(new_id, name.clone(), start, finish));
            new_id
        };

        let dbg = elf.debug_line(addr).and_then(|loc| {
            if loc.is_valid() && file_belongs_to_function(&loc.file, &name, &config.linear_ir_extension) {
                Some(DebugLoc {
                    file: loc.file.clone(),
                    line: loc.line,
                })
            } else {
                None
            }
        });
        if dbg.is_some() {
            functions.get_mut(&id).expect("interned function missing").has_linearids = true;
        }

        let rel = Some(RelLoc {
            function_id: id,
            offset,
            cfg_label: dbg.as_ref().map(|d| d.line),
        });
        addr2loc.insert(addr, Location { addr, rel, dbg });
    }

    partition(&addr2loc, &mut functions, agg);

    let profile = DecodedProfile {
        addr2loc,
        name2id,
        functions,
        crcs: DigestRegistry::new(),
        buildid: agg.buildid.clone(),
    };
    Ok((profile, diagnostics))
}
