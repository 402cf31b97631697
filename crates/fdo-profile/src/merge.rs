//! Merge (spec §4.10): fold one decoded profile into another, accumulated
//! across several profiling runs of the same build.

use rustc_hash::FxHashMap;

use fdo_raw::CounterPolicy;

use crate::digest::DigestPolicy;
use crate::function::{FunctionId, FunctionRecord, PerFunctionAgg};
use crate::location::Location;
use crate::{Address, DecodedProfile, ProfileError, Result};

fn remap_function_id(base: &mut DecodedProfile, next_id: &mut FunctionId, other: &FunctionRecord) -> FunctionId {
    if let Some(&existing) = base.name2id.get(&other.name) {
        return existing;
    }
    let id = *next_id;
    *next_id += 1;
    base.name2id.insert(other.name.clone(), id);
    id
}

fn merge_pairs(
    into: &mut FxHashMap<Address, u64>,
    from: &FxHashMap<Address, u64>,
    label: &str,
    policy: CounterPolicy,
) -> Result<()> {
    for (&addr, &delta) in from {
        let current = into.get(&addr).copied().unwrap_or(0);
        into.insert(addr, policy.add(|| format!("{label}:{addr:#x}"), current, delta)?);
    }
    Ok(())
}

fn merge_edges(
    into: &mut FxHashMap<(Address, Address), u64>,
    from: &FxHashMap<(Address, Address), u64>,
    label: &str,
    policy: CounterPolicy,
) -> Result<()> {
    for (&edge, &delta) in from {
        let current = into.get(&edge).copied().unwrap_or(0);
        into.insert(
            edge,
            policy.add(|| format!("{label}:{:#x}/{:#x}", edge.0, edge.1), current, delta)?,
        );
    }
    Ok(())
}

fn merge_agg(into: &mut PerFunctionAgg, from: &PerFunctionAgg, policy: CounterPolicy) -> Result<()> {
    merge_pairs(&mut into.instructions, &from.instructions, "instructions", policy)?;
    merge_edges(&mut into.branches, &from.branches, "branches", policy)?;
    merge_edges(&mut into.mispredicts, &from.mispredicts, "mispredicts", policy)?;
    merge_edges(&mut into.traces, &from.traces, "traces", policy)?;
    Ok(())
}

/// Fold `other` into `base` in place (spec §4.10).
///
/// Functions are matched by name, not by the dense id each profile assigned
/// independently at decode time; `other`'s ids are remapped onto `base`'s id
/// space (reusing a shared name's existing id, allocating fresh ids past
/// `base`'s current maximum otherwise) before any counter is touched.
pub fn merge(base: &mut DecodedProfile, other: &DecodedProfile, policy: CounterPolicy, ignore_buildid: bool, digest_policy: DigestPolicy) -> Result<()> {
    if !ignore_buildid {
        if let (Some(a), Some(b)) = (&base.buildid, &other.buildid) {
            if a != b {
                return Err(ProfileError::BuildidMismatch { a: a.clone(), b: b.clone() });
            }
        }
    }

    let mut next_id: FunctionId = base.functions.keys().copied().max().map_or(0, |m| m + 1);
    let mut id_map: FxHashMap<FunctionId, FunctionId> = FxHashMap::default();
    for other_record in other.functions.values() {
        let mapped = remap_function_id(base, &mut next_id, other_record);
        id_map.insert(other_record.id, mapped);
    }

    for other_record in other.functions.values() {
        let mapped_id = id_map[&other_record.id];
        match base.functions.get_mut(&mapped_id) {
            Some(existing) => {
                existing.count = policy.add(|| format!("count:{}", existing.name), existing.count, other_record.count)?;
                existing.malformed_traces = policy.add(
                    || format!("malformed_traces:{}", existing.name),
                    existing.malformed_traces,
                    other_record.malformed_traces,
                )?;
                existing.has_linearids = existing.has_linearids || other_record.has_linearids;
                merge_agg(&mut existing.agg, &other_record.agg, policy)?;
            }
            None => {
                let mut fresh = FunctionRecord::new(mapped_id, other_record.name.clone(), other_record.start, other_record.finish);
                fresh.has_linearids = other_record.has_linearids;
                fresh.count = other_record.count;
                fresh.malformed_traces = other_record.malformed_traces;
                fresh.agg = other_record.agg.clone();
                base.functions.insert(mapped_id, fresh);
            }
        }
    }

    for (&addr, loc) in &other.addr2loc {
        let remapped = remap_location(loc, &id_map);
        match base.addr2loc.get(&addr) {
            None => {
                base.addr2loc.insert(addr, remapped);
            }
            Some(existing) => {
                if !locations_agree(existing, &remapped) {
                    return Err(ProfileError::LocationConflict { addr });
                }
            }
        }
    }

    base.crcs.merge(&other.crcs, digest_policy)?;

    if base.buildid.is_none() {
        base.buildid = other.buildid.clone();
    }

    Ok(())
}

fn remap_location(loc: &Location, id_map: &FxHashMap<FunctionId, FunctionId>) -> Location {
    let mut remapped = loc.clone();
    if let Some(rel) = remapped.rel.as_mut() {
        if let Some(&mapped) = id_map.get(&rel.function_id) {
            rel.function_id = mapped;
        }
    }
    remapped
}

/// Two decodings of the same address should agree on everything except
/// which profile's `function_id` numbering they carry — already normalized
/// by `remap_location` before this check runs.
fn locations_agree(a: &Location, b: &Location) -> bool {
    a.rel == b.rel && a.dbg == b.dbg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::DigestRegistry;
    use crate::location::RelLoc;
    use rustc_hash::FxHashMap as Map;

    fn single_function_profile(name: &str, count: u64, addr: Address) -> DecodedProfile {
        let mut functions = Map::default();
        let mut f = FunctionRecord::new(0, name.to_string(), addr, addr + 0x10);
        f.count = count;
        f.agg.instructions.insert(addr, count);
        functions.insert(0, f);
        let mut name2id = Map::default();
        name2id.insert(name.to_string(), 0u32);
        let mut addr2loc = Map::default();
        addr2loc.insert(
            addr,
            Location {
                addr,
                rel: Some(RelLoc {
                    function_id: 0,
                    offset: 0,
                    cfg_label: None,
                }),
                dbg: None,
            },
        );
        DecodedProfile {
            addr2loc,
            name2id,
            functions,
            crcs: DigestRegistry::new(),
            buildid: Some("abc123".to_string()),
        }
    }

    #[test]
    fn merge_sums_counts_for_shared_function_name() {
        let mut base = single_function_profile("f", 10, 0x1000);
        let other = single_function_profile("f", 5, 0x1000);
        merge(&mut base, &other, CounterPolicy::Saturate, false, DigestPolicy::Fail).unwrap();
        assert_eq!(base.functions.len(), 1);
        assert_eq!(base.functions[&0].count, 15);
        assert_eq!(base.functions[&0].agg.instructions[&0x1000], 15);
    }

    #[test]
    fn merge_remaps_distinct_function_onto_fresh_id() {
        let mut base = single_function_profile("f", 10, 0x1000);
        let other = single_function_profile("g", 7, 0x2000);
        merge(&mut base, &other, CounterPolicy::Saturate, false, DigestPolicy::Fail).unwrap();
        assert_eq!(base.functions.len(), 2);
        assert!(base.name2id.contains_key("g"));
        let g_id = base.name2id["g"];
        assert_ne!(g_id, base.name2id["f"]);
        assert_eq!(base.functions[&g_id].count, 7);
        assert_eq!(base.addr2loc[&0x2000].rel.as_ref().unwrap().function_id, g_id);
    }

    #[test]
    fn merge_rejects_buildid_mismatch() {
        let mut base = single_function_profile("f", 10, 0x1000);
        let mut other = single_function_profile("f", 5, 0x1000);
        other.buildid = Some("different".to_string());
        let err = merge(&mut base, &other, CounterPolicy::Saturate, false, DigestPolicy::Fail);
        assert!(matches!(err, Err(ProfileError::BuildidMismatch { .. })));
    }

    #[test]
    fn merge_ignores_buildid_when_requested() {
        let mut base = single_function_profile("f", 10, 0x1000);
        let mut other = single_function_profile("f", 5, 0x1000);
        other.buildid = Some("different".to_string());
        merge(&mut base, &other, CounterPolicy::Saturate, true, DigestPolicy::Fail).unwrap();
        assert_eq!(base.functions[&0].count, 15);
    }
}
