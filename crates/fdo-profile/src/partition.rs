//! Function-level partition of aggregated counters (spec §4.4).

use rustc_hash::FxHashMap;

use crate::function::{FunctionId, FunctionRecord};
use crate::location::Location;
use crate::Address;
use fdo_raw::AggregatedRawProfile;

fn owning_function(addr2loc: &FxHashMap<Address, Location>, addr: Address) -> Option<FunctionId> {
    addr2loc.get(&addr).and_then(|loc| loc.rel.as_ref()).map(|r| r.function_id)
}

enum EdgeAttribution {
    Skip,
    One(FunctionId),
    Both(FunctionId, FunctionId),
}

fn classify(
    addr2loc: &FxHashMap<Address, Location>,
    from: Address,
    to: Address,
) -> EdgeAttribution {
    match (owning_function(addr2loc, from), owning_function(addr2loc, to)) {
        (None, None) => EdgeAttribution::Skip,
        (Some(f), None) | (None, Some(f)) => EdgeAttribution::One(f),
        (Some(fa), Some(fb)) if fa == fb => EdgeAttribution::One(fa),
        (Some(fa), Some(fb)) => EdgeAttribution::Both(fa, fb),
    }
}

/// Partition `agg`'s dense counter tables into each resolved function's
/// `count`/`malformed_traces`/`agg` (spec §4.4). `functions` must already
/// contain every function id that `addr2loc` names (decode interns them
/// before calling this).
pub(crate) fn partition(
    addr2loc: &FxHashMap<Address, Location>,
    functions: &mut FxHashMap<FunctionId, FunctionRecord>,
    agg: &AggregatedRawProfile,
) {
    for (&addr, &count) in &agg.instructions {
        if let Some(id) = owning_function(addr2loc, addr) {
            let f = functions.get_mut(&id).expect("interned during decode");
            f.count += count;
            debug_assert!(f.agg.instructions.insert(addr, count).is_none(), "duplicate instruction address {addr:#x} in aggregated profile");
        }
    }

    for (&(a, b), &count) in &agg.branches {
        match classify(addr2loc, a, b) {
            EdgeAttribution::Skip => {}
            EdgeAttribution::One(id) => {
                let f = functions.get_mut(&id).expect("interned during decode");
                f.count += count;
                debug_assert!(f.agg.branches.insert((a, b), count).is_none(), "duplicate branch edge {a:#x}/{b:#x} in aggregated profile");
            }
            EdgeAttribution::Both(fa, fb) => {
                for id in [fa, fb] {
                    let f = functions.get_mut(&id).expect("interned during decode");
                    f.count += count;
                    debug_assert!(f.agg.branches.insert((a, b), count).is_none(), "duplicate branch edge {a:#x}/{b:#x} in aggregated profile");
                }
            }
        }
    }

    for (&(a, b), &count) in &agg.mispredicts {
        match classify(addr2loc, a, b) {
            EdgeAttribution::Skip => {}
            EdgeAttribution::One(id) => {
                let prev = functions
                    .get_mut(&id)
                    .expect("interned during decode")
                    .agg
                    .mispredicts
                    .insert((a, b), count);
                debug_assert!(prev.is_none(), "duplicate mispredict edge {a:#x}/{b:#x} in aggregated profile");
            }
            EdgeAttribution::Both(fa, fb) => {
                for id in [fa, fb] {
                    let prev = functions
                        .get_mut(&id)
                        .expect("interned during decode")
                        .agg
                        .mispredicts
                        .insert((a, b), count);
                    debug_assert!(prev.is_none(), "duplicate mispredict edge {a:#x}/{b:#x} in aggregated profile");
                }
            }
        }
    }

    for (&(a, b), &count) in &agg.traces {
        match classify(addr2loc, a, b) {
            EdgeAttribution::Skip => {}
            EdgeAttribution::One(id) => {
                let prev = functions
                    .get_mut(&id)
                    .expect("interned during decode")
                    .agg
                    .traces
                    .insert((a, b), count);
                debug_assert!(prev.is_none(), "duplicate trace edge {a:#x}/{b:#x} in aggregated profile");
            }
            EdgeAttribution::Both(fa, fb) => {
                for id in [fa, fb] {
                    let prev = functions
                        .get_mut(&id)
                        .expect("interned during decode")
                        .agg
                        .traces
                        .insert((a, b), count);
                    debug_assert!(prev.is_none(), "duplicate trace edge {a:#x}/{b:#x} in aggregated profile");
                }
            }
        }
    }

    for &(prev_to, cur_from) in &agg.malformed_trace_sites {
        match classify(addr2loc, prev_to, cur_from) {
            EdgeAttribution::Skip => {}
            EdgeAttribution::One(id) => {
                functions.get_mut(&id).expect("interned during decode").malformed_traces += 1;
            }
            EdgeAttribution::Both(fa, fb) => {
                for id in [fa, fb] {
                    functions.get_mut(&id).expect("interned during decode").malformed_traces += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::RelLoc;

    fn loc(addr: Address, function_id: FunctionId) -> Location {
        Location {
            addr,
            rel: Some(RelLoc {
                function_id,
                offset: 0,
                cfg_label: None,
            }),
            dbg: None,
        }
    }

    #[test]
    fn interprocedural_branch_double_charges_both_functions() {
        let mut addr2loc = FxHashMap::default();
        addr2loc.insert(0x1000, loc(0x1000, 0));
        addr2loc.insert(0x2000, loc(0x2000, 1));

        let mut functions = FxHashMap::default();
        functions.insert(0, FunctionRecord::new(0, "f".into(), 0x1000, 0x1010));
        functions.insert(1, FunctionRecord::new(1, "g".into(), 0x2000, 0x2010));

        let mut agg = AggregatedRawProfile::default();
        agg.branches.insert((0x1000, 0x2000), 5);

        partition(&addr2loc, &mut functions, &agg);

        assert_eq!(functions[&0].count, 5);
        assert_eq!(functions[&1].count, 5);
        assert_eq!(functions[&0].agg.branches[&(0x1000, 0x2000)], 5);
        assert_eq!(functions[&1].agg.branches[&(0x1000, 0x2000)], 5);
    }

    #[test]
    fn traces_do_not_add_to_count() {
        let mut addr2loc = FxHashMap::default();
        addr2loc.insert(0x1000, loc(0x1000, 0));
        addr2loc.insert(0x1008, loc(0x1008, 0));

        let mut functions = FxHashMap::default();
        functions.insert(0, FunctionRecord::new(0, "f".into(), 0x1000, 0x1010));

        let mut agg = AggregatedRawProfile::default();
        agg.traces.insert((0x1000, 0x1008), 3);

        partition(&addr2loc, &mut functions, &agg);

        assert_eq!(functions[&0].count, 0);
        assert_eq!(functions[&0].agg.traces[&(0x1000, 0x1008)], 3);
    }
}
