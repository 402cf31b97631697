//! CFG attribution (spec §4.5): per-function block/edge execution counts.

use rustc_hash::FxHashMap;

use crate::function::FunctionId;
use crate::{Address, DecodedProfile, Diagnostics};
use fdo_ir::{BlockId, CfgWithLayout, EdgeKind, Label};

#[derive(Clone, Debug)]
pub struct SuccessorCount {
    pub target: BlockId,
    pub kind: EdgeKind,
    pub taken_count: u64,
    pub mispredict_count: u64,
}

#[derive(Clone, Debug)]
pub struct CallCount {
    pub label: Label,
    pub callee: Option<String>,
    pub count: u64,
}

#[derive(Clone, Debug)]
pub struct BlockCounts {
    pub entry_count: u64,
    pub successors: Vec<SuccessorCount>,
    pub calls: Vec<CallCount>,
}

#[derive(Clone, Debug)]
pub struct AttributedFunction {
    pub function_name: String,
    pub blocks: FxHashMap<BlockId, BlockCounts>,
}

fn init_blocks(cfg: &CfgWithLayout) -> FxHashMap<BlockId, BlockCounts> {
    cfg.blocks
        .iter()
        .map(|b| {
            (
                b.id,
                BlockCounts {
                    entry_count: 0,
                    successors: b
                        .successors
                        .iter()
                        .map(|e| SuccessorCount {
                            target: e.target,
                            kind: e.kind,
                            taken_count: 0,
                            mispredict_count: 0,
                        })
                        .collect(),
                    calls: b
                        .calls
                        .iter()
                        .map(|c| CallCount {
                            label: c.label,
                            callee: c.callee_name.clone(),
                            count: 0,
                        })
                        .collect(),
                },
            )
        })
        .collect()
}

fn cfg_label_of(profile: &DecodedProfile, addr: Address) -> Option<Label> {
    profile
        .addr2loc
        .get(&addr)
        .and_then(|loc| loc.rel.as_ref())
        .and_then(|r| r.cfg_label)
}

fn owner_of(profile: &DecodedProfile, addr: Address) -> Option<FunctionId> {
    profile.addr2loc.get(&addr).and_then(|loc| loc.rel.as_ref()).map(|r| r.function_id)
}

/// Attribute `f`'s aggregated counters onto `cfg`'s blocks and edges,
/// provided the precondition in spec §4.5 holds (`count > 0` and
/// `has_linearids`). Returns `None` ("no attribution") otherwise, without
/// error.
pub fn attribute(
    profile: &mut DecodedProfile,
    function_name: &str,
    cfg: &CfgWithLayout,
    diagnostics: &mut Diagnostics,
) -> Option<AttributedFunction> {
    let id = *profile.name2id.get(function_name)?;

    let (instructions, traces, branches, mispredicts) = {
        let f = profile.functions.get(&id)?;
        if f.count == 0 || !f.has_linearids {
            return None;
        }
        (
            f.agg.instructions.clone(),
            f.agg.traces.clone(),
            f.agg.branches.clone(),
            f.agg.mispredicts.clone(),
        )
    };

    let mut blocks = init_blocks(cfg);

    // Step 2: instruction samples credit block entry counts and, when the IP
    // falls on a terminator, the block's single outgoing edge.
    for (&addr, &count) in &instructions {
        let Some(label) = cfg_label_of(profile, addr) else {
            continue;
        };
        let candidates: Vec<&fdo_ir::Block> = cfg.blocks.iter().filter(|b| b.contains_label(label)).collect();
        if candidates.len() > 1 {
            diagnostics.ambiguous_debug_ties += 1;
        }
        let Some(block) = candidates.first() else {
            continue;
        };
        blocks.get_mut(&block.id).expect("initialized above").entry_count += count;

        if label + 1 == block.labels.end {
            if let [only] = block.successors.as_slice() {
                if let Some(sc) = blocks
                    .get_mut(&block.id)
                    .expect("initialized above")
                    .successors
                    .iter_mut()
                    .find(|s| s.target == only.target)
                {
                    sc.taken_count += count;
                }
            }
        }
    }

    // Step 4: branches classify as intra- or inter-function.
    for (&(from, to), &count) in &branches {
        let Some(from_label) = cfg_label_of(profile, from) else {
            continue;
        };
        let Some(from_block) = cfg.blocks.iter().find(|b| b.contains_label(from_label)) else {
            continue;
        };

        if owner_of(profile, to) == Some(id) {
            if let Some(to_label) = cfg_label_of(profile, to) {
                if let Some(target_block) = cfg.blocks.iter().find(|b| b.contains_label(to_label)) {
                    let fb = blocks.get_mut(&from_block.id).expect("initialized above");
                    if let Some(sc) = fb.successors.iter_mut().find(|s| s.target == target_block.id) {
                        sc.taken_count += count;
                        sc.mispredict_count += mispredicts.get(&(from, to)).copied().unwrap_or(0);
                    }
                    // No matching successor edge: discard per spec §4.5 step 4.
                }
            }
        } else {
            let callee = owner_of(profile, to).and_then(|fid| profile.functions.get(&fid)).map(|f| f.name.clone());
            let fb = blocks.get_mut(&from_block.id).expect("initialized above");
            if let Some(call) = fb.calls.iter_mut().find(|c| c.label == from_label) {
                call.count += count;
            } else {
                fb.calls.push(CallCount {
                    label: from_label,
                    callee,
                    count,
                });
                diagnostics.synthetic_call_edges += 1;
            }
        }
    }

    // Step 3: intra-function fall-through traces.
    let mut unreachable = 0u64;
    for (&(from, to), &count) in &traces {
        if owner_of(profile, from) != Some(id) || owner_of(profile, to) != Some(id) {
            unreachable += count;
            continue;
        }
        let (Some(from_label), Some(to_label)) = (cfg_label_of(profile, from), cfg_label_of(profile, to)) else {
            unreachable += count;
            continue;
        };
        let (Some(from_block), Some(to_block)) = (
            cfg.blocks.iter().find(|b| b.contains_label(from_label)),
            cfg.blocks.iter().find(|b| b.contains_label(to_label)),
        ) else {
            unreachable += count;
            continue;
        };

        let terminal = from_label + 1 == from_block.labels.end;
        let entry = to_label == to_block.labels.start;
        if terminal && entry && from_block.fallthrough_successor() == Some(to_block.id) {
            let fb = blocks.get_mut(&from_block.id).expect("initialized above");
            if let Some(sc) = fb
                .successors
                .iter_mut()
                .find(|s| s.kind == EdgeKind::Fallthrough && s.target == to_block.id)
            {
                sc.taken_count += count;
            }
        } else {
            unreachable += count;
        }
    }

    if unreachable > 0 {
        if let Some(f) = profile.functions.get_mut(&id) {
            f.malformed_traces += unreachable;
        }
    }

    Some(AttributedFunction {
        function_name: function_name.to_string(),
        blocks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::FunctionRecord;
    use crate::location::RelLoc;
    use fdo_ir::{Block, Edge, Terminator};
    use rustc_hash::FxHashMap as Map;

    fn sample_cfg() -> CfgWithLayout {
        CfgWithLayout {
            function_name: "f".to_string(),
            blocks: vec![
                Block {
                    id: 0,
                    labels: 0..2,
                    terminator: Terminator::Fallthrough,
                    successors: vec![Edge {
                        target: 1,
                        kind: EdgeKind::Fallthrough,
                    }],
                    calls: vec![],
                },
                Block {
                    id: 1,
                    labels: 2..4,
                    terminator: Terminator::Return,
                    successors: vec![],
                    calls: vec![],
                },
            ],
        }
    }

    fn profile_with_fallthrough_trace() -> DecodedProfile {
        let mut addr2loc = Map::default();
        addr2loc.insert(
            0x1000,
            crate::location::Location {
                addr: 0x1000,
                rel: Some(RelLoc {
                    function_id: 0,
                    offset: 0,
                    cfg_label: Some(1),
                }),
                dbg: Some(crate::location::DebugLoc {
                    file: "f.ll".into(),
                    line: 1,
                }),
            },
        );
        addr2loc.insert(
            0x1008,
            crate::location::Location {
                addr: 0x1008,
                rel: Some(RelLoc {
                    function_id: 0,
                    offset: 8,
                    cfg_label: Some(2),
                }),
                dbg: Some(crate::location::DebugLoc {
                    file: "f.ll".into(),
                    line: 2,
                }),
            },
        );

        let mut f = FunctionRecord::new(0, "f".into(), 0x1000, 0x1010);
        f.count = 4;
        f.has_linearids = true;
        f.agg.traces.insert((0x1000, 0x1008), 4);

        let mut functions = Map::default();
        functions.insert(0, f);
        let mut name2id = Map::default();
        name2id.insert("f".to_string(), 0u32);

        DecodedProfile {
            addr2loc,
            name2id,
            functions,
            crcs: crate::DigestRegistry::new(),
            buildid: None,
        }
    }

    #[test]
    fn intra_function_trace_credits_fallthrough_edge() {
        let mut profile = profile_with_fallthrough_trace();
        let cfg = sample_cfg();
        let mut diagnostics = Diagnostics::default();
        let attributed = attribute(&mut profile, "f", &cfg, &mut diagnostics).unwrap();
        let b0 = &attributed.blocks[&0];
        assert_eq!(b0.successors[0].taken_count, 4);
        assert_eq!(profile.functions[&0].malformed_traces, 0);
    }

    #[test]
    fn no_attribution_without_linearids() {
        let mut profile = profile_with_fallthrough_trace();
        profile.functions.get_mut(&0).unwrap().has_linearids = false;
        let cfg = sample_cfg();
        let mut diagnostics = Diagnostics::default();
        assert!(attribute(&mut profile, "f", &cfg, &mut diagnostics).is_none());
    }

    #[test]
    fn unreachable_trace_counts_as_malformed() {
        let mut profile = profile_with_fallthrough_trace();
        // Rewire the trace to point at a non-entry label of block 1.
        let f = profile.functions.get_mut(&0).unwrap();
        f.agg.traces.clear();
        f.agg.traces.insert((0x1000, 0x1008), 4);
        profile.addr2loc.get_mut(&0x1008).unwrap().rel.as_mut().unwrap().cfg_label = Some(3);
        let cfg = sample_cfg();
        let mut diagnostics = Diagnostics::default();
        let attributed = attribute(&mut profile, "f", &cfg, &mut diagnostics).unwrap();
        assert_eq!(attributed.blocks[&0].successors[0].taken_count, 0);
        assert_eq!(profile.functions[&0].malformed_traces, 4);
    }

    #[test]
    fn inter_function_branch_becomes_synthetic_call() {
        let mut profile = profile_with_fallthrough_trace();
        profile.addr2loc.insert(
            0x2000,
            crate::location::Location {
                addr: 0x2000,
                rel: Some(RelLoc {
                    function_id: 1,
                    offset: 0,
                    cfg_label: None,
                }),
                dbg: None,
            },
        );
        profile.functions.insert(1, FunctionRecord::new(1, "g".into(), 0x2000, 0x2010));
        profile.name2id.insert("g".to_string(), 1);
        let f = profile.functions.get_mut(&0).unwrap();
        f.agg.branches.insert((0x1000, 0x2000), 2);
        let cfg = sample_cfg();
        let mut diagnostics = Diagnostics::default();
        let attributed = attribute(&mut profile, "f", &cfg, &mut diagnostics).unwrap();
        let b0 = &attributed.blocks[&0];
        assert_eq!(b0.calls.len(), 1);
        assert_eq!(b0.calls[0].count, 2);
        assert_eq!(b0.calls[0].callee.as_deref(), Some("g"));
    }
}
