//! Basic-block and CFG shape (spec §3: "Block info", minus the attributed
//! counts, which are CFG-attribution output owned by `fdo-profile`).

use serde::{Deserialize, Serialize};

use crate::{BlockId, Label};

/// How a block's last instruction ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Terminator {
    /// Falls through into the next block in layout order.
    Fallthrough,
    /// Conditional branch: one taken successor, one fall-through successor.
    Branch,
    /// Unconditional jump to a single successor.
    Jump,
    /// A call; control returns to the following label on return.
    Call,
    Return,
    /// Anything the CFG builder could not classify (e.g. indirect jump).
    Unknown,
}

/// Whether an edge stays within the owning function or leaves it (e.g. a
/// tail call). Interprocedural edges are handled as synthetic call credits
/// in attribution (spec §4.5 step 4), not as ordinary successor edges.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeKind {
    Fallthrough,
    Taken,
}

/// A successor edge out of a block, identified by the target block's entry
/// label (the `target_label` of spec §3's Block info).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub target: BlockId,
    pub kind: EdgeKind,
}

/// A call site within a block, identified by the label of the call
/// instruction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSite {
    pub label: Label,
    pub callee_name: Option<String>,
}

/// One basic block: the half-open range of linear-IR labels it owns, its
/// terminator, and its ordered successors/calls.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub labels: std::ops::Range<Label>,
    pub terminator: Terminator,
    pub successors: Vec<Edge>,
    pub calls: Vec<CallSite>,
}

impl Block {
    pub fn contains_label(&self, label: Label) -> bool {
        self.labels.contains(&label)
    }

    pub fn fallthrough_successor(&self) -> Option<BlockId> {
        self.successors
            .iter()
            .find(|e| e.kind == EdgeKind::Fallthrough)
            .map(|e| e.target)
    }
}

/// The CFG and block layout for one function, as handed to attribution.
///
/// `blocks` is in layout order (spec §4.5's "block-ids from the CFG's
/// layout"); callers needing address order should rely on that ordering
/// rather than sorting by `id`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CfgWithLayout {
    pub function_name: String,
    pub blocks: Vec<Block>,
}

impl CfgWithLayout {
    pub fn block_for_label(&self, label: Label) -> Option<&Block> {
        self.blocks.iter().find(|b| b.contains_label(label))
    }

    pub fn block_by_id(&self, id: BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_cfg() -> CfgWithLayout {
        CfgWithLayout {
            function_name: "f".to_string(),
            blocks: vec![
                Block {
                    id: 0,
                    labels: 0..3,
                    terminator: Terminator::Branch,
                    successors: vec![
                        Edge {
                            target: 1,
                            kind: EdgeKind::Fallthrough,
                        },
                        Edge {
                            target: 2,
                            kind: EdgeKind::Taken,
                        },
                    ],
                    calls: vec![],
                },
                Block {
                    id: 1,
                    labels: 3..5,
                    terminator: Terminator::Fallthrough,
                    successors: vec![],
                    calls: vec![],
                },
                Block {
                    id: 2,
                    labels: 5..8,
                    terminator: Terminator::Return,
                    successors: vec![],
                    calls: vec![],
                },
            ],
        }
    }

    #[test]
    fn finds_block_by_label() {
        let cfg = sample_cfg();
        assert_eq!(cfg.block_for_label(4).map(|b| b.id), Some(1));
        assert_eq!(cfg.block_for_label(7).map(|b| b.id), Some(2));
        assert_eq!(cfg.block_for_label(100), None);
    }

    #[test]
    fn natural_fallthrough_successor() {
        let cfg = sample_cfg();
        let b0 = cfg.block_by_id(0).unwrap();
        assert_eq!(b0.fallthrough_successor(), Some(1));
    }
}
