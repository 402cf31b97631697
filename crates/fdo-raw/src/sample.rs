//! Sample and branch-record types (spec §3).

use crate::Address;

/// A single LBR entry's mispredict flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mispredict {
    Mispredicted,
    Predicted,
    Unsupported,
}

/// One taken-branch record within a sample's `brstack`.
///
/// `stack_index` is as tokenized on the line: `0` is the most recent branch.
/// Samples store records in that as-parsed (most-recent-first) order; the
/// aggregator reverses before walking, per spec §3/§4.2.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BranchRecord {
    pub from: Address,
    pub to: Address,
    pub mispredict: Mispredict,
    pub stack_index: u32,
}

/// One observation `{ip, brstack}` emitted by the sampler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sample {
    pub pid: u32,
    pub ip: Address,
    pub brstack: Vec<BranchRecord>,
}
