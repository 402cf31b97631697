//! Sample aggregation into dense counter tables (spec §4.2).

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::sample::Mispredict;
use crate::{Address, RawError, Result, Sample};

/// Overflow behavior for 64-bit counter addition (spec §3, §7).
///
/// Threaded explicitly through [`Aggregator::new`] rather than a process
/// global, per the reimplementation note in spec §9's Design Notes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CounterPolicy {
    #[default]
    Saturate,
    Abort,
}

impl CounterPolicy {
    /// Add `delta` to `counter` under this overflow policy. Exposed so that
    /// merge (spec §4.10, implemented in `fdo-profile`) applies the same
    /// policy to summed counters as aggregation does.
    ///
    /// `key` is only called to build the diagnostic key on the `Abort`
    /// overflow path, so callers can pass a closure and pay nothing for it
    /// on the (overwhelmingly common) non-overflowing path.
    pub fn add(self, key: impl FnOnce() -> String, counter: u64, delta: u64) -> Result<u64> {
        match counter.checked_add(delta) {
            Some(v) => Ok(v),
            None => match self {
                CounterPolicy::Saturate => Ok(u64::MAX),
                CounterPolicy::Abort => Err(RawError::CounterOverflow { key: key() }),
            },
        }
    }
}

/// Dense counters keyed by address, branch edge, and inferred fall-through
/// trace, with mispredict side-counters and a build-id (spec §3).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AggregatedRawProfile {
    pub instructions: FxHashMap<Address, u64>,
    pub branches: FxHashMap<(Address, Address), u64>,
    pub mispredicts: FxHashMap<(Address, Address), u64>,
    pub traces: FxHashMap<(Address, Address), u64>,
    /// `(prev.to, cur.from)` pairs rejected as backward/degenerate
    /// fall-throughs during aggregation (spec §4.2); attributed to a
    /// function's `malformed_traces` counter once addresses resolve
    /// (spec §4.4).
    pub malformed_trace_sites: Vec<(Address, Address)>,
    pub buildid: Option<String>,
}

impl AggregatedRawProfile {
    pub fn total_samples(&self) -> u64 {
        self.instructions.values().sum()
    }

    /// Every address that appears as an `ip`, a branch endpoint, or a trace
    /// endpoint — the address set the decoder must resolve (spec §4.3).
    pub fn addresses(&self) -> Vec<Address> {
        let mut set: std::collections::HashSet<Address> = std::collections::HashSet::with_capacity(
            self.instructions.len() + 2 * self.branches.len(),
        );
        set.extend(self.instructions.keys().copied());
        for &(a, b) in self.branches.keys() {
            set.insert(a);
            set.insert(b);
        }
        for &(a, b) in self.traces.keys() {
            set.insert(a);
            set.insert(b);
        }
        for &(a, b) in &self.malformed_trace_sites {
            set.insert(a);
            set.insert(b);
        }
        set.into_iter().collect()
    }
}

/// Diagnostics accumulated while aggregating (spec §4.1's "ignored"
/// counter, and the non-fatal duplicate/ordering conditions of §4.2).
#[derive(Clone, Copy, Debug, Default)]
pub struct AggregateDiagnostics {
    pub ignored_lines: u64,
    pub duplicate_non_tail: u64,
    pub stack_index_gaps: u64,
}

/// Consumes samples one at a time, maintaining running counters.
pub struct Aggregator {
    policy: CounterPolicy,
    profile: AggregatedRawProfile,
    diagnostics: AggregateDiagnostics,
}

impl Aggregator {
    pub fn new(policy: CounterPolicy) -> Self {
        Self {
            policy,
            profile: AggregatedRawProfile::default(),
            diagnostics: AggregateDiagnostics::default(),
        }
    }

    pub fn set_buildid(&mut self, buildid: Option<String>) {
        self.profile.buildid = buildid;
    }

    /// Record one bad line, per spec §4.1's recovery policy.
    pub fn record_bad_line(&mut self) {
        self.diagnostics.ignored_lines += 1;
    }

    pub fn ingest(&mut self, sample: &Sample) -> Result<()> {
        let ip_count = self
            .profile
            .instructions
            .get(&sample.ip)
            .copied()
            .unwrap_or(0);
        let ip_count = self.policy.add(|| "instructions".to_string(), ip_count, 1)?;
        self.profile.instructions.insert(sample.ip, ip_count);

        let mut prev: Option<&crate::BranchRecord> = None;
        let chronological: Vec<&crate::BranchRecord> = sample.brstack.iter().rev().collect();
        let len = chronological.len();
        for (i, cur) in chronological.iter().enumerate() {
            let is_last = i + 1 == len;

            if let Some(p) = prev {
                if p.stack_index != cur.stack_index + 1 {
                    self.diagnostics.stack_index_gaps += 1;
                }
            }

            let is_duplicate = prev.is_some_and(|p| p.from == cur.from && p.to == cur.to);
            if is_duplicate {
                if !is_last {
                    self.diagnostics.duplicate_non_tail += 1;
                    tracing::warn!(
                        from = cur.from,
                        to = cur.to,
                        "duplicate LBR entry outside the tail position"
                    );
                }
                // Per spec §4.2: duplicate-and-last is skipped silently;
                // duplicate-not-last still gets a warning but both skip the
                // increment below (the duplicate edge was already counted).
                prev = Some(cur);
                continue;
            }

            let count = self
                .profile
                .branches
                .get(&(cur.from, cur.to))
                .copied()
                .unwrap_or(0);
            let count = self
                .policy
                .add(|| format!("{:#x}/{:#x}", cur.from, cur.to), count, 1)?;
            self.profile.branches.insert((cur.from, cur.to), count);

            if cur.mispredict == Mispredict::Mispredicted {
                let mcount = self
                    .profile
                    .mispredicts
                    .get(&(cur.from, cur.to))
                    .copied()
                    .unwrap_or(0);
                let mcount = self
                    .policy
                    .add(|| format!("mispredict:{:#x}/{:#x}", cur.from, cur.to), mcount, 1)?;
                self.profile.mispredicts.insert((cur.from, cur.to), mcount);
            }

            if let Some(p) = prev {
                if p.to >= cur.from {
                    // Backward or zero-length fall-through: malformed by
                    // definition (spec §4.2, §9 Open Question #2).
                    self.profile.malformed_trace_sites.push((p.to, cur.from));
                } else {
                    let tcount = self
                        .profile
                        .traces
                        .get(&(p.to, cur.from))
                        .copied()
                        .unwrap_or(0);
                    let tcount = self
                        .policy
                        .add(|| format!("trace:{:#x}/{:#x}", p.to, cur.from), tcount, 1)?;
                    self.profile.traces.insert((p.to, cur.from), tcount);
                }
            }

            prev = Some(cur);
        }

        Ok(())
    }

    pub fn finish(self) -> (AggregatedRawProfile, AggregateDiagnostics) {
        (self.profile, self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::BranchRecord;

    fn br(from: Address, to: Address, m: Mispredict, idx: u32) -> BranchRecord {
        BranchRecord {
            from,
            to,
            mispredict: m,
            stack_index: idx,
        }
    }

    #[test]
    fn single_sample_no_branches() {
        let mut agg = Aggregator::new(CounterPolicy::Saturate);
        agg.ingest(&Sample {
            pid: 7,
            ip: 0x400500,
            brstack: vec![br(0x400480, 0x400500, Mispredict::Predicted, 0)],
        })
        .unwrap();
        let (p, _) = agg.finish();
        assert_eq!(p.instructions[&0x400500], 1);
        assert_eq!(p.branches[&(0x400480, 0x400500)], 1);
        assert!(p.mispredicts.is_empty());
        assert!(p.traces.is_empty());
    }

    #[test]
    fn two_branch_sample_reverses_and_detects_malformed_trace() {
        // Most-recent-first on the line: (0x400600->0x400480) then
        // (0x400490->0x400600); chronological order after reversal is the
        // opposite.
        let mut agg = Aggregator::new(CounterPolicy::Saturate);
        agg.ingest(&Sample {
            pid: 1,
            ip: 0x400700,
            brstack: vec![
                br(0x400600, 0x400480, Mispredict::Mispredicted, 0),
                br(0x400490, 0x400600, Mispredict::Predicted, 1),
            ],
        })
        .unwrap();
        let (p, _) = agg.finish();
        assert_eq!(p.branches[&(0x400490, 0x400600)], 1);
        assert_eq!(p.branches[&(0x400600, 0x400480)], 1);
        assert_eq!(p.mispredicts[&(0x400600, 0x400480)], 1);
        // prev.to (0x400600) >= cur.from (0x400600): malformed, not a trace.
        assert!(p.traces.is_empty());
        assert_eq!(p.malformed_trace_sites, vec![(0x400600, 0x400600)]);
    }

    #[test]
    fn duplicate_tail_entry_is_skipped_silently() {
        let mut agg = Aggregator::new(CounterPolicy::Saturate);
        agg.ingest(&Sample {
            pid: 1,
            ip: 0x1,
            brstack: vec![
                br(0x10, 0x20, Mispredict::Unsupported, 0),
                br(0x10, 0x20, Mispredict::Unsupported, 1),
            ],
        })
        .unwrap();
        let (p, diag) = agg.finish();
        assert_eq!(p.branches[&(0x10, 0x20)], 1);
        assert_eq!(diag.duplicate_non_tail, 0);
    }

    #[test]
    fn order_independence_of_per_sample_aggregation() {
        let samples = vec![
            Sample {
                pid: 1,
                ip: 0x100,
                brstack: vec![br(0x10, 0x20, Mispredict::Predicted, 0)],
            },
            Sample {
                pid: 1,
                ip: 0x200,
                brstack: vec![br(0x30, 0x40, Mispredict::Mispredicted, 0)],
            },
        ];

        let mut forward = Aggregator::new(CounterPolicy::Saturate);
        for s in &samples {
            forward.ingest(s).unwrap();
        }
        let (forward, _) = forward.finish();

        let mut backward = Aggregator::new(CounterPolicy::Saturate);
        for s in samples.iter().rev() {
            backward.ingest(s).unwrap();
        }
        let (backward, _) = backward.finish();

        assert_eq!(forward.instructions, backward.instructions);
        assert_eq!(forward.branches, backward.branches);
        assert_eq!(forward.mispredicts, backward.mispredicts);
    }
}
