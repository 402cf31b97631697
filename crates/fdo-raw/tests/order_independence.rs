//! Property test for spec §8: `aggregate(permute(S)) = aggregate(S)`.

use fdo_raw::{Aggregator, BranchRecord, CounterPolicy, Mispredict, Sample};
use quickcheck::{quickcheck, Arbitrary, Gen};

#[derive(Clone, Debug)]
struct SampleSeq(Vec<Sample>);

impl Arbitrary for SampleSeq {
    fn arbitrary(g: &mut Gen) -> Self {
        let addrs: Vec<u64> = (0..8).map(|i| 0x1000 + i * 0x10).collect();
        let pick = |g: &mut Gen| *g.choose(&addrs).unwrap();
        let len = (usize::arbitrary(g) % 12) + 1;
        let samples = (0..len)
            .map(|_| {
                let nbranch = usize::arbitrary(g) % 3;
                let brstack = (0..nbranch)
                    .map(|idx| BranchRecord {
                        from: pick(g),
                        to: pick(g),
                        mispredict: if bool::arbitrary(g) {
                            Mispredict::Mispredicted
                        } else {
                            Mispredict::Predicted
                        },
                        stack_index: idx as u32,
                    })
                    .collect();
                Sample {
                    pid: 1,
                    ip: pick(g),
                    brstack,
                }
            })
            .collect();
        SampleSeq(samples)
    }
}

fn aggregate(samples: &[Sample]) -> fdo_raw::AggregatedRawProfile {
    let mut agg = Aggregator::new(CounterPolicy::Saturate);
    for s in samples {
        agg.ingest(s).unwrap();
    }
    agg.finish().0
}

quickcheck! {
    fn order_independent(seq: SampleSeq, shuffle_seed: u8) -> bool {
        let mut permuted = seq.0.clone();
        // Deterministic pseudo-shuffle: rotate by the seed, a cheap stand-in
        // for a full permutation that still covers many ordering classes.
        if !permuted.is_empty() {
            let rotate_by = shuffle_seed as usize % permuted.len();
            permuted.rotate_left(rotate_by);
        }

        let a = aggregate(&seq.0);
        let b = aggregate(&permuted);
        a.instructions == b.instructions
            && a.branches == b.branches
            && a.mispredicts == b.mispredicts
            && a.traces == b.traces
    }
}
