//! Trim (spec §4.9): an ordered list of predicates narrowing the surviving
//! function set, applied in sequence and then materialized into the profile.

use rustc_hash::FxHashSet;

use crate::function::FunctionId;
use crate::DecodedProfile;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TrimPredicate {
    /// Keep the top `n` functions by `count`.
    Top(usize),
    /// Keep the smallest prefix (by count-descending order) whose cumulative
    /// function-count-rank is within the top `p` percent of the function
    /// count.
    TopPercent(f64),
    /// Keep the smallest prefix whose cumulative sample count reaches `p`
    /// percent of the total.
    TopPercentSamples(f64),
    /// Drop functions with `count < k`.
    MinSamples(u64),
}

fn sort_by_count_desc(profile: &DecodedProfile, ids: &[FunctionId]) -> Vec<FunctionId> {
    let mut sorted = ids.to_vec();
    sorted.sort_by(|&a, &b| {
        let fa = &profile.functions[&a];
        let fb = &profile.functions[&b];
        fb.count.cmp(&fa.count).then(a.cmp(&b))
    });
    sorted
}

fn apply_predicate(profile: &DecodedProfile, surviving: &[FunctionId], predicate: TrimPredicate) -> Vec<FunctionId> {
    let sorted = sort_by_count_desc(profile, surviving);
    match predicate {
        TrimPredicate::Top(n) => sorted.into_iter().take(n).collect(),
        TrimPredicate::MinSamples(k) => sorted.into_iter().filter(|id| profile.functions[id].count >= k).collect(),
        TrimPredicate::TopPercent(p) => {
            let keep_n = (((sorted.len() as f64) * (p / 100.0)).ceil() as usize).min(sorted.len());
            sorted.into_iter().take(keep_n).collect()
        }
        TrimPredicate::TopPercentSamples(p) => {
            let total: u64 = sorted.iter().map(|id| profile.functions[id].count).sum();
            let threshold = ((total as f64) * (p / 100.0)).ceil() as u64;
            let mut cumulative = 0u64;
            let mut kept = Vec::new();
            for id in sorted {
                if cumulative >= threshold {
                    break;
                }
                cumulative += profile.functions[&id].count;
                kept.push(id);
            }
            kept
        }
    }
}

/// Apply `predicates` in order, each filtering the surviving set produced by
/// the previous one, then drop everything not kept: `functions`, `name2id`,
/// and `addr2loc` entries pointing at dropped functions, and trim the digest
/// registry to match (spec §4.9).
pub fn trim(profile: &mut DecodedProfile, predicates: &[TrimPredicate]) {
    let mut surviving: Vec<FunctionId> = profile.functions.keys().copied().collect();
    for &predicate in predicates {
        surviving = apply_predicate(profile, &surviving, predicate);
    }

    let keep: FxHashSet<FunctionId> = surviving.into_iter().collect();
    profile.functions.retain(|id, _| keep.contains(id));
    profile.name2id.retain(|_, id| keep.contains(id));
    profile
        .addr2loc
        .retain(|_, loc| loc.rel.as_ref().is_none_or(|r| keep.contains(&r.function_id)));

    let keep_names: FxHashSet<String> = profile.functions.values().map(|f| f.name.clone()).collect();
    profile.crcs.trim(&keep_names);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::DigestRegistry;
    use crate::function::FunctionRecord;
    use rustc_hash::FxHashMap;

    fn profile_with_counts(counts: &[u64]) -> DecodedProfile {
        let mut functions = FxHashMap::default();
        let mut name2id = FxHashMap::default();
        for (i, &count) in counts.iter().enumerate() {
            let id = i as FunctionId;
            let mut f = FunctionRecord::new(id, format!("f{i}"), 0x1000 * u64::from(id), 0x1000 * u64::from(id) + 1);
            f.count = count;
            name2id.insert(f.name.clone(), id);
            functions.insert(id, f);
        }
        DecodedProfile {
            addr2loc: FxHashMap::default(),
            name2id,
            functions,
            crcs: DigestRegistry::new(),
            buildid: None,
        }
    }

    #[test]
    fn min_samples_then_top_matches_spec_scenario_6() {
        // 50 functions, 12 with count >= 100; `[MinSamples 100; Top 10]`
        // should yield exactly 10: the highest-count 10 among the 12.
        let mut counts: Vec<u64> = (0..38).map(|i| i + 1).collect(); // below 100
        counts.extend([100, 110, 120, 130, 140, 150, 160, 170, 180, 190, 200, 210]); // 12 at/above 100
        assert_eq!(counts.len(), 50);
        let mut profile = profile_with_counts(&counts);

        trim(&mut profile, &[TrimPredicate::MinSamples(100), TrimPredicate::Top(10)]);

        assert_eq!(profile.functions.len(), 10);
        let min_kept = profile.functions.values().map(|f| f.count).min().unwrap();
        assert!(min_kept >= 110); // the lowest of the 12 (100) is dropped by Top(10)
    }

    #[test]
    fn top_n_bounds_surviving_count() {
        let mut profile = profile_with_counts(&[5, 4, 3, 2, 1]);
        trim(&mut profile, &[TrimPredicate::Top(2)]);
        assert_eq!(profile.functions.len(), 2);
    }

    #[test]
    fn trim_prunes_name2id_and_addr2loc() {
        let mut profile = profile_with_counts(&[10, 1]);
        profile.addr2loc.insert(
            0x1000,
            crate::location::Location {
                addr: 0x1000,
                rel: Some(crate::location::RelLoc {
                    function_id: 1,
                    offset: 0,
                    cfg_label: None,
                }),
                dbg: None,
            },
        );
        trim(&mut profile, &[TrimPredicate::Top(1)]);
        assert_eq!(profile.functions.len(), 1);
        assert_eq!(profile.name2id.len(), 1);
        assert!(profile.addr2loc.is_empty());
    }
}
