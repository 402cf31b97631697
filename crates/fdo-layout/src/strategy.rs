//! Ordering strategies for the hot-functions layout (spec §4.8).

use rand::{rngs::StdRng, RngCore, SeedableRng};

use fdo_profile::{DecodedProfile, FunctionRecord};

/// A totally ordered emission strategy for function symbols.
///
/// `ExecCountDesc` is the default: sorted by `count` descending, ties broken
/// by ascending `id` for a stable, deterministic result. `Random` is seeded
/// deterministically from `seed` plus the sorted list of input file names, so
/// the PRNG draw is insensitive to the order those files were passed on the
/// command line. `InSrcOrder` preserves the function's original address
/// order (a no-op layout, useful as a baseline). `HotColdJump` groups
/// `count > 0` functions first (by `ExecCountDesc`), then cold functions in
/// their original address order, so a single jump at the hot/cold boundary
/// separates the two regions.
#[derive(Clone, Debug, PartialEq)]
pub enum LayoutStrategy {
    ExecCountDesc,
    Random { seed: u64, input_files: Vec<String> },
    InSrcOrder,
    HotColdJump,
}

fn by_exec_count_desc(a: &FunctionRecord, b: &FunctionRecord) -> std::cmp::Ordering {
    b.count.cmp(&a.count).then(a.id.cmp(&b.id))
}

fn by_src_order(a: &FunctionRecord, b: &FunctionRecord) -> std::cmp::Ordering {
    a.start.cmp(&b.start).then(a.id.cmp(&b.id))
}

fn random_order<'a>(functions: &mut Vec<&'a FunctionRecord>, seed: u64, input_files: &[String]) {
    // Sort into a canonical order before drawing random keys, so the result
    // doesn't depend on the profile's internal hash-map iteration order.
    functions.sort_by(|a, b| a.name.cmp(&b.name));

    let mut sorted_files: Vec<&str> = input_files.iter().map(String::as_str).collect();
    sorted_files.sort_unstable();
    let combined = fxhash::hash64(&(seed, &sorted_files));
    let mut rng = StdRng::seed_from_u64(combined);

    let mut keyed: Vec<(u64, &FunctionRecord)> = functions.iter().map(|&f| (rng.next_u64(), f)).collect();
    keyed.sort_by_key(|&(key, _)| key);
    *functions = keyed.into_iter().map(|(_, f)| f).collect();
}

/// Produce the emission-order list of function symbol names (spec §4.8).
pub fn order_functions(profile: &DecodedProfile, strategy: &LayoutStrategy) -> Vec<String> {
    let mut functions: Vec<&FunctionRecord> = profile.functions.values().collect();

    match strategy {
        LayoutStrategy::ExecCountDesc => functions.sort_by(by_exec_count_desc),
        LayoutStrategy::InSrcOrder => functions.sort_by(by_src_order),
        LayoutStrategy::HotColdJump => {
            let (mut hot, mut cold): (Vec<&FunctionRecord>, Vec<&FunctionRecord>) =
                functions.into_iter().partition(|f| f.count > 0);
            hot.sort_by(by_exec_count_desc);
            cold.sort_by(by_src_order);
            hot.append(&mut cold);
            functions = hot;
        }
        LayoutStrategy::Random { seed, input_files } => random_order(&mut functions, *seed, input_files),
    }

    functions.into_iter().map(|f| f.name.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fdo_profile::DigestRegistry;
    use rustc_hash::FxHashMap;

    fn profile_with(entries: &[(&str, u64, u64)]) -> DecodedProfile {
        let mut functions = FxHashMap::default();
        let mut name2id = FxHashMap::default();
        for (i, &(name, count, start)) in entries.iter().enumerate() {
            let id = i as u32;
            let mut f = FunctionRecord::new(id, name.to_string(), start, start + 0x10);
            f.count = count;
            name2id.insert(name.to_string(), id);
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
    fn exec_count_desc_sorts_by_count_then_id() {
        let profile = profile_with(&[("a", 5, 0x1000), ("b", 10, 0x2000), ("c", 10, 0x3000)]);
        let order = order_functions(&profile, &LayoutStrategy::ExecCountDesc);
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[test]
    fn in_src_order_sorts_by_start_address() {
        let profile = profile_with(&[("a", 0, 0x3000), ("b", 0, 0x1000), ("c", 0, 0x2000)]);
        let order = order_functions(&profile, &LayoutStrategy::InSrcOrder);
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[test]
    fn hot_cold_jump_groups_hot_before_cold() {
        let profile = profile_with(&[("cold_first", 0, 0x1000), ("hot", 5, 0x5000), ("cold_second", 0, 0x2000)]);
        let order = order_functions(&profile, &LayoutStrategy::HotColdJump);
        assert_eq!(order, vec!["hot", "cold_first", "cold_second"]);
    }

    #[test]
    fn random_order_is_deterministic_given_seed_and_files() {
        let profile = profile_with(&[("a", 1, 0x1000), ("b", 2, 0x2000), ("c", 3, 0x3000)]);
        let strategy = LayoutStrategy::Random {
            seed: 42,
            input_files: vec!["b.o".to_string(), "a.o".to_string()],
        };
        let first = order_functions(&profile, &strategy);
        let second = order_functions(&profile, &strategy);
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn random_order_insensitive_to_input_file_argv_order() {
        let profile = profile_with(&[("a", 1, 0x1000), ("b", 2, 0x2000)]);
        let forward = LayoutStrategy::Random {
            seed: 7,
            input_files: vec!["a.o".to_string(), "b.o".to_string()],
        };
        let reversed = LayoutStrategy::Random {
            seed: 7,
            input_files: vec!["b.o".to_string(), "a.o".to_string()],
        };
        assert_eq!(order_functions(&profile, &forward), order_functions(&profile, &reversed));
    }
}
