//! Pipeline wiring: `read_and_aggregate` → `decode` → `attribute` → `emit`
//! (spec.md §2's data-flow diagram), strung together over the library
//! crates below. Mirrors the shape of the teacher's `rvr::Pipeline`
//! (`crates/rvr/src/pipeline.rs`) without any of its RISC-V-specific
//! lifting.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use rustc_hash::FxHashMap;

use fdo_elf::ElfFacade;
use fdo_ir::CfgWithLayout;
use fdo_profile::{attribute, decode, AttributedFunction, DecodeConfig, DecodedProfile, Diagnostics};
use fdo_raw::{AggregateDiagnostics, AggregatedRawProfile, Aggregator, CounterPolicy, PidFilter, RawSampleReader};

use crate::error::Result;

/// Read the raw sample stream at `path` and fold it into an
/// [`AggregatedRawProfile`] (spec §4.1, §4.2). Bad lines are counted, not
/// fatal, per spec §7's recovery policy.
pub fn read_and_aggregate(
    path: &Path,
    pid_filter: PidFilter,
    policy: CounterPolicy,
    buildid: Option<String>,
) -> Result<(AggregatedRawProfile, AggregateDiagnostics)> {
    let file = File::open(path)?;
    let reader = RawSampleReader::new(BufReader::new(file), pid_filter);

    let mut aggregator = Aggregator::new(policy);
    aggregator.set_buildid(buildid);

    for item in reader {
        match item {
            Ok(sample) => aggregator.ingest(&sample)?,
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed sample line");
                aggregator.record_bad_line();
            }
        }
        metrics::counter!("fdo_samples_ingested_total").increment(1);
    }

    Ok(aggregator.finish())
}

/// Resolve `agg`'s addresses through the ELF/debug-line façade and partition
/// its counters onto per-function records (spec §4.3, §4.4).
pub fn decode_profile(
    agg: &AggregatedRawProfile,
    elf_path: &Path,
    addr2line_cmd: &str,
    config: &DecodeConfig,
) -> Result<(DecodedProfile, Diagnostics)> {
    let mut elf = ElfFacade::open(elf_path, addr2line_cmd)?;
    let (profile, diagnostics) = decode(agg, &mut elf, config)?;
    metrics::gauge!("fdo_functions_decoded").set(profile.functions.len() as f64);
    Ok((profile, diagnostics))
}

/// Load the per-function linear-IR/CFG artifact (spec §6 Input 3).
pub fn load_cfgs(path: &Path) -> Result<FxHashMap<String, CfgWithLayout>> {
    Ok(fdo_ir::load_artifact(path)?)
}

/// Attribute every function in `profile` that has a matching CFG (spec
/// §4.5). Functions the precondition excludes ("no attribution") are
/// silently skipped, matching the component's own contract.
pub fn attribute_all(
    profile: &mut DecodedProfile,
    cfgs: &FxHashMap<String, CfgWithLayout>,
) -> (Vec<AttributedFunction>, Diagnostics) {
    let mut diagnostics = Diagnostics::default();
    let names: Vec<String> = profile.name2id.keys().cloned().collect();
    let mut attributed = Vec::new();
    for name in names {
        let Some(cfg) = cfgs.get(&name) else { continue };
        if let Some(result) = attribute(profile, &name, cfg, &mut diagnostics) {
            attributed.push(result);
        }
    }
    metrics::gauge!("fdo_functions_attributed").set(attributed.len() as f64);
    (attributed, diagnostics)
}

/// Read an entire file into a `String`, used by the CLI's textual-profile
/// commands.
pub fn read_to_string(path: &Path) -> Result<String> {
    let mut s = String::new();
    File::open(path)?.read_to_string(&mut s)?;
    Ok(s)
}
