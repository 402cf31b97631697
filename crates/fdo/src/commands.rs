//! Command implementations, one function per subcommand.

use std::fs::File;
use std::io::BufWriter;

use fdo_layout::{order_functions, patch_linker_script, write_hot_fragment, LayoutStrategy};
use fdo_profile::{read_binary, read_textual, trim, write_binary, write_textual, DecodeConfig, DecodedProfile, TrimPredicate};
use fdo_raw::{AggregatedIo, PidFilter};

use crate::cli::{Cli, Commands, ProfileFormatArg, EXIT_INTERNAL_ERROR, EXIT_SUCCESS, EXIT_USER_ERROR};
use fdo::error::{Error, Result};
use fdo::pipeline;

pub fn run_command(cli: &Cli) -> i32 {
    let result = match &cli.command {
        Commands::Decode { .. } => cmd_decode(cli),
        Commands::Attribute { .. } => cmd_attribute(cli),
        Commands::Trim { .. } => cmd_trim(cli),
        Commands::Merge { .. } => cmd_merge(cli),
        Commands::EmitHot { .. } => cmd_emit_hot(cli),
    };

    match result {
        Ok(()) => EXIT_SUCCESS,
        Err(e @ (Error::InvalidArg(_) | Error::ConflictingAggregatedFlags)) => {
            tracing::error!(error = %e, "bad input");
            EXIT_USER_ERROR
        }
        Err(e) => match &e {
            Error::Raw(fdo_raw::RawError::BadSampleFormat { .. })
            | Error::Elf(_)
            | Error::Profile(fdo_profile::ProfileError::DigestMissing { .. } | fdo_profile::ProfileError::DigestMismatch { .. })
            | Error::Io(_) => {
                tracing::error!(error = %e, "user-facing error");
                EXIT_USER_ERROR
            }
            _ => {
                tracing::error!(error = %e, "internal invariant violation");
                EXIT_INTERNAL_ERROR
            }
        },
    }
}

fn read_profile(path: &std::path::Path, format: ProfileFormatArg) -> Result<DecodedProfile> {
    let file = File::open(path)?;
    Ok(match format {
        ProfileFormatArg::Text => read_textual(file)?,
        ProfileFormatArg::Binary => read_binary(file)?,
    })
}

fn write_profile(profile: &DecodedProfile, path: &std::path::Path, format: ProfileFormatArg) -> Result<()> {
    let file = BufWriter::new(File::create(path)?);
    match format {
        ProfileFormatArg::Text => write_textual(profile, file)?,
        ProfileFormatArg::Binary => write_binary(profile, file)?,
    }
    Ok(())
}

fn parse_trim_predicate(spec: &str) -> Result<TrimPredicate> {
    let (key, value) = spec
        .split_once(':')
        .ok_or_else(|| Error::InvalidArg(format!("trim predicate `{spec}` must be `name:value`")))?;
    let bad_value = || Error::InvalidArg(format!("trim predicate `{spec}` has a non-numeric value"));
    match key {
        "top" => Ok(TrimPredicate::Top(value.parse().map_err(|_| bad_value())?)),
        "top-percent" => Ok(TrimPredicate::TopPercent(value.parse().map_err(|_| bad_value())?)),
        "top-percent-samples" => Ok(TrimPredicate::TopPercentSamples(value.parse().map_err(|_| bad_value())?)),
        "min-samples" => Ok(TrimPredicate::MinSamples(value.parse().map_err(|_| bad_value())?)),
        other => Err(Error::InvalidArg(format!("unknown trim predicate `{other}`"))),
    }
}

fn cmd_decode(cli: &Cli) -> Result<()> {
    let Commands::Decode {
        samples,
        elf,
        addr2line,
        pid,
        on_overflow,
        ignore_local_dup,
        linear_ir_extension,
        read_aggregated,
        write_aggregated,
        output,
        format,
    } = &cli.command
    else {
        unreachable!()
    };

    // Collapse the two CLI flags into the type that actually forbids their
    // conjunction (spec.md §9 Open Question #1): from here on, only
    // `AggregatedIo` is consulted, never the raw `Option`s.
    let aggregated_io = match (read_aggregated, write_aggregated) {
        (Some(_), Some(_)) => return Err(Error::ConflictingAggregatedFlags),
        (Some(path), None) => AggregatedIo::Read(path.clone()),
        (None, Some(path)) => AggregatedIo::Write(path.clone()),
        (None, None) => AggregatedIo::None,
    };

    let pid_filter = if pid.is_empty() {
        PidFilter::Any
    } else {
        PidFilter::Allow(pid.iter().copied().collect())
    };

    let agg = match &aggregated_io {
        AggregatedIo::Read(path) => fdo_raw::read_aggregated(File::open(path)?)?,
        AggregatedIo::None | AggregatedIo::Write(_) => {
            let (agg, diag) = pipeline::read_and_aggregate(samples, pid_filter, (*on_overflow).into(), None)?;
            tracing::info!(
                ignored_lines = diag.ignored_lines,
                duplicate_non_tail = diag.duplicate_non_tail,
                "aggregated raw samples"
            );
            agg
        }
    };

    if let AggregatedIo::Write(path) = &aggregated_io {
        fdo_raw::write_aggregated(&agg, BufWriter::new(File::create(path)?))?;
        return Ok(());
    }

    let config = DecodeConfig {
        ignore_local_dup: *ignore_local_dup,
        linear_ir_extension: linear_ir_extension.clone(),
    };
    let (profile, diagnostics) = pipeline::decode_profile(&agg, elf, addr2line, &config)?;
    tracing::info!(
        functions = profile.functions.len(),
        ambiguous_debug_ties = diagnostics.ambiguous_debug_ties,
        "decoded profile"
    );
    write_profile(&profile, output, *format)
}

fn cmd_attribute(cli: &Cli) -> Result<()> {
    let Commands::Attribute { profile, format, ir } = &cli.command else {
        unreachable!()
    };
    let mut decoded = read_profile(profile, *format)?;
    let cfgs = pipeline::load_cfgs(ir)?;
    let (attributed, diagnostics) = pipeline::attribute_all(&mut decoded, &cfgs);
    tracing::info!(
        attributed = attributed.len(),
        synthetic_call_edges = diagnostics.synthetic_call_edges,
        "attributed functions"
    );
    for f in &attributed {
        println!("{}", f.function_name);
    }
    Ok(())
}

fn cmd_trim(cli: &Cli) -> Result<()> {
    let Commands::Trim {
        profile,
        format,
        predicates,
        output,
    } = &cli.command
    else {
        unreachable!()
    };
    let mut decoded = read_profile(profile, *format)?;
    let parsed: Vec<TrimPredicate> = predicates.iter().map(|s| parse_trim_predicate(s)).collect::<Result<_>>()?;
    trim(&mut decoded, &parsed);
    tracing::info!(surviving_functions = decoded.functions.len(), "trimmed profile");
    write_profile(&decoded, output, *format)
}

fn cmd_merge(cli: &Cli) -> Result<()> {
    let Commands::Merge {
        profiles,
        format,
        on_overflow,
        ignore_buildid,
        on_digest_conflict,
        output,
    } = &cli.command
    else {
        unreachable!()
    };
    let mut iter = profiles.iter();
    let first = iter.next().expect("clap requires at least 2 profiles");
    let mut base = read_profile(first, *format)?;
    for path in iter {
        let other = read_profile(path, *format)?;
        fdo_profile::merge(&mut base, &other, (*on_overflow).into(), *ignore_buildid, (*on_digest_conflict).into())?;
    }
    tracing::info!(functions = base.functions.len(), "merged profiles");
    write_profile(&base, output, *format)
}

fn cmd_emit_hot(cli: &Cli) -> Result<()> {
    let Commands::EmitHot {
        profile,
        format,
        strategy,
        seed,
        input_files,
        linker_script_template,
        output,
    } = &cli.command
    else {
        unreachable!()
    };
    let decoded = read_profile(profile, *format)?;

    let strategy = match strategy {
        crate::cli::StrategyArg::ExecCountDesc => LayoutStrategy::ExecCountDesc,
        crate::cli::StrategyArg::InSrcOrder => LayoutStrategy::InSrcOrder,
        crate::cli::StrategyArg::HotColdJump => LayoutStrategy::HotColdJump,
        crate::cli::StrategyArg::Random => LayoutStrategy::Random {
            seed: seed.ok_or_else(|| Error::InvalidArg("`--strategy random` requires `--seed`".to_string()))?,
            input_files: input_files.clone(),
        },
    };

    let names = order_functions(&decoded, &strategy);
    tracing::info!(functions = names.len(), "emitted hot-function layout");

    match linker_script_template {
        Some(template_path) => {
            let template = pipeline::read_to_string(template_path)?;
            let patched = patch_linker_script(&template, &names)?;
            std::fs::write(output, patched)?;
        }
        None => {
            write_hot_fragment(&names, BufWriter::new(File::create(output)?))?;
        }
    }
    Ok(())
}
