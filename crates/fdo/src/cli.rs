//! CLI definitions (spec.md §1: "out of scope... treated as external
//! collaborators" — this module is exactly that collaborator, a thin
//! `clap` layer over the library crates, modeled on the teacher's
//! `rvr/src/cli.rs`).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_USER_ERROR: i32 = 1;
pub const EXIT_INTERNAL_ERROR: i32 = 2;

#[derive(Parser)]
#[command(name = "fdo")]
#[command(about = "FDO profile decoder and hot-function layout toolkit")]
#[command(version)]
pub struct Cli {
    /// Print a metrics summary after execution.
    #[arg(long, global = true)]
    pub metrics: bool,

    /// Verbose output (sets the `fdo=debug` trace filter).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-error output.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub silent: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum DigestPolicyArg {
    Fail,
    Skip,
    UseAnyway,
}

impl From<DigestPolicyArg> for fdo_profile::DigestPolicy {
    fn from(v: DigestPolicyArg) -> Self {
        match v {
            DigestPolicyArg::Fail => fdo_profile::DigestPolicy::Fail,
            DigestPolicyArg::Skip => fdo_profile::DigestPolicy::Skip,
            DigestPolicyArg::UseAnyway => fdo_profile::DigestPolicy::UseAnyway,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum CounterPolicyArg {
    Saturate,
    Abort,
}

impl From<CounterPolicyArg> for fdo_raw::CounterPolicy {
    fn from(v: CounterPolicyArg) -> Self {
        match v {
            CounterPolicyArg::Saturate => fdo_raw::CounterPolicy::Saturate,
            CounterPolicyArg::Abort => fdo_raw::CounterPolicy::Abort,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum ProfileFormatArg {
    Text,
    Binary,
}

#[derive(Clone, Copy, Debug, ValueEnum, PartialEq, Eq)]
pub enum StrategyArg {
    ExecCountDesc,
    Random,
    InSrcOrder,
    HotColdJump,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Aggregate a raw LBR sample stream, resolve it against an ELF binary's
    /// symbols and debug info, and write a decoded profile (spec §4.1-§4.4).
    Decode {
        /// Raw sample stream, as emitted by `<sampler> script -F pid,ip,brstack`.
        #[arg(value_name = "SAMPLES")]
        samples: PathBuf,

        /// ELF binary the samples were collected against.
        #[arg(long)]
        elf: PathBuf,

        /// `addr2line`-compatible command used for debug-line resolution.
        #[arg(long, default_value = "llvm-addr2line")]
        addr2line: String,

        /// Accept only these PIDs (comma-separated); default accepts any.
        #[arg(long, value_delimiter = ',')]
        pid: Vec<u32>,

        /// 64-bit counter overflow policy (spec §3, §7).
        #[arg(long, value_enum, default_value = "saturate")]
        on_overflow: CounterPolicyArg,

        /// Coalesce locally-duplicated function names with differing bounds
        /// instead of failing with `FunctionBoundaryDrift` (spec §6).
        #[arg(long)]
        ignore_local_dup: bool,

        /// Linear-IR source extension recognized during decoding (spec §4.3).
        #[arg(long, default_value = ".ll")]
        linear_ir_extension: String,

        /// Skip aggregation and decode straight from a previously-written
        /// aggregated profile.
        #[arg(long, conflicts_with_all = ["write_aggregated", "pid"])]
        read_aggregated: Option<PathBuf>,

        /// Write the aggregated (pre-decode) profile to this path instead of
        /// decoding it.
        #[arg(long, conflicts_with = "read_aggregated")]
        write_aggregated: Option<PathBuf>,

        /// Output decoded-profile path.
        #[arg(short, long)]
        output: PathBuf,

        /// Output encoding.
        #[arg(long, value_enum, default_value = "text")]
        format: ProfileFormatArg,
    },

    /// Attribute a decoded profile's per-function counters onto CFG blocks
    /// and edges, given the compiler's linear-IR artifact (spec §4.5).
    Attribute {
        /// Decoded profile produced by `decode`.
        #[arg(value_name = "PROFILE")]
        profile: PathBuf,

        /// Input encoding.
        #[arg(long, value_enum, default_value = "text")]
        format: ProfileFormatArg,

        /// Linear-IR/CFG artifact (spec §6 Input 3), one JSON array of
        /// per-function CFGs.
        #[arg(long)]
        ir: PathBuf,
    },

    /// Narrow a decoded profile's surviving function set (spec §4.9).
    Trim {
        #[arg(value_name = "PROFILE")]
        profile: PathBuf,

        #[arg(long, value_enum, default_value = "text")]
        format: ProfileFormatArg,

        /// Ordered trim predicates, e.g. `min-samples:100`, `top:10`,
        /// `top-percent:5`, `top-percent-samples:90`. Applied left to right.
        #[arg(long = "keep", value_name = "PREDICATE")]
        predicates: Vec<String>,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Fold two or more decoded profiles into one (spec §4.10).
    Merge {
        /// Decoded profiles to merge, applied left to right onto the first.
        #[arg(value_name = "PROFILE", required = true, num_args = 2..)]
        profiles: Vec<PathBuf>,

        #[arg(long, value_enum, default_value = "text")]
        format: ProfileFormatArg,

        #[arg(long, value_enum, default_value = "saturate")]
        on_overflow: CounterPolicyArg,

        /// Merge even if build-ids disagree (spec §4.10, §7 `BuildidMismatch`).
        #[arg(long)]
        ignore_buildid: bool,

        #[arg(long, value_enum, default_value = "fail")]
        on_digest_conflict: DigestPolicyArg,

        #[arg(short, long)]
        output: PathBuf,
    },

    /// Emit the hot-functions layout fragment for the linker script (spec
    /// §4.8, §6 Output 2).
    EmitHot {
        #[arg(value_name = "PROFILE")]
        profile: PathBuf,

        #[arg(long, value_enum, default_value = "text")]
        format: ProfileFormatArg,

        #[arg(long, value_enum, default_value = "exec-count-desc")]
        strategy: StrategyArg,

        /// PRNG seed, required when `--strategy random`.
        #[arg(long)]
        seed: Option<u64>,

        /// Input object file names hashed into the `random` seed so the
        /// draw is insensitive to argv order (spec §4.8).
        #[arg(long = "input-file")]
        input_files: Vec<String>,

        /// Splice the fragment into this linker-script template at its
        /// `INCLUDE linker-script-hot` sentinel, instead of writing a bare
        /// one-symbol-per-line fragment.
        #[arg(long)]
        linker_script_template: Option<PathBuf>,

        #[arg(short, long)]
        output: PathBuf,
    },
}
