//! Raw sample parsing (spec §4.1) and aggregation (spec §4.2).

mod aggregate;
mod io;
mod parse;
mod sample;

pub use aggregate::{AggregateDiagnostics, AggregatedRawProfile, Aggregator, CounterPolicy};
pub use io::{read_aggregated, write_aggregated, AggregatedIo};
pub use parse::{PidFilter, RawSampleReader};
pub use sample::{BranchRecord, Mispredict, Sample};

use thiserror::Error;

pub type Address = fdo_elf::Address;

/// Errors produced while parsing the raw sample stream or aggregating it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RawError {
    #[error("line {line}: malformed sample record: {detail}")]
    BadSampleFormat { line: u64, detail: String },
    #[error("counter overflow for key {key} under Abort policy")]
    CounterOverflow { key: String },
}

pub type Result<T> = std::result::Result<T, RawError>;
