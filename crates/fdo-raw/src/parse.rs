//! Raw-sample textual parser (spec §4.1).
//!
//! Input is the newline-delimited output of an external sampler:
//! `<pid> <ip> [<from/to/M|P|-/X|-/A|-/cycles>]*` per line.

use std::collections::HashSet;
use std::io::BufRead;

use crate::sample::{BranchRecord, Mispredict};
use crate::{Address, RawError, Result, Sample};

/// Which PIDs to accept from the stream.
#[derive(Clone, Debug, Default)]
pub enum PidFilter {
    #[default]
    Any,
    Allow(HashSet<u32>),
}

impl PidFilter {
    pub fn accepts(&self, pid: u32) -> bool {
        match self {
            PidFilter::Any => true,
            PidFilter::Allow(set) => set.contains(&pid),
        }
    }
}

fn parse_address(token: &str, line: u64) -> Result<Address> {
    let hex = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X"));
    let hex = hex.unwrap_or(token);
    Address::from_str_radix(hex, 16).map_err(|_| RawError::BadSampleFormat {
        line,
        detail: format!("invalid address token `{token}`"),
    })
}

fn parse_mispredict(token: &str, line: u64) -> Result<Mispredict> {
    match token {
        "M" => Ok(Mispredict::Mispredicted),
        "P" => Ok(Mispredict::Predicted),
        "-" => Ok(Mispredict::Unsupported),
        other => Err(RawError::BadSampleFormat {
            line,
            detail: format!("invalid mispredict flag `{other}`"),
        }),
    }
}

fn parse_flag(token: &str, expected: char, line: u64, field: &str) -> Result<()> {
    if token.len() == 1 && (token.chars().next() == Some(expected) || token == "-") {
        Ok(())
    } else {
        Err(RawError::BadSampleFormat {
            line,
            detail: format!("invalid {field} flag `{token}`"),
        })
    }
}

fn parse_branch_token(token: &str, stack_index: u32, line: u64) -> Result<BranchRecord> {
    let fields: Vec<&str> = token.split('/').collect();
    if fields.len() != 6 {
        return Err(RawError::BadSampleFormat {
            line,
            detail: format!("branch token `{token}` does not have 6 `/`-separated fields"),
        });
    }
    let from = parse_address(fields[0], line)?;
    let to = parse_address(fields[1], line)?;
    let mispredict = parse_mispredict(fields[2], line)?;
    parse_flag(fields[3], 'X', line, "in-tx")?;
    parse_flag(fields[4], 'A', line, "abort")?;
    // Cycles are parsed to validate format but discarded (spec §4.1).
    fields[5].parse::<u64>().map_err(|_| RawError::BadSampleFormat {
        line,
        detail: format!("invalid cycles token `{}`", fields[5]),
    })?;

    Ok(BranchRecord {
        from,
        to,
        mispredict,
        stack_index,
    })
}

fn parse_line(line_text: &str, line: u64) -> Result<Sample> {
    let mut tokens = line_text.split_whitespace();
    let pid_tok = tokens.next().ok_or_else(|| RawError::BadSampleFormat {
        line,
        detail: "empty line".to_string(),
    })?;
    let ip_tok = tokens.next().ok_or_else(|| RawError::BadSampleFormat {
        line,
        detail: "fewer than two tokens".to_string(),
    })?;

    let pid = pid_tok.parse::<u32>().map_err(|_| RawError::BadSampleFormat {
        line,
        detail: format!("invalid pid `{pid_tok}`"),
    })?;
    let ip = parse_address(ip_tok, line)?;

    let mut brstack = Vec::new();
    for (idx, tok) in tokens.enumerate() {
        brstack.push(parse_branch_token(tok, idx as u32, line)?);
    }

    Ok(Sample { pid, ip, brstack })
}

/// A lazy, one-pass iterator over the raw sample stream.
///
/// Bad lines do not terminate the stream: each line yields its own
/// `Result`, so a caller (the aggregator's driver) can skip malformed lines
/// and keep an `ignored` count (spec §7: "the parser ... is robust to
/// individual bad lines").
pub struct RawSampleReader<R> {
    lines: std::io::Lines<R>,
    line_no: u64,
    pid_filter: PidFilter,
}

impl<R: BufRead> RawSampleReader<R> {
    pub fn new(reader: R, pid_filter: PidFilter) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            pid_filter,
        }
    }
}

impl<R: BufRead> Iterator for RawSampleReader<R> {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let raw = self.lines.next()?;
            self.line_no += 1;
            let line_no = self.line_no;
            let text = match raw {
                Ok(t) => t,
                Err(e) => {
                    return Some(Err(RawError::BadSampleFormat {
                        line: line_no,
                        detail: format!("i/o error: {e}"),
                    }));
                }
            };
            if text.trim().is_empty() {
                continue;
            }
            let sample = match parse_line(&text, line_no) {
                Ok(s) => s,
                Err(e) => return Some(Err(e)),
            };
            if !self.pid_filter.accepts(sample.pid) {
                continue;
            }
            return Some(Ok(sample));
        }
    }
}
