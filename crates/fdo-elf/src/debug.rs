//! Debug-line resolution via `llvm-addr2line`.
//!
//! Resolves instruction addresses to `<file:line:function>` triples. The
//! decoder (spec §4.3) uses the file name to decide whether a location
//! belongs to the compiler-emitted linear IR (extension + owning-unit match)
//! or to ordinary source debug info.

use std::collections::HashMap;
use std::io::Write;
use std::process::Command;

use tempfile::NamedTempFile;

use crate::{Address, ElfError, Result};

/// A resolved debug-line record for one address.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceLoc {
    pub file: String,
    pub line: u32,
    pub function: String,
}

impl SourceLoc {
    pub fn new(file: &str, line: u32, function: &str) -> Self {
        Self {
            file: file.to_string(),
            line,
            function: function.to_string(),
        }
    }

    /// `addr2line` reports `??:0` for unresolved addresses; treat that as
    /// "no debug info", matching `dbg = none` in the Location record (§3).
    pub fn is_valid(&self) -> bool {
        self.file != "??" && !self.file.is_empty() && self.line != 0
    }
}

/// Address -> debug-line table, populated in one batched `addr2line` call.
#[derive(Debug, Default)]
pub struct DebugInfo {
    locations: HashMap<Address, SourceLoc>,
}

impl DebugInfo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a batch of addresses against `elf_path` via `addr2line_cmd`.
    ///
    /// Writes the addresses to a temp file and invokes the tool once,
    /// matching spec §4.3 step 2 ("Call `resolve_all` once").
    pub fn load(elf_path: &str, addresses: &[Address], addr2line_cmd: &str) -> Result<Self> {
        if addresses.is_empty() {
            return Ok(Self::new());
        }

        let mut tmp = NamedTempFile::new().map_err(|e| ElfError::Addr2Line {
            cmd: addr2line_cmd.to_string(),
            source: e,
        })?;
        for addr in addresses {
            writeln!(tmp, "0x{addr:x}").map_err(|e| ElfError::Addr2Line {
                cmd: addr2line_cmd.to_string(),
                source: e,
            })?;
        }
        tmp.flush().map_err(|e| ElfError::Addr2Line {
            cmd: addr2line_cmd.to_string(),
            source: e,
        })?;

        let cmd = format!(
            "{} -e {} -f -C < {}",
            addr2line_cmd,
            elf_path,
            tmp.path().display()
        );
        let output = Command::new("sh")
            .args(["-c", &cmd])
            .output()
            .map_err(|e| ElfError::Addr2Line {
                cmd: addr2line_cmd.to_string(),
                source: e,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::warn!(cmd = %addr2line_cmd, stderr = %stderr, "addr2line exited non-zero");
            return Ok(Self::new());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut info = Self::new();
        let lines: Vec<&str> = stdout.lines().collect();
        let mut line_idx = 0;
        let mut addr_idx = 0;
        while line_idx + 1 < lines.len() && addr_idx < addresses.len() {
            let func_line = lines[line_idx].trim();
            let loc_line = lines[line_idx + 1].trim();
            let loc = parse_location(func_line, loc_line);
            if loc.is_valid() {
                info.locations.insert(addresses[addr_idx], loc);
            }
            line_idx += 2;
            addr_idx += 1;
        }
        Ok(info)
    }

    pub fn get(&self, address: Address) -> Option<&SourceLoc> {
        self.locations.get(&address)
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

fn parse_location(func_line: &str, loc_line: &str) -> SourceLoc {
    let function = if func_line == "??" {
        String::new()
    } else {
        func_line.to_string()
    };

    let (file, line) = loc_line.rfind(':').map_or_else(
        || (String::from("??"), 0),
        |colon_idx| {
            let file = &loc_line[..colon_idx];
            let line_part = &loc_line[colon_idx + 1..];
            let line_str = line_part.split_whitespace().next().unwrap_or("0");
            let line = line_str.parse::<u32>().unwrap_or(0);
            (file.to_string(), line)
        },
    );

    SourceLoc::new(&file, line, &function)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_valid_location() {
        let loc = parse_location("main", "/path/to/file.ll:42");
        assert!(loc.is_valid());
        assert_eq!(loc.file, "/path/to/file.ll");
        assert_eq!(loc.line, 42);
        assert_eq!(loc.function, "main");
    }

    #[test]
    fn strips_discriminator_suffix() {
        let loc = parse_location("foo", "/path/file.ll:10 (discriminator 1)");
        assert!(loc.is_valid());
        assert_eq!(loc.line, 10);
    }

    #[test]
    fn unresolved_is_invalid() {
        let loc = parse_location("??", "??:0");
        assert!(!loc.is_valid());
    }
}
