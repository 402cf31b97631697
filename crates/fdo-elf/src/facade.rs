//! Read-only ELF query facade: the `resolve_all` / `function_containing`
//! primitive assumed by spec §4.3, wrapping symbol-table and debug-line
//! lookup behind one type owned by a single reader (spec §5).

use std::fs;
use std::path::Path;

use crate::file::{ElfFile, FunctionSymbol};
use crate::interval::{Address, Interval, IntervalMap};
use crate::{DebugInfo, ElfError, Result, SourceLoc};

pub struct ElfFacade {
    elf_path: String,
    addr2line_cmd: String,
    functions: IntervalMap<FunctionSymbol>,
    buildid: Option<String>,
    debug: DebugInfo,
}

impl ElfFacade {
    /// Parse `elf_path` and index its function symbols. Debug-line info is
    /// not loaded yet; call [`resolve_all`](Self::resolve_all) once the
    /// full address set is known.
    pub fn open(elf_path: impl AsRef<Path>, addr2line_cmd: impl Into<String>) -> Result<Self> {
        let path = elf_path.as_ref();
        let data = fs::read(path).map_err(|e| ElfError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        let elf = ElfFile::parse(&data)?;

        let entries: Vec<Interval<FunctionSymbol>> = elf
            .functions
            .into_iter()
            .map(|f| Interval {
                l: f.start,
                r: f.finish,
                v: f,
            })
            .collect();
        let functions = IntervalMap::build(entries, |a, b| ElfError::OverlappingIntervals {
            first: a.name.clone(),
            second: b.name.clone(),
        })?;

        Ok(Self {
            elf_path: path.display().to_string(),
            addr2line_cmd: addr2line_cmd.into(),
            functions,
            buildid: elf.buildid,
            debug: DebugInfo::new(),
        })
    }

    /// Populate debug-line info for exactly `addresses`, in one batched call
    /// (spec §4.3 step 2).
    pub fn resolve_all(&mut self, addresses: &[Address]) -> Result<()> {
        self.debug = DebugInfo::load(&self.elf_path, addresses, &self.addr2line_cmd)?;
        Ok(())
    }

    /// The unique function symbol interval enclosing `addr`, if any.
    pub fn function_containing(&self, addr: Address) -> Option<&Interval<FunctionSymbol>> {
        self.functions.find(addr)
    }

    pub fn debug_line(&self, addr: Address) -> Option<&SourceLoc> {
        self.debug.get(addr)
    }

    pub fn buildid(&self) -> Option<&str> {
        self.buildid.as_deref()
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }
}
