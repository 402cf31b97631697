//! The linker-script hot-fragment writer (spec §6 Output 2).

use std::io::Write;

use thiserror::Error;

/// The line an external linker-script template carries as a splice point.
pub const HOT_FRAGMENT_SENTINEL: &str = "INCLUDE linker-script-hot";

#[derive(Error, Debug)]
pub enum LinkerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("linker script template has no `{HOT_FRAGMENT_SENTINEL}` line")]
    MissingSentinel,
}

/// Write `names`, one symbol per line, in the order given (spec §6 Output 2:
/// "one symbol name per line, in emission order").
pub fn write_hot_fragment<W: Write>(names: &[String], mut w: W) -> Result<(), LinkerError> {
    for name in names {
        writeln!(w, "{name}")?;
    }
    Ok(())
}

/// Splice `names` into `template` at its [`HOT_FRAGMENT_SENTINEL`] line,
/// replacing that line with one symbol per line. Errors if the template
/// doesn't carry the sentinel.
pub fn patch_linker_script(template: &str, names: &[String]) -> Result<String, LinkerError> {
    if !template.lines().any(|line| line.trim() == HOT_FRAGMENT_SENTINEL) {
        return Err(LinkerError::MissingSentinel);
    }

    let mut out = String::with_capacity(template.len() + names.iter().map(|n| n.len() + 1).sum::<usize>());
    for line in template.lines() {
        if line.trim() == HOT_FRAGMENT_SENTINEL {
            for name in names {
                out.push_str(name);
                out.push('\n');
            }
        } else {
            out.push_str(line);
            out.push('\n');
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_hot_fragment_is_one_symbol_per_line() {
        let names = vec!["foo".to_string(), "bar".to_string()];
        let mut buf = Vec::new();
        write_hot_fragment(&names, &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "foo\nbar\n");
    }

    #[test]
    fn patch_linker_script_replaces_sentinel_line() {
        let template = "SECTIONS {\n  .text.hot : {\n    INCLUDE linker-script-hot\n  }\n}\n";
        let names = vec!["hot_fn".to_string()];
        let patched = patch_linker_script(template, &names).unwrap();
        assert!(patched.contains("hot_fn"));
        assert!(!patched.contains(HOT_FRAGMENT_SENTINEL));
    }

    #[test]
    fn patch_linker_script_rejects_missing_sentinel() {
        let err = patch_linker_script("SECTIONS {}\n", &[]);
        assert!(matches!(err, Err(LinkerError::MissingSentinel)));
    }
}
