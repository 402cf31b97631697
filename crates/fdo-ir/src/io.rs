//! Reading the linear-IR artifact off disk (spec §6 Input 3).
//!
//! The artifact is a JSON document holding one [`CfgWithLayout`] per
//! function the external compiler backend linearized. JSON, not the
//! `bincode` form the decoder's own outputs use, because this file crosses
//! a process boundary into a different codebase entirely — a plain text
//! interchange format is the friendlier contract for whoever emits it.

use std::io::Read;
use std::path::Path;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::CfgWithLayout;

#[derive(Error, Debug)]
pub enum IrError {
    #[error("failed to read linear-IR artifact {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse linear-IR artifact {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("duplicate function_name {name:?} in linear-IR artifact {path}")]
    DuplicateFunction { path: String, name: String },
}

pub type Result<T> = std::result::Result<T, IrError>;

/// Parse a JSON array of [`CfgWithLayout`] values from an already-open reader.
pub fn read_cfgs<R: Read>(r: R) -> std::result::Result<Vec<CfgWithLayout>, serde_json::Error> {
    serde_json::from_reader(r)
}

/// Load the linear-IR artifact at `path`, keyed by `function_name`.
///
/// Returns [`IrError::DuplicateFunction`] if the same function appears
/// twice — attribution (spec §4.5) assumes exactly one CFG per function.
pub fn load_artifact(path: &Path) -> Result<FxHashMap<String, CfgWithLayout>> {
    let file = std::fs::File::open(path).map_err(|source| IrError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let cfgs = read_cfgs(file).map_err(|source| IrError::Malformed {
        path: path.display().to_string(),
        source,
    })?;

    let mut by_name = FxHashMap::default();
    for cfg in cfgs {
        let name = cfg.function_name.clone();
        if by_name.insert(name.clone(), cfg).is_some() {
            return Err(IrError::DuplicateFunction {
                path: path.display().to_string(),
                name,
            });
        }
    }
    Ok(by_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Block, Edge, EdgeKind, Terminator};

    fn sample_cfg(name: &str) -> CfgWithLayout {
        CfgWithLayout {
            function_name: name.to_string(),
            blocks: vec![Block {
                id: 0,
                labels: 0..3,
                terminator: Terminator::Return,
                successors: vec![Edge {
                    target: 0,
                    kind: EdgeKind::Fallthrough,
                }],
                calls: vec![],
            }],
        }
    }

    #[test]
    fn round_trips_through_json() {
        let cfgs = vec![sample_cfg("f"), sample_cfg("g")];
        let json = serde_json::to_vec(&cfgs).unwrap();
        let back = read_cfgs(json.as_slice()).unwrap();
        assert_eq!(back.len(), 2);
        assert_eq!(back[0].function_name, "f");
        assert_eq!(back[1].blocks[0].terminator, Terminator::Return);
    }

    #[test]
    fn load_artifact_rejects_duplicate_function_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.json");
        let cfgs = vec![sample_cfg("f"), sample_cfg("f")];
        std::fs::write(&path, serde_json::to_vec(&cfgs).unwrap()).unwrap();

        let err = load_artifact(&path).unwrap_err();
        assert!(matches!(err, IrError::DuplicateFunction { name, .. } if name == "f"));
    }

    #[test]
    fn load_artifact_indexes_by_function_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("artifact.json");
        let cfgs = vec![sample_cfg("f"), sample_cfg("g")];
        std::fs::write(&path, serde_json::to_vec(&cfgs).unwrap()).unwrap();

        let by_name = load_artifact(&path).unwrap();
        assert_eq!(by_name.len(), 2);
        assert!(by_name.contains_key("f"));
        assert!(by_name.contains_key("g"));
    }
}
