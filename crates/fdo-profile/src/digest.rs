//! Content-addressable integrity: MD5 digests of compilation units and
//! individual IR functions (spec §4.6).

use std::collections::hash_map::Entry;

use md5::{Digest as _, Md5};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::{ProfileError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DigestKind {
    Function,
    Unit,
}

/// Resolution policy for a missing or mismatched digest (spec §7).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DigestPolicy {
    Fail,
    Skip,
    UseAnyway,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckOutcome {
    Ok,
    Missing,
    Mismatch,
}

/// Which digest kinds a consumer requires, and how it resolves missing or
/// mismatched entries (spec §4.6). Construction fails if neither kind is
/// required.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DigestConfig {
    pub require_function: bool,
    pub require_unit: bool,
    pub ignore_dbg: bool,
    pub on_missing: DigestPolicy,
    pub on_mismatch: DigestPolicy,
}

impl DigestConfig {
    pub fn new(
        require_function: bool,
        require_unit: bool,
        ignore_dbg: bool,
        on_missing: DigestPolicy,
        on_mismatch: DigestPolicy,
    ) -> Result<Self> {
        if !require_function && !require_unit {
            return Err(ProfileError::EmptyDigestConfig);
        }
        Ok(Self {
            require_function,
            require_unit,
            ignore_dbg,
            on_missing,
            on_mismatch,
        })
    }
}

/// `name` (unit-or-function) → 16-byte MD5 digest, keyed also by
/// [`DigestKind`] since a unit and a function inside it may share a name
/// (spec §3's `crcs` field).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DigestRegistry {
    entries: FxHashMap<(String, DigestKind), [u8; 16]>,
}

impl DigestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert `digest` under `(name, kind)`. A duplicate with an equal digest
    /// is a no-op; a duplicate with a differing digest is resolved by
    /// `policy` (spec §4.6).
    pub fn add(&mut self, name: &str, kind: DigestKind, digest: [u8; 16], policy: DigestPolicy) -> Result<()> {
        match self.entries.entry((name.to_string(), kind)) {
            Entry::Vacant(slot) => {
                slot.insert(digest);
                Ok(())
            }
            Entry::Occupied(mut slot) => {
                if *slot.get() == digest {
                    return Ok(());
                }
                match policy {
                    DigestPolicy::Fail => Err(ProfileError::DigestMismatch { name: name.to_string() }),
                    DigestPolicy::Skip => Ok(()),
                    DigestPolicy::UseAnyway => {
                        slot.insert(digest);
                        tracing::warn!(name, ?kind, "digest mismatch, proceeding under UseAnyway");
                        Ok(())
                    }
                }
            }
        }
    }

    pub fn check(&self, name: &str, kind: DigestKind, expected: &[u8; 16]) -> CheckOutcome {
        match self.entries.get(&(name.to_string(), kind)) {
            None => CheckOutcome::Missing,
            Some(actual) if actual == expected => CheckOutcome::Ok,
            Some(_) => CheckOutcome::Mismatch,
        }
    }

    /// `check` plus the policy application a caller would otherwise repeat
    /// at every call site: `Ok(true)` means "proceed", `Ok(false)` means
    /// "drop the entry under Skip".
    pub fn apply_policy(&self, name: &str, kind: DigestKind, expected: &[u8; 16], config: &DigestConfig) -> Result<bool> {
        match self.check(name, kind, expected) {
            CheckOutcome::Ok => Ok(true),
            CheckOutcome::Missing => match config.on_missing {
                DigestPolicy::Fail => Err(ProfileError::DigestMissing { name: name.to_string() }),
                DigestPolicy::Skip => Ok(false),
                DigestPolicy::UseAnyway => Ok(true),
            },
            CheckOutcome::Mismatch => match config.on_mismatch {
                DigestPolicy::Fail => Err(ProfileError::DigestMismatch { name: name.to_string() }),
                DigestPolicy::Skip => Ok(false),
                DigestPolicy::UseAnyway => Ok(true),
            },
        }
    }

    /// Iterate every `((name, kind), digest)` entry, for the profile store.
    pub fn iter(&self) -> impl Iterator<Item = (&(String, DigestKind), &[u8; 16])> {
        self.entries.iter()
    }

    /// Insert without any conflict policy, for the profile store reading
    /// back its own previously-written output (conflicts cannot arise there).
    pub fn insert_raw(&mut self, name: String, kind: DigestKind, digest: [u8; 16]) {
        self.entries.insert((name, kind), digest);
    }

    /// Remove entries whose name is not in `keep` (spec §4.6, used by trim).
    pub fn trim(&mut self, keep: &FxHashSet<String>) {
        self.entries.retain(|(name, _), _| keep.contains(name));
    }

    /// Union with `other`, resolving conflicting digests under `policy`
    /// (spec §4.10).
    pub fn merge(&mut self, other: &DigestRegistry, policy: DigestPolicy) -> Result<()> {
        for (key, digest) in &other.entries {
            match self.entries.get(key) {
                None => {
                    self.entries.insert(key.clone(), *digest);
                }
                Some(existing) if existing == digest => {}
                Some(_) => match policy {
                    DigestPolicy::Fail => return Err(ProfileError::DigestMismatch { name: key.0.clone() }),
                    DigestPolicy::Skip => {}
                    DigestPolicy::UseAnyway => {
                        self.entries.insert(key.clone(), *digest);
                    }
                },
            }
        }
        Ok(())
    }
}

pub fn digest_bytes(data: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut out = [0u8; 16];
    out.copy_from_slice(&result);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_requires_at_least_one_kind() {
        assert!(DigestConfig::new(false, false, false, DigestPolicy::Fail, DigestPolicy::Fail).is_err());
        assert!(DigestConfig::new(true, false, false, DigestPolicy::Fail, DigestPolicy::Fail).is_ok());
    }

    #[test]
    fn add_is_idempotent_for_equal_digest() {
        let mut reg = DigestRegistry::new();
        let d = digest_bytes(b"hello");
        reg.add("unit.ll", DigestKind::Unit, d, DigestPolicy::Fail).unwrap();
        reg.add("unit.ll", DigestKind::Unit, d, DigestPolicy::Fail).unwrap();
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn add_fails_on_mismatch_under_fail_policy() {
        let mut reg = DigestRegistry::new();
        reg.add("unit.ll", DigestKind::Unit, digest_bytes(b"a"), DigestPolicy::Fail)
            .unwrap();
        let err = reg.add("unit.ll", DigestKind::Unit, digest_bytes(b"b"), DigestPolicy::Fail);
        assert!(matches!(err, Err(ProfileError::DigestMismatch { .. })));
    }

    #[test]
    fn check_reports_missing_and_mismatch() {
        let mut reg = DigestRegistry::new();
        let d = digest_bytes(b"a");
        assert_eq!(reg.check("f", DigestKind::Function, &d), CheckOutcome::Missing);
        reg.add("f", DigestKind::Function, d, DigestPolicy::Fail).unwrap();
        assert_eq!(reg.check("f", DigestKind::Function, &d), CheckOutcome::Ok);
        assert_eq!(
            reg.check("f", DigestKind::Function, &digest_bytes(b"b")),
            CheckOutcome::Mismatch
        );
    }

    #[test]
    fn trim_drops_entries_outside_keep_set() {
        let mut reg = DigestRegistry::new();
        reg.add("f", DigestKind::Function, digest_bytes(b"a"), DigestPolicy::Fail)
            .unwrap();
        reg.add("g", DigestKind::Function, digest_bytes(b"b"), DigestPolicy::Fail)
            .unwrap();
        let keep: FxHashSet<String> = ["f".to_string()].into_iter().collect();
        reg.trim(&keep);
        assert_eq!(reg.len(), 1);
    }
}
