//! Persisting the aggregated counter tables themselves, so a caller can
//! split sampling from decoding across two invocations (spec §9 Open
//! Question: "`--read-aggregated` + `--write-aggregated`").

use std::io::{Read, Write};

use crate::{AggregatedRawProfile, RawError, Result};

const BINARY_MAGIC: &[u8; 4] = b"FDOA";
const FORMAT_VERSION: u8 = 1;

/// Which side of the aggregated-profile I/O a caller wants, or neither.
/// Modeled as one enum rather than two independent booleans so that
/// "read and write at once" is unrepresentable (spec.md §9).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AggregatedIo {
    #[default]
    None,
    Read(std::path::PathBuf),
    Write(std::path::PathBuf),
}

/// Write the binary form: 4-byte magic, 1-byte format version, an 8-byte
/// little-endian length prefix, then a `bincode`-encoded payload — the same
/// shape `fdo_profile`'s decoded-profile store uses, with its own magic.
pub fn write_aggregated<W: Write>(profile: &AggregatedRawProfile, mut w: W) -> Result<()> {
    let payload = bincode::serde::encode_to_vec(profile, bincode::config::standard())
        .map_err(|e| RawError::BadSampleFormat {
            line: 0,
            detail: format!("failed to encode aggregated profile: {e}"),
        })?;
    w.write_all(BINARY_MAGIC)
        .and_then(|()| w.write_all(&[FORMAT_VERSION]))
        .and_then(|()| w.write_all(&(payload.len() as u64).to_le_bytes()))
        .and_then(|()| w.write_all(&payload))
        .map_err(|e| RawError::BadSampleFormat {
            line: 0,
            detail: format!("i/o error writing aggregated profile: {e}"),
        })
}

pub fn read_aggregated<R: Read>(mut r: R) -> Result<AggregatedRawProfile> {
    let io_err = |e: std::io::Error| RawError::BadSampleFormat {
        line: 0,
        detail: format!("i/o error reading aggregated profile: {e}"),
    };

    let mut magic = [0u8; 4];
    r.read_exact(&mut magic).map_err(io_err)?;
    if &magic != BINARY_MAGIC {
        return Err(RawError::BadSampleFormat {
            line: 0,
            detail: "bad magic in aggregated profile file".to_string(),
        });
    }
    let mut version = [0u8; 1];
    r.read_exact(&mut version).map_err(io_err)?;
    if version[0] != FORMAT_VERSION {
        return Err(RawError::BadSampleFormat {
            line: 0,
            detail: format!("unsupported aggregated profile version {}", version[0]),
        });
    }
    let mut len_bytes = [0u8; 8];
    r.read_exact(&mut len_bytes).map_err(io_err)?;
    let len = u64::from_le_bytes(len_bytes) as usize;
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload).map_err(io_err)?;

    let (profile, _) = bincode::serde::decode_from_slice(&payload, bincode::config::standard()).map_err(|e| {
        RawError::BadSampleFormat {
            line: 0,
            detail: format!("failed to decode aggregated profile: {e}"),
        }
    })?;
    Ok(profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_aggregated_profile() {
        let mut profile = AggregatedRawProfile::default();
        profile.instructions.insert(0x1000, 4);
        profile.branches.insert((0x1000, 0x1008), 2);
        profile.buildid = Some("abc123".to_string());

        let mut buf = Vec::new();
        write_aggregated(&profile, &mut buf).unwrap();
        let read_back = read_aggregated(buf.as_slice()).unwrap();

        assert_eq!(read_back.instructions, profile.instructions);
        assert_eq!(read_back.branches, profile.branches);
        assert_eq!(read_back.buildid, profile.buildid);
    }

    #[test]
    fn rejects_bad_magic() {
        let buf = b"XXXX\x01\x00\x00\x00\x00\x00\x00\x00\x00".to_vec();
        assert!(read_aggregated(buf.as_slice()).is_err());
    }
}
