//! The profile store (spec §4.7): textual (sexp-like) and binary
//! serialization of a [`DecodedProfile`].

use std::io::{Read, Write};

use rustc_hash::FxHashMap;

use crate::digest::{DigestKind, DigestRegistry};
use crate::function::{FunctionId, FunctionRecord, PerFunctionAgg};
use crate::location::{DebugLoc, Location, RelLoc};
use crate::sexp::Sexp;
use crate::{Address, DecodedProfile, ProfileError, Result};

const BINARY_MAGIC: &[u8; 4] = b"FDOP";
const FORMAT_VERSION: u8 = 1;

fn addr_atom(a: Address) -> Sexp {
    Sexp::atom(format!("0x{a:x}"))
}

fn parse_addr(s: &str) -> Result<Address> {
    let stripped = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(stripped, 16).map_err(|_| ProfileError::MalformedSexp {
        detail: format!("bad address literal `{s}`"),
    })
}

fn parse_u64(s: &str) -> Result<u64> {
    s.parse().map_err(|_| ProfileError::MalformedSexp {
        detail: format!("expected integer, found `{s}`"),
    })
}

fn parse_u32(s: &str) -> Result<u32> {
    s.parse().map_err(|_| ProfileError::MalformedSexp {
        detail: format!("expected integer, found `{s}`"),
    })
}

fn location_to_sexp(loc: &Location) -> Sexp {
    let rel = loc.rel.as_ref().map_or_else(
        || Sexp::atom("none"),
        |r| {
            Sexp::list(vec![
                Sexp::atom(r.function_id.to_string()),
                Sexp::atom(r.offset.to_string()),
                match r.cfg_label {
                    Some(label) => Sexp::atom(label.to_string()),
                    None => Sexp::atom("none"),
                },
            ])
        },
    );
    let dbg = loc.dbg.as_ref().map_or_else(
        || Sexp::atom("none"),
        |d| Sexp::list(vec![Sexp::atom(d.file.clone()), Sexp::atom(d.line.to_string())]),
    );
    Sexp::list(vec![addr_atom(loc.addr), rel, dbg])
}

fn sexp_to_location(sexp: &Sexp) -> Result<(Address, Location)> {
    let fields = sexp.as_list()?;
    let [addr_s, rel_s, dbg_s] = fields else {
        return Err(ProfileError::MalformedSexp {
            detail: "addr2loc entry must have 3 fields".to_string(),
        });
    };
    let addr = parse_addr(addr_s.as_atom()?)?;

    let rel = match rel_s {
        Sexp::Atom(a) if a == "none" => None,
        Sexp::List(items) => {
            let [fid, offset, label] = items.as_slice() else {
                return Err(ProfileError::MalformedSexp {
                    detail: "rel entry must have 3 fields".to_string(),
                });
            };
            let cfg_label = match label.as_atom()? {
                "none" => None,
                s => Some(parse_u32(s)?),
            };
            Some(RelLoc {
                function_id: fid.as_atom()?.parse().map_err(|_| ProfileError::MalformedSexp {
                    detail: "bad function id".to_string(),
                })?,
                offset: parse_u64(offset.as_atom()?)?,
                cfg_label,
            })
        }
        _ => {
            return Err(ProfileError::MalformedSexp {
                detail: "malformed rel field".to_string(),
            })
        }
    };

    let dbg = match dbg_s {
        Sexp::Atom(a) if a == "none" => None,
        Sexp::List(items) => {
            let [file, line] = items.as_slice() else {
                return Err(ProfileError::MalformedSexp {
                    detail: "dbg entry must have 2 fields".to_string(),
                });
            };
            Some(DebugLoc {
                file: file.as_atom()?.to_string(),
                line: parse_u32(line.as_atom()?)?,
            })
        }
        _ => {
            return Err(ProfileError::MalformedSexp {
                detail: "malformed dbg field".to_string(),
            })
        }
    };

    Ok((addr, Location { addr, rel, dbg }))
}

fn agg_pairs_to_sexp(map: &FxHashMap<Address, u64>) -> Sexp {
    Sexp::list(map.iter().map(|(&a, &c)| Sexp::list(vec![addr_atom(a), Sexp::atom(c.to_string())])).collect())
}

fn agg_edges_to_sexp(map: &FxHashMap<(Address, Address), u64>) -> Sexp {
    Sexp::list(
        map.iter()
            .map(|(&(a, b), &c)| Sexp::list(vec![addr_atom(a), addr_atom(b), Sexp::atom(c.to_string())]))
            .collect(),
    )
}

fn sexp_to_agg_pairs(sexp: &Sexp) -> Result<FxHashMap<Address, u64>> {
    let mut out = FxHashMap::default();
    for entry in sexp.as_list()? {
        let fields = entry.as_list()?;
        let [addr, count] = fields else {
            return Err(ProfileError::MalformedSexp {
                detail: "instruction entry must have 2 fields".to_string(),
            });
        };
        out.insert(parse_addr(addr.as_atom()?)?, parse_u64(count.as_atom()?)?);
    }
    Ok(out)
}

fn sexp_to_agg_edges(sexp: &Sexp) -> Result<FxHashMap<(Address, Address), u64>> {
    let mut out = FxHashMap::default();
    for entry in sexp.as_list()? {
        let fields = entry.as_list()?;
        let [a, b, count] = fields else {
            return Err(ProfileError::MalformedSexp {
                detail: "edge entry must have 3 fields".to_string(),
            });
        };
        out.insert((parse_addr(a.as_atom()?)?, parse_addr(b.as_atom()?)?), parse_u64(count.as_atom()?)?);
    }
    Ok(out)
}

fn agg_to_sexp(agg: &PerFunctionAgg) -> Sexp {
    Sexp::list(vec![
        Sexp::atom("agg"),
        Sexp::list(vec![Sexp::atom("instructions"), agg_pairs_to_sexp(&agg.instructions)]),
        Sexp::list(vec![Sexp::atom("branches"), agg_edges_to_sexp(&agg.branches)]),
        Sexp::list(vec![Sexp::atom("mispredicts"), agg_edges_to_sexp(&agg.mispredicts)]),
        Sexp::list(vec![Sexp::atom("traces"), agg_edges_to_sexp(&agg.traces)]),
    ])
}

fn sexp_to_agg(sexp: &Sexp) -> Result<PerFunctionAgg> {
    let fields = sexp.as_list()?;
    let [_tag, instructions, branches, mispredicts, traces] = fields else {
        return Err(ProfileError::MalformedSexp {
            detail: "agg must have 4 sub-tables".to_string(),
        });
    };
    Ok(PerFunctionAgg {
        instructions: sexp_to_agg_pairs(&instructions.as_list()?[1])?,
        branches: sexp_to_agg_edges(&branches.as_list()?[1])?,
        mispredicts: sexp_to_agg_edges(&mispredicts.as_list()?[1])?,
        traces: sexp_to_agg_edges(&traces.as_list()?[1])?,
    })
}

fn function_to_sexp(f: &FunctionRecord) -> Sexp {
    Sexp::list(vec![
        Sexp::atom(f.id.to_string()),
        Sexp::atom(f.name.clone()),
        addr_atom(f.start),
        addr_atom(f.finish),
        Sexp::atom(if f.has_linearids { "true" } else { "false" }),
        Sexp::atom(f.count.to_string()),
        Sexp::atom(f.malformed_traces.to_string()),
        agg_to_sexp(&f.agg),
    ])
}

fn sexp_to_function(sexp: &Sexp) -> Result<FunctionRecord> {
    let fields = sexp.as_list()?;
    let [id, name, start, finish, has_linearids, count, malformed_traces, agg] = fields else {
        return Err(ProfileError::MalformedSexp {
            detail: "function record must have 8 fields".to_string(),
        });
    };
    Ok(FunctionRecord {
        id: id.as_atom()?.parse().map_err(|_| ProfileError::MalformedSexp {
            detail: "bad function id".to_string(),
        })?,
        name: name.as_atom()?.to_string(),
        start: parse_addr(start.as_atom()?)?,
        finish: parse_addr(finish.as_atom()?)?,
        has_linearids: has_linearids.as_atom()? == "true",
        count: parse_u64(count.as_atom()?)?,
        malformed_traces: parse_u64(malformed_traces.as_atom()?)?,
        agg: sexp_to_agg(agg)?,
    })
}

fn crcs_to_sexp(registry: &DigestRegistry) -> Sexp {
    Sexp::list(
        registry
            .iter()
            .map(|((name, kind), digest)| {
                Sexp::list(vec![
                    Sexp::atom(name.clone()),
                    Sexp::atom(match kind {
                        DigestKind::Function => "function",
                        DigestKind::Unit => "unit",
                    }),
                    Sexp::atom(digest.iter().map(|b| format!("{b:02x}")).collect::<String>()),
                ])
            })
            .collect(),
    )
}

fn sexp_to_crcs(sexp: &Sexp) -> Result<DigestRegistry> {
    let mut registry = DigestRegistry::new();
    for entry in sexp.as_list()? {
        let fields = entry.as_list()?;
        let [name, kind, digest] = fields else {
            return Err(ProfileError::MalformedSexp {
                detail: "crc entry must have 3 fields".to_string(),
            });
        };
        let kind = match kind.as_atom()? {
            "function" => DigestKind::Function,
            "unit" => DigestKind::Unit,
            other => {
                return Err(ProfileError::MalformedSexp {
                    detail: format!("unknown digest kind `{other}`"),
                })
            }
        };
        let hex = digest.as_atom()?;
        if hex.len() != 32 {
            return Err(ProfileError::MalformedSexp {
                detail: "digest must be 32 hex characters".to_string(),
            });
        }
        let mut bytes = [0u8; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).map_err(|_| ProfileError::MalformedSexp {
                detail: "malformed digest hex".to_string(),
            })?;
        }
        registry.insert_raw(name.as_atom()?.to_string(), kind, bytes);
    }
    Ok(registry)
}

/// Convert a decoded profile to its symbolic-expression tree (spec §6
/// Output 1: top-level fields `addr2loc`, `name2id`, `functions`, `crcs`,
/// `buildid`).
pub fn to_sexp(profile: &DecodedProfile) -> String {
    let addr2loc = Sexp::list(profile.addr2loc.values().map(location_to_sexp).collect());
    let name2id = Sexp::list(
        profile
            .name2id
            .iter()
            .map(|(name, id)| Sexp::list(vec![Sexp::atom(name.clone()), Sexp::atom(id.to_string())]))
            .collect(),
    );
    let functions = Sexp::list(profile.functions.values().map(function_to_sexp).collect());
    let crcs = crcs_to_sexp(&profile.crcs);
    let buildid = match &profile.buildid {
        Some(b) => Sexp::atom(b.clone()),
        None => Sexp::atom("none"),
    };

    let root = Sexp::list(vec![
        Sexp::atom("profile"),
        Sexp::list(vec![Sexp::atom("addr2loc"), addr2loc]),
        Sexp::list(vec![Sexp::atom("name2id"), name2id]),
        Sexp::list(vec![Sexp::atom("functions"), functions]),
        Sexp::list(vec![Sexp::atom("crcs"), crcs]),
        Sexp::list(vec![Sexp::atom("buildid"), buildid]),
    ]);
    root.to_text()
}

/// Parse a decoded profile back out of [`to_sexp`]'s textual form.
pub fn of_sexp(input: &str) -> Result<DecodedProfile> {
    let root = Sexp::parse(input)?;
    let fields = root.as_list()?;
    let [tag, addr2loc_s, name2id_s, functions_s, crcs_s, buildid_s] = fields else {
        return Err(ProfileError::MalformedSexp {
            detail: "profile must have 5 top-level fields".to_string(),
        });
    };
    if tag.as_atom()? != "profile" {
        return Err(ProfileError::MalformedSexp {
            detail: "missing `profile` tag".to_string(),
        });
    }

    let mut addr2loc = FxHashMap::default();
    for entry in addr2loc_s.as_list()?[1].as_list()? {
        let (addr, loc) = sexp_to_location(entry)?;
        addr2loc.insert(addr, loc);
    }

    let mut name2id: FxHashMap<String, FunctionId> = FxHashMap::default();
    for entry in name2id_s.as_list()?[1].as_list()? {
        let fields = entry.as_list()?;
        let [name, id] = fields else {
            return Err(ProfileError::MalformedSexp {
                detail: "name2id entry must have 2 fields".to_string(),
            });
        };
        name2id.insert(
            name.as_atom()?.to_string(),
            id.as_atom()?.parse().map_err(|_| ProfileError::MalformedSexp {
                detail: "bad function id".to_string(),
            })?,
        );
    }

    let mut functions = FxHashMap::default();
    for entry in functions_s.as_list()?[1].as_list()? {
        let f = sexp_to_function(entry)?;
        functions.insert(f.id, f);
    }

    let crcs = sexp_to_crcs(&crcs_s.as_list()?[1])?;

    let buildid = match buildid_s.as_list()?[1].as_atom()? {
        "none" => None,
        s => Some(s.to_string()),
    };

    Ok(DecodedProfile {
        addr2loc,
        name2id,
        functions,
        crcs,
        buildid,
    })
}

pub fn write_textual<W: Write>(profile: &DecodedProfile, mut w: W) -> Result<()> {
    w.write_all(to_sexp(profile).as_bytes())?;
    Ok(())
}

pub fn read_textual<R: Read>(mut r: R) -> Result<DecodedProfile> {
    let mut text = String::new();
    r.read_to_string(&mut text)?;
    of_sexp(&text)
}

/// Write the binary form: 4-byte magic, 1-byte format version, an 8-byte
/// little-endian length prefix, then a `bincode`-encoded payload (spec §4.7,
/// §7 `IncompatibleVersion`).
pub fn write_binary<W: Write>(profile: &DecodedProfile, mut w: W) -> Result<()> {
    let payload =
        bincode::serde::encode_to_vec(profile, bincode::config::standard()).map_err(|e| ProfileError::Encode {
            detail: e.to_string(),
        })?;
    w.write_all(BINARY_MAGIC)?;
    w.write_all(&[FORMAT_VERSION])?;
    w.write_all(&(payload.len() as u64).to_le_bytes())?;
    w.write_all(&payload)?;
    Ok(())
}

pub fn read_binary<R: Read>(mut r: R) -> Result<DecodedProfile> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if &magic != BINARY_MAGIC {
        return Err(ProfileError::IncompatibleVersion {
            found: 0,
            expected: u32::from(FORMAT_VERSION),
        });
    }
    let mut version = [0u8; 1];
    r.read_exact(&mut version)?;
    if version[0] != FORMAT_VERSION {
        return Err(ProfileError::IncompatibleVersion {
            found: u32::from(version[0]),
            expected: u32::from(FORMAT_VERSION),
        });
    }
    let mut len_bytes = [0u8; 8];
    r.read_exact(&mut len_bytes)?;
    let len = u64::from_le_bytes(len_bytes) as usize;
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)?;
    let (profile, _) = bincode::serde::decode_from_slice(&payload, bincode::config::standard())
        .map_err(|e| ProfileError::Decode { detail: e.to_string() })?;
    Ok(profile)
}
