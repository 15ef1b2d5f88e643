//! The REUC (resolve-undo) extension: conflict stages remembered after
//! resolution so `checkout --merge` can recreate them.

use bstr::BString;
use ferrite_hash::{HashKind, Oid};

use crate::DirCacheError;

/// Stages 1–3 of one resolved path; a slot is `None` when that stage
/// did not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveUndoEntry {
    pub path: BString,
    pub stages: [Option<(u32, Oid)>; 3],
}

/// The whole extension.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolveUndo {
    pub entries: Vec<ResolveUndoEntry>,
}

impl ResolveUndo {
    pub fn parse(payload: &[u8]) -> Result<Self, DirCacheError> {
        let bad = |reason: &str| DirCacheError::BadExtension {
            sig: "REUC".into(),
            reason: reason.into(),
        };

        let mut entries = Vec::new();
        let mut at = 0;
        while at < payload.len() {
            let nul = payload[at..]
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| bad("unterminated path"))?;
            let path = BString::from(&payload[at..at + nul]);
            at += nul + 1;

            let mut modes = [0u32; 3];
            for mode in &mut modes {
                let nul = payload[at..]
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or_else(|| bad("unterminated mode"))?;
                let text = std::str::from_utf8(&payload[at..at + nul])
                    .map_err(|_| bad("non-ASCII mode"))?;
                *mode = u32::from_str_radix(text, 8).map_err(|_| bad("bad octal mode"))?;
                at += nul + 1;
            }

            let id_len = HashKind::Sha1.raw_len();
            let mut stages: [Option<(u32, Oid)>; 3] = [None, None, None];
            for (slot, &mode) in stages.iter_mut().zip(modes.iter()) {
                if mode == 0 {
                    continue;
                }
                if at + id_len > payload.len() {
                    return Err(bad("truncated stage id"));
                }
                let oid = Oid::from_raw(&payload[at..at + id_len], HashKind::Sha1)?;
                at += id_len;
                *slot = Some((mode, oid));
            }

            entries.push(ResolveUndoEntry { path, stages });
        }
        Ok(Self { entries })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for entry in &self.entries {
            out.extend_from_slice(&entry.path);
            out.push(0);
            for slot in &entry.stages {
                match slot {
                    Some((mode, _)) => out.extend_from_slice(format!("{mode:o}").as_bytes()),
                    None => out.push(b'0'),
                }
                out.push(0);
            }
            for slot in entry.stages.iter().flatten() {
                out.extend_from_slice(slot.1.as_bytes());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(n: u8) -> Oid {
        let mut raw = [0u8; 20];
        raw[19] = n;
        Oid::from_raw(&raw, HashKind::Sha1).unwrap()
    }

    #[test]
    fn full_three_stage_round_trip() {
        let reuc = ResolveUndo {
            entries: vec![ResolveUndoEntry {
                path: BString::from("conflicted.txt"),
                stages: [
                    Some((0o100644, oid(1))),
                    Some((0o100644, oid(2))),
                    Some((0o100755, oid(3))),
                ],
            }],
        };
        let back = ResolveUndo::parse(&reuc.serialize()).unwrap();
        assert_eq!(back, reuc);
    }

    #[test]
    fn missing_stages_round_trip() {
        let reuc = ResolveUndo {
            entries: vec![ResolveUndoEntry {
                path: BString::from("added-by-them.txt"),
                stages: [None, None, Some((0o100644, oid(9)))],
            }],
        };
        let back = ResolveUndo::parse(&reuc.serialize()).unwrap();
        assert_eq!(back, reuc);
    }

    #[test]
    fn empty_extension() {
        assert_eq!(ResolveUndo::parse(b"").unwrap(), ResolveUndo::default());
    }

    #[test]
    fn truncated_payload_rejected() {
        let reuc = ResolveUndo {
            entries: vec![ResolveUndoEntry {
                path: BString::from("x"),
                stages: [Some((0o100644, oid(1))), None, None],
            }],
        };
        let mut bytes = reuc.serialize();
        bytes.truncate(bytes.len() - 5);
        assert!(ResolveUndo::parse(&bytes).is_err());
    }
}
