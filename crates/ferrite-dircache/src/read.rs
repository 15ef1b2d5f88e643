//! Parsing the `DIRC` file, versions 2 through 4.

use bstr::BString;
use ferrite_hash::{HashKind, ObjectHasher, Oid};
use ferrite_object::EntryMode;

use crate::entry::{DirCacheEntry, EntryFlags, Stage, StatData};
use crate::resolve_undo::ResolveUndo;
use crate::tree_ext::CacheTree;
use crate::{DirCache, DirCacheError, RawExtension};

const SIGNATURE: &[u8; 4] = b"DIRC";

pub(crate) fn parse(data: &[u8]) -> Result<DirCache, DirCacheError> {
    let id_len = HashKind::Sha1.raw_len();
    if data.len() < 12 + id_len {
        return Err(DirCacheError::BadHeader("file too small".into()));
    }
    if &data[0..4] != SIGNATURE {
        return Err(DirCacheError::BadHeader("bad signature".into()));
    }
    let version = u32::from_be_bytes(data[4..8].try_into().unwrap());
    if !(2..=4).contains(&version) {
        return Err(DirCacheError::BadVersion(version));
    }
    let count = u32::from_be_bytes(data[8..12].try_into().unwrap()) as usize;

    // Trailing checksum covers everything before it.
    let body_end = data.len() - id_len;
    let stored = &data[body_end..];
    let computed = ObjectHasher::digest(HashKind::Sha1, &data[..body_end])?;
    if computed.as_bytes() != stored {
        return Err(DirCacheError::ChecksumMismatch);
    }

    let mut at = 12;
    let mut entries = Vec::with_capacity(count);
    let mut previous_path = BString::new(Vec::new());

    for _ in 0..count {
        let (entry, next) = parse_entry(data, at, version, &previous_path)?;
        previous_path = entry.path.clone();
        if let Some(last) = entries.last() {
            let last: &DirCacheEntry = last;
            if last.key() >= entry.key() {
                return Err(DirCacheError::OutOfOrder(
                    last.path.to_string(),
                    entry.path.to_string(),
                ));
            }
        }
        entries.push(entry);
        at = next;
    }

    // Extensions until the trailer.
    let mut cache_tree = None;
    let mut resolve_undo = None;
    let mut unknown = Vec::new();
    while at + 8 <= body_end {
        let signature: [u8; 4] = data[at..at + 4].try_into().unwrap();
        let len = u32::from_be_bytes(data[at + 4..at + 8].try_into().unwrap()) as usize;
        let payload_start = at + 8;
        let payload_end = payload_start + len;
        if payload_end > body_end {
            return Err(DirCacheError::BadExtension {
                sig: String::from_utf8_lossy(&signature).into_owned(),
                reason: "extension runs past the checksum".into(),
            });
        }
        let payload = &data[payload_start..payload_end];
        match &signature {
            b"TREE" => cache_tree = Some(CacheTree::parse(payload)?),
            b"REUC" => resolve_undo = Some(ResolveUndo::parse(payload)?),
            _ => {
                // Mandatory extensions are lowercase-first; those we must
                // understand to read the index safely.
                if signature[0].is_ascii_lowercase() {
                    unknown.push(RawExtension {
                        signature,
                        payload: payload.to_vec(),
                    });
                } else {
                    return Err(DirCacheError::BadExtension {
                        sig: String::from_utf8_lossy(&signature).into_owned(),
                        reason: "unknown mandatory extension".into(),
                    });
                }
            }
        }
        at = payload_end;
    }

    Ok(DirCache::from_parts(
        version,
        entries,
        cache_tree,
        resolve_undo,
        unknown,
    ))
}

fn parse_entry(
    data: &[u8],
    start: usize,
    version: u32,
    previous_path: &BString,
) -> Result<(DirCacheEntry, usize), DirCacheError> {
    let bad = |at: usize, reason: &str| DirCacheError::BadEntry {
        at,
        reason: reason.into(),
    };

    let fixed_len = 62; // 10 u32s + 20-byte id + u16 flags
    if start + fixed_len > data.len() {
        return Err(bad(start, "truncated entry"));
    }

    let word = |i: usize| -> u32 {
        u32::from_be_bytes(data[start + i * 4..start + i * 4 + 4].try_into().unwrap())
    };

    let stat = StatData {
        ctime_secs: word(0),
        ctime_nanos: word(1),
        mtime_secs: word(2),
        mtime_nanos: word(3),
        dev: word(4),
        ino: word(5),
        uid: word(7),
        gid: word(8),
        size: word(9),
    };
    let mode = EntryMode::from_raw(word(6))
        .map_err(|_| bad(start, "bad mode"))?;

    let oid_at = start + 40;
    let oid = Oid::from_raw(&data[oid_at..oid_at + 20], HashKind::Sha1)?;

    let flags_at = oid_at + 20;
    let flag_word = u16::from_be_bytes(data[flags_at..flags_at + 2].try_into().unwrap());
    let assume_valid = flag_word & 0x8000 != 0;
    let extended = flag_word & 0x4000 != 0;
    let stage = Stage::from_byte(((flag_word >> 12) & 0x3) as u8)?;
    let name_len = (flag_word & 0x0fff) as usize;

    let mut at = flags_at + 2;
    let mut flags = EntryFlags {
        assume_valid,
        ..Default::default()
    };
    if extended {
        if version < 3 {
            return Err(bad(start, "extended flags in a v2 index"));
        }
        if at + 2 > data.len() {
            return Err(bad(at, "truncated extended flags"));
        }
        let ext_word = u16::from_be_bytes(data[at..at + 2].try_into().unwrap());
        flags.skip_worktree = ext_word & 0x4000 != 0;
        flags.intent_to_add = ext_word & 0x2000 != 0;
        at += 2;
    }

    if at > data.len() {
        return Err(bad(at, "truncated entry tail"));
    }
    let path = if version == 4 {
        // Prefix compression: strip N bytes off the previous path, append
        // the NUL-terminated suffix.
        let (strip, used) = read_offset_varint(&data[at..]).ok_or_else(|| {
            bad(at, "bad path prefix varint")
        })?;
        at += used;
        let nul = data[at..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| bad(at, "unterminated path"))?;
        let suffix = &data[at..at + nul];
        at += nul + 1;

        if strip > previous_path.len() {
            return Err(bad(at, "prefix strip longer than previous path"));
        }
        let mut path = previous_path[..previous_path.len() - strip].to_vec();
        path.extend_from_slice(suffix);
        BString::from(path)
    } else {
        let path_end = if name_len < 0x0fff {
            at + name_len
        } else {
            at + data[at..]
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| bad(at, "unterminated long path"))?
        };
        if path_end > data.len() {
            return Err(bad(at, "truncated path"));
        }
        let path = BString::from(&data[at..path_end]);

        // Entries pad to an 8-byte boundary with NULs (at least one).
        let entry_len = path_end - start;
        let padded = (entry_len / 8 + 1) * 8;
        at = start + padded;
        return Ok((finish(path, mode, oid, stage, stat, flags), at));
    };

    Ok((finish(path, mode, oid, stage, stat, flags), at))
}

fn finish(
    path: BString,
    mode: EntryMode,
    oid: Oid,
    stage: Stage,
    stat: StatData,
    flags: EntryFlags,
) -> DirCacheEntry {
    DirCacheEntry {
        path,
        oid,
        mode,
        stage,
        stat,
        flags,
    }
}

/// The v4 path-compression varint: big-endian groups with the `+1`
/// offset encoding (same shape as OFS_DELTA offsets).
pub(crate) fn read_offset_varint(data: &[u8]) -> Option<(usize, usize)> {
    let mut used = 0;
    let mut byte = *data.get(used)?;
    used += 1;
    let mut value = (byte & 0x7f) as usize;
    while byte & 0x80 != 0 {
        byte = *data.get(used)?;
        used += 1;
        value = value.checked_add(1)?.checked_shl(7)? | (byte & 0x7f) as usize;
    }
    Some((value, used))
}

pub(crate) fn write_offset_varint(value: usize) -> Vec<u8> {
    let mut bytes = vec![(value & 0x7f) as u8];
    let mut rest = value >> 7;
    while rest > 0 {
        rest -= 1;
        bytes.push(0x80 | (rest & 0x7f) as u8);
        rest >>= 7;
    }
    bytes.reverse();
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_varint_round_trip() {
        for value in [0usize, 1, 127, 128, 129, 16384, 1 << 20] {
            let bytes = write_offset_varint(value);
            assert_eq!(read_offset_varint(&bytes), Some((value, bytes.len())));
        }
    }

    #[test]
    fn rejects_wrong_signature() {
        assert!(matches!(
            parse(b"JUNKxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx"),
            Err(DirCacheError::BadHeader(_))
        ));
    }
}
