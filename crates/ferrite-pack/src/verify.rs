//! Whole-pack verification for fsck.

use ferrite_hash::ObjectHasher;

use crate::{Pack, PackError};

/// Verify a pack end to end: trailing checksum, per-entry CRCs against the
/// index, and every object reconstructible with its id matching the index.
pub fn verify_pack(pack: &Pack) -> Result<(), PackError> {
    let index = pack.index();

    // Entry extents follow from the sorted offsets; the last entry ends
    // where the trailer begins.
    let mut offsets: Vec<u64> = index.iter().map(|(_, offset)| offset).collect();
    offsets.sort_unstable();

    let trailer_at = pack.len_bytes() - 20;

    for pos in 0..index.len() {
        let oid = index.oid_at(pos);
        let start = index.offset_at(pos);
        let end = offsets
            .iter()
            .find(|&&o| o > start)
            .copied()
            .unwrap_or(trailer_at);

        let mut raw = vec![0u8; (end - start) as usize];
        pack.read_exact_at(start, &mut raw)?;
        let mut crc = crc32fast::Hasher::new();
        crc.update(&raw);
        if crc.finalize() != index.crc_at(pos) {
            return Err(PackError::CrcMismatch { oid });
        }

        let obj = pack.read_at(start)?;
        let actual = ObjectHasher::object_id(pack.index().pack_checksum().kind(), obj.kind.as_str(), &obj.data)?;
        if actual != oid {
            return Err(PackError::CrcMismatch { oid });
        }
    }
    Ok(())
}
