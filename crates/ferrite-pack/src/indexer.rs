//! Server-side pack ingestion.
//!
//! `IndexPack` streams an incoming pack to disk, walks its entries to
//! compute ids and CRCs, resolves deltas (including thin-pack bases
//! supplied by the local store), verifies the trailing checksum, writes
//! the companion `.idx`, and installs both atomically under the pack's
//! checksum name. A thin pack that still has unresolved bases after the
//! resolver is consulted never installs.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use ferrite_hash::{HashKind, ObjectHasher, Oid};
use ferrite_object::ObjectKind;
use ferrite_util::ProgressMonitor;
use flate2::bufread::ZlibDecoder;

use crate::entry::{EntryHeader, PackEntryKind};
use crate::index::{write_index, IndexEntry};
use crate::{delta, PackError, MAX_DELTA_DEPTH, PACK_HEADER_LEN, PACK_MAGIC};

/// Result of a successful ingest.
#[derive(Debug)]
pub struct IndexPackOutcome {
    pub pack_path: PathBuf,
    pub idx_path: PathBuf,
    pub checksum: Oid,
    pub object_count: u32,
    /// Ids of every object the pack delivered.
    pub objects: Vec<Oid>,
    /// Bases fetched from the local store to complete a thin pack.
    pub thin_bases: Vec<Oid>,
    /// Exact byte size of the received pack stream.
    pub pack_size: u64,
}

/// One parsed-but-unresolved entry.
struct RawEntry {
    offset: u64,
    kind: PackEntryKind,
    data: Vec<u8>,
    crc: u32,
}

/// Streaming pack indexer.
pub struct IndexPack {
    hash: HashKind,
}

impl IndexPack {
    pub fn new(hash: HashKind) -> Self {
        Self { hash }
    }

    /// Ingest a pack stream into `pack_dir`.
    ///
    /// `resolve` supplies bases for thin deltas from the local store; it
    /// returning `None` for a needed base fails the ingest with
    /// [`PackError::MissingBase`].
    pub fn run(
        &self,
        mut input: impl Read,
        pack_dir: &Path,
        resolve: impl Fn(&Oid) -> Option<(ObjectKind, Vec<u8>)>,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<IndexPackOutcome, PackError> {
        // Phase 1: spool the stream to memory (and later to disk). The
        // trailing checksum covers every byte up to itself.
        let mut pack = Vec::new();
        input.read_to_end(&mut pack)?;

        let id_len = self.hash.raw_len();
        if pack.len() < PACK_HEADER_LEN + id_len {
            return Err(PackError::BadHeader("truncated pack stream".into()));
        }
        if &pack[0..4] != PACK_MAGIC {
            return Err(PackError::BadHeader("bad magic".into()));
        }
        let version = u32::from_be_bytes(pack[4..8].try_into().unwrap());
        if version != 2 && version != 3 {
            return Err(PackError::BadVersion(version));
        }
        let declared = u32::from_be_bytes(pack[8..12].try_into().unwrap());

        let body_len = pack.len() - id_len;
        let computed = ObjectHasher::digest(self.hash, &pack[..body_len])?;
        let stored = &pack[body_len..];
        if computed.as_bytes() != stored {
            return Err(PackError::ChecksumMismatch {
                stored: ferrite_hash::hex::encode(stored),
                computed: computed.to_hex(),
            });
        }
        let checksum = computed;

        // Phase 2: walk the entries.
        monitor.begin("Indexing objects", Some(u64::from(declared)));
        let mut entries = Vec::with_capacity(declared as usize);
        let mut at = PACK_HEADER_LEN as u64;
        for _ in 0..declared {
            if monitor.is_cancelled() {
                return Err(PackError::Cancelled);
            }
            let (entry, next) = self.parse_entry(&pack, at, body_len as u64)?;
            entries.push(entry);
            at = next;
            monitor.update(1);
        }
        monitor.end();
        if at != body_len as u64 {
            return Err(PackError::CountMismatch {
                declared,
                found: declared, // all parsed, but trailing garbage remains
            });
        }

        // Phase 3: resolve every entry to (kind, bytes) and compute ids.
        let by_offset: HashMap<u64, usize> =
            entries.iter().enumerate().map(|(i, e)| (e.offset, i)).collect();
        let mut resolved: Vec<Option<(ObjectKind, Vec<u8>)>> = vec![None; entries.len()];
        let mut oid_to_slot: HashMap<Oid, usize> = HashMap::new();
        let mut thin_bases: Vec<(Oid, ObjectKind, Vec<u8>)> = Vec::new();

        let mut ids: Vec<Option<Oid>> = vec![None; entries.len()];

        // Whole objects first; they also seed REF_DELTA lookup by id.
        for (slot, entry) in entries.iter().enumerate() {
            if let PackEntryKind::Whole(kind) = entry.kind {
                let oid =
                    ObjectHasher::object_id(self.hash, kind.as_str(), &entry.data)?;
                oid_to_slot.insert(oid, slot);
                ids[slot] = Some(oid);
                resolved[slot] = Some((kind, entry.data.clone()));
            }
        }

        monitor.begin("Resolving deltas", Some(entries.len() as u64));
        for slot in 0..entries.len() {
            if !matches!(entries[slot].kind, PackEntryKind::Whole(_)) {
                self.resolve_slot(
                    slot,
                    &entries,
                    &by_offset,
                    &mut resolved,
                    &mut oid_to_slot,
                    &mut ids,
                    &resolve,
                    &mut thin_bases,
                    0,
                )?;
            }
            monitor.update(1);
        }
        monitor.end();

        // Phase 4: a thin pack is completed before it may install — the
        // fetched bases are appended as whole entries and the trailer
        // recomputed, so the pack on disk is self-contained.
        let received_size = pack.len() as u64;
        let mut index_rows: Vec<IndexEntry> = entries
            .iter()
            .enumerate()
            .map(|(slot, entry)| IndexEntry {
                oid: ids[slot].expect("all entries resolved"),
                offset: entry.offset,
                crc: entry.crc,
            })
            .collect();
        let checksum = if thin_bases.is_empty() {
            checksum
        } else {
            pack.truncate(body_len);
            let total = declared as usize + thin_bases.len();
            pack[8..12].copy_from_slice(&(total as u32).to_be_bytes());
            for (oid, kind, data) in &thin_bases {
                let offset = pack.len() as u64;
                let mut raw = crate::entry::encode_entry_header(
                    crate::kind_code(*kind),
                    data.len() as u64,
                );
                raw.extend_from_slice(&crate::writer::deflate(data)?);
                let mut crc = crc32fast::Hasher::new();
                crc.update(&raw);
                index_rows.push(IndexEntry {
                    oid: *oid,
                    offset,
                    crc: crc.finalize(),
                });
                pack.extend_from_slice(&raw);
            }
            let fixed = ObjectHasher::digest(self.hash, &pack)?;
            pack.extend_from_slice(fixed.as_bytes());
            fixed
        };

        // Phase 5: install pack + idx under the (final) checksum name.
        std::fs::create_dir_all(pack_dir)?;
        let stem = format!("pack-{}", checksum.to_hex());
        let pack_path = pack_dir.join(format!("{stem}.pack"));
        let idx_path = pack_dir.join(format!("{stem}.idx"));

        let idx_bytes = write_index(&index_rows, &checksum)?;

        let tmp_pack = pack_dir.join(format!("{stem}.pack.tmp"));
        let tmp_idx = pack_dir.join(format!("{stem}.idx.tmp"));
        write_file(&tmp_pack, &pack)?;
        write_file(&tmp_idx, &idx_bytes)?;
        // Index becomes visible only after the pack itself is in place.
        std::fs::rename(&tmp_pack, &pack_path).map_err(|e| PackError::Install {
            path: pack_path.clone(),
            reason: e.to_string(),
        })?;
        std::fs::rename(&tmp_idx, &idx_path).map_err(|e| PackError::Install {
            path: idx_path.clone(),
            reason: e.to_string(),
        })?;

        Ok(IndexPackOutcome {
            pack_path,
            idx_path,
            checksum,
            object_count: declared,
            objects: ids.into_iter().map(|id| id.expect("resolved")).collect(),
            thin_bases: thin_bases.into_iter().map(|(oid, _, _)| oid).collect(),
            pack_size: received_size,
        })
    }

    /// Parse one entry; returns it and the offset of the next.
    fn parse_entry(
        &self,
        pack: &[u8],
        offset: u64,
        body_len: u64,
    ) -> Result<(RawEntry, u64), PackError> {
        if offset >= body_len {
            return Err(PackError::CorruptEntry(offset));
        }
        let mut cursor = std::io::Cursor::new(&pack[offset as usize..body_len as usize]);
        let header = EntryHeader::read(&mut cursor, offset, self.hash)?;

        let data_start = offset as usize + header.header_len;
        let mut decoder = ZlibDecoder::new(&pack[data_start..body_len as usize]);
        let mut data = Vec::with_capacity(header.inflated_size as usize);
        decoder
            .read_to_end(&mut data)
            .map_err(|_| PackError::CorruptEntry(offset))?;
        if data.len() as u64 != header.inflated_size {
            return Err(PackError::CorruptEntry(offset));
        }
        let compressed_len = decoder.total_in() as usize;
        let entry_end = data_start + compressed_len;

        let mut crc = crc32fast::Hasher::new();
        crc.update(&pack[offset as usize..entry_end]);

        Ok((
            RawEntry {
                offset,
                kind: header.kind,
                data,
                crc: crc.finalize(),
            },
            entry_end as u64,
        ))
    }

    /// Resolve a delta entry to its full bytes, memoized per slot.
    #[allow(clippy::too_many_arguments)]
    fn resolve_slot(
        &self,
        slot: usize,
        entries: &[RawEntry],
        by_offset: &HashMap<u64, usize>,
        resolved: &mut Vec<Option<(ObjectKind, Vec<u8>)>>,
        oid_to_slot: &mut HashMap<Oid, usize>,
        ids: &mut Vec<Option<Oid>>,
        resolve: &impl Fn(&Oid) -> Option<(ObjectKind, Vec<u8>)>,
        thin_bases: &mut Vec<(Oid, ObjectKind, Vec<u8>)>,
        depth: usize,
    ) -> Result<(), PackError> {
        if resolved[slot].is_some() && ids[slot].is_some() {
            return Ok(());
        }
        if depth > MAX_DELTA_DEPTH {
            return Err(PackError::DeltaTooDeep {
                at: entries[slot].offset,
                max: MAX_DELTA_DEPTH,
            });
        }

        let (base_kind, base_data) = match &entries[slot].kind {
            PackEntryKind::Whole(kind) => (*kind, entries[slot].data.clone()),
            PackEntryKind::OfsDelta { back } => {
                let base_offset = entries[slot].offset - back;
                let base_slot = *by_offset
                    .get(&base_offset)
                    .ok_or(PackError::CorruptEntry(entries[slot].offset))?;
                self.resolve_slot(
                    base_slot, entries, by_offset, resolved, oid_to_slot, ids, resolve,
                    thin_bases, depth + 1,
                )?;
                let (kind, data) = resolved[base_slot].clone().expect("just resolved");
                (kind, data)
            }
            PackEntryKind::RefDelta { base } => {
                if let Some(&base_slot) = oid_to_slot.get(base) {
                    self.resolve_slot(
                        base_slot, entries, by_offset, resolved, oid_to_slot, ids, resolve,
                        thin_bases, depth + 1,
                    )?;
                    let (kind, data) = resolved[base_slot].clone().expect("just resolved");
                    (kind, data)
                } else if let Some((kind, data)) = resolve(base) {
                    if !thin_bases.iter().any(|(oid, _, _)| oid == base) {
                        thin_bases.push((*base, kind, data.clone()));
                    }
                    (kind, data)
                } else {
                    return Err(PackError::MissingBase(*base));
                }
            }
        };

        let (kind, bytes) = match &entries[slot].kind {
            PackEntryKind::Whole(kind) => (*kind, entries[slot].data.clone()),
            _ => (base_kind, delta::apply(&base_data, &entries[slot].data)?),
        };

        let oid = ObjectHasher::object_id(self.hash, kind.as_str(), &bytes)?;
        oid_to_slot.insert(oid, slot);
        ids[slot] = Some(oid);
        resolved[slot] = Some((kind, bytes));
        Ok(())
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), PackError> {
    let mut file = std::fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{plan_delta, plan_whole, write_pack};
    use crate::{Pack, PackError};
    use ferrite_util::NullMonitor;

    fn blob_plan(data: &[u8]) -> crate::PlannedObject {
        let oid = ObjectHasher::object_id(HashKind::Sha1, "blob", data).unwrap();
        plan_whole(oid, ObjectKind::Blob, data.to_vec())
    }

    #[test]
    fn ingest_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = Vec::new();
        let plans = vec![blob_plan(b"first object"), blob_plan(b"second object")];
        write_pack(&plans, &mut bytes, HashKind::Sha1).unwrap();

        let outcome = IndexPack::new(HashKind::Sha1)
            .run(bytes.as_slice(), dir.path(), |_| None, &mut NullMonitor)
            .unwrap();

        assert_eq!(outcome.object_count, 2);
        assert_eq!(outcome.pack_size, bytes.len() as u64);
        assert!(outcome.thin_bases.is_empty());
        assert!(outcome.pack_path.exists());
        assert!(outcome.idx_path.exists());
        assert!(outcome
            .pack_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(&format!("pack-{}", outcome.checksum.to_hex())));

        let pack = Pack::open(&outcome.pack_path).unwrap();
        for plan in &plans {
            let obj = pack.read(&plan.oid).unwrap().unwrap();
            assert_eq!(obj.kind, ObjectKind::Blob);
            assert_eq!(obj.data, plan.data);
        }
    }

    #[test]
    fn ingest_pack_with_internal_delta() {
        let dir = tempfile::tempdir().unwrap();
        let base = b"a base buffer that is long enough to delta against cleanly".to_vec();
        let target = b"a base buffer that is long enough to delta against cleanly, extended".to_vec();

        let base_oid = ObjectHasher::object_id(HashKind::Sha1, "blob", &base).unwrap();
        let target_oid = ObjectHasher::object_id(HashKind::Sha1, "blob", &target).unwrap();

        let plans = vec![
            blob_plan(&base),
            plan_delta(target_oid, ObjectKind::Blob, base_oid, &base, &target),
        ];
        let mut bytes = Vec::new();
        write_pack(&plans, &mut bytes, HashKind::Sha1).unwrap();

        let outcome = IndexPack::new(HashKind::Sha1)
            .run(bytes.as_slice(), dir.path(), |_| None, &mut NullMonitor)
            .unwrap();
        assert!(outcome.objects.contains(&target_oid));

        let pack = Pack::open(&outcome.pack_path).unwrap();
        assert_eq!(pack.read(&target_oid).unwrap().unwrap().data, target);
    }

    #[test]
    fn thin_pack_resolves_through_local_store() {
        let dir = tempfile::tempdir().unwrap();
        let base = b"the receiver already has this object in its store".to_vec();
        let target = b"the receiver already has this object in its store, plus news".to_vec();

        let base_oid = ObjectHasher::object_id(HashKind::Sha1, "blob", &base).unwrap();
        let target_oid = ObjectHasher::object_id(HashKind::Sha1, "blob", &target).unwrap();

        // Thin: the base is NOT part of the pack.
        let plans = vec![plan_delta(
            target_oid,
            ObjectKind::Blob,
            base_oid,
            &base,
            &target,
        )];
        let mut bytes = Vec::new();
        write_pack(&plans, &mut bytes, HashKind::Sha1).unwrap();

        let base_for_resolver = base.clone();
        let outcome = IndexPack::new(HashKind::Sha1)
            .run(
                bytes.as_slice(),
                dir.path(),
                move |oid| {
                    (*oid == base_oid).then(|| (ObjectKind::Blob, base_for_resolver.clone()))
                },
                &mut NullMonitor,
            )
            .unwrap();

        assert_eq!(outcome.thin_bases, vec![base_oid]);
        // The reported size is what was received, before completion.
        assert_eq!(outcome.pack_size, bytes.len() as u64);

        // Completion appended the base: the installed pack stands alone.
        let pack = Pack::open(&outcome.pack_path).unwrap();
        assert_eq!(pack.count(), 2);
        assert_eq!(pack.read(&target_oid).unwrap().unwrap().data, target);
        assert_eq!(pack.read(&base_oid).unwrap().unwrap().data, base);
        crate::verify_pack(&pack).unwrap();
    }

    #[test]
    fn unresolvable_thin_base_fails() {
        let dir = tempfile::tempdir().unwrap();
        let base = b"gone".to_vec();
        let target = b"gone but longer".to_vec();
        let base_oid = ObjectHasher::object_id(HashKind::Sha1, "blob", &base).unwrap();
        let target_oid = ObjectHasher::object_id(HashKind::Sha1, "blob", &target).unwrap();

        let mut bytes = Vec::new();
        write_pack(
            &[plan_delta(target_oid, ObjectKind::Blob, base_oid, &base, &target)],
            &mut bytes,
            HashKind::Sha1,
        )
        .unwrap();

        let err = IndexPack::new(HashKind::Sha1)
            .run(bytes.as_slice(), dir.path(), |_| None, &mut NullMonitor)
            .unwrap_err();
        assert!(matches!(err, PackError::MissingBase(oid) if oid == base_oid));
        // Nothing installed.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn corrupted_stream_fails_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let mut bytes = Vec::new();
        write_pack(&[blob_plan(b"data")], &mut bytes, HashKind::Sha1).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xff;

        let err = IndexPack::new(HashKind::Sha1)
            .run(bytes.as_slice(), dir.path(), |_| None, &mut NullMonitor)
            .unwrap_err();
        assert!(matches!(err, PackError::ChecksumMismatch { .. }));
    }
}
