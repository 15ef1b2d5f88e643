//! The unified object database.
//!
//! A read goes to the pack tier first — packs ordered by how recently
//! they served a hit, then by discovery ordinal, then by filename — and
//! falls back to loose files. A pack that turns out corrupt is
//! quarantined for the rest of the session so one bad file cannot poison
//! every read; the object is then served from any other home it has.

mod short;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use ferrite_hash::{HashKind, Oid, ShortId};
use ferrite_loose::LooseStore;
use ferrite_object::{Object, ObjectKind};
use ferrite_pack::{DeltaBaseCache, Pack, PackError, ReadStrategy, WindowCache};

/// Errors of the object database.
#[derive(Debug, thiserror::Error)]
pub enum OdbError {
    #[error("object {0} not found")]
    Missing(Oid),

    #[error("object {oid} is a {actual}, expected {expected}")]
    WrongKind {
        oid: Oid,
        expected: ObjectKind,
        actual: ObjectKind,
    },

    #[error("object {oid} is corrupt: {reason}")]
    Corrupt { oid: Oid, reason: String },

    #[error("short id {prefix} is ambiguous ({matches} candidates)")]
    Ambiguous { prefix: String, matches: usize },

    #[error(transparent)]
    Loose(#[from] ferrite_loose::LooseError),

    #[error(transparent)]
    Pack(#[from] PackError),

    #[error(transparent)]
    Object(#[from] ferrite_object::ObjectError),

    #[error(transparent)]
    Id(#[from] ferrite_hash::IdError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Kind and size without content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectInfo {
    pub kind: ObjectKind,
    pub size: u64,
}

/// Raw bytes of an object with its kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectData {
    pub kind: ObjectKind,
    pub data: Vec<u8>,
}

impl ObjectData {
    pub fn parse(&self) -> Result<Object, OdbError> {
        Ok(Object::parse_payload(self.kind, &self.data)?)
    }
}

struct PackSlot {
    pack: Arc<Pack>,
    ordinal: usize,
}

/// Object database over one `objects/` directory.
pub struct ObjectStore {
    loose: LooseStore,
    packs: RwLock<Vec<PackSlot>>,
    quarantine: Mutex<HashSet<PathBuf>>,
    objects_dir: PathBuf,
    hash: HashKind,
    strategy: ReadStrategy,
    windows: Arc<WindowCache>,
    bases: Arc<DeltaBaseCache>,
}

impl ObjectStore {
    /// Open with default strategy and private caches.
    pub fn open(objects_dir: impl AsRef<Path>) -> Result<Self, OdbError> {
        Self::open_with(
            objects_dir,
            HashKind::Sha1,
            ReadStrategy::default(),
            WindowCache::new(ferrite_pack::DEFAULT_WINDOW_BUDGET),
            DeltaBaseCache::new(ferrite_pack::DEFAULT_BASE_BUDGET),
        )
    }

    /// Open with explicit strategy and shared caches (one window cache per
    /// process, shared across repositories).
    pub fn open_with(
        objects_dir: impl AsRef<Path>,
        hash: HashKind,
        strategy: ReadStrategy,
        windows: Arc<WindowCache>,
        bases: Arc<DeltaBaseCache>,
    ) -> Result<Self, OdbError> {
        let objects_dir = objects_dir.as_ref().to_path_buf();
        let store = Self {
            loose: LooseStore::at(&objects_dir, hash),
            packs: RwLock::new(Vec::new()),
            quarantine: Mutex::new(HashSet::new()),
            objects_dir,
            hash,
            strategy,
            windows,
            bases,
        };
        store.refresh()?;
        Ok(store)
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }

    pub fn pack_dir(&self) -> PathBuf {
        self.objects_dir.join("pack")
    }

    pub fn hash(&self) -> HashKind {
        self.hash
    }

    /// Rescan the pack directory; call after a pack lands or a repack.
    pub fn refresh(&self) -> Result<(), OdbError> {
        let pack_dir = self.pack_dir();
        let mut found = Vec::new();
        if pack_dir.is_dir() {
            let quarantine = self.quarantine.lock().unwrap();
            let mut paths: Vec<PathBuf> = std::fs::read_dir(&pack_dir)?
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "pack"))
                .filter(|p| !quarantine.contains(p))
                .collect();
            // Deterministic discovery ordinals.
            paths.sort();
            for path in paths {
                match Pack::open_with(
                    &path,
                    self.strategy,
                    Arc::clone(&self.windows),
                    Arc::clone(&self.bases),
                ) {
                    Ok(pack) => found.push(pack),
                    Err(_) => continue, // unreadable pack: skip, loose may cover it
                }
            }
        }
        let mut packs = self.packs.write().unwrap();
        *packs = found
            .into_iter()
            .enumerate()
            .map(|(ordinal, pack)| PackSlot {
                pack: Arc::new(pack),
                ordinal,
            })
            .collect();
        Ok(())
    }

    pub fn contains(&self, oid: &Oid) -> bool {
        self.ordered_packs().iter().any(|p| p.contains(oid)) || self.loose.contains(oid)
    }

    /// Read with an optional kind expectation.
    ///
    /// Fails `Missing`, `Corrupt`, or `WrongKind` — the three outcomes a
    /// caller can act on distinctly.
    pub fn open_object(
        &self,
        oid: &Oid,
        expected: Option<ObjectKind>,
    ) -> Result<ObjectData, OdbError> {
        let data = self.read_data(oid)?;
        if let Some(expected) = expected {
            if data.kind != expected {
                return Err(OdbError::WrongKind {
                    oid: *oid,
                    expected,
                    actual: data.kind,
                });
            }
        }
        Ok(data)
    }

    /// Read and parse.
    pub fn read(&self, oid: &Oid) -> Result<Object, OdbError> {
        self.read_data(oid)?.parse()
    }

    /// Read and parse, tolerating absence.
    pub fn try_read(&self, oid: &Oid) -> Result<Option<Object>, OdbError> {
        match self.read(oid) {
            Ok(obj) => Ok(Some(obj)),
            Err(OdbError::Missing(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Kind and size without materializing content where avoidable.
    pub fn info(&self, oid: &Oid) -> Result<ObjectInfo, OdbError> {
        for pack in self.ordered_packs() {
            if let Some(offset) = pack.index().offset_of(oid) {
                match pack.info_at(offset) {
                    Ok((kind, size)) => return Ok(ObjectInfo { kind, size }),
                    Err(_) => {
                        self.quarantine(&pack);
                        continue;
                    }
                }
            }
        }
        if let Some(header) = self.loose.read_header(oid)? {
            return Ok(ObjectInfo {
                kind: header.kind,
                size: header.size as u64,
            });
        }
        Err(OdbError::Missing(*oid))
    }

    /// Store a parsed object loose.
    pub fn write(&self, obj: &Object) -> Result<Oid, OdbError> {
        Ok(self.loose.write(obj)?)
    }

    /// Store a raw payload loose.
    pub fn write_payload(&self, kind: ObjectKind, payload: &[u8]) -> Result<Oid, OdbError> {
        Ok(self.loose.write_payload(kind, payload)?)
    }

    /// Resolve an abbreviation to the unique id it names.
    pub fn resolve_short(&self, short: &ShortId) -> Result<Oid, OdbError> {
        short::resolve(self, short)
    }

    /// Every id in the store (loose + packs), unsorted, for gc and fsck.
    pub fn iter_all(&self) -> Result<Vec<Oid>, OdbError> {
        let mut ids: Vec<Oid> = self.loose.iter()?.collect();
        for pack in self.ordered_packs() {
            ids.extend(pack.index().iter().map(|(oid, _)| oid));
        }
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    pub(crate) fn loose(&self) -> &LooseStore {
        &self.loose
    }

    /// Packs in read-preference order: hottest first, then discovery
    /// ordinal, then filename. The tie-break is total, so two stores over
    /// the same directory probe packs identically.
    pub(crate) fn ordered_packs(&self) -> Vec<Arc<Pack>> {
        let packs = self.packs.read().unwrap();
        let mut slots: Vec<(u64, usize, PathBuf, Arc<Pack>)> = packs
            .iter()
            .map(|slot| {
                (
                    slot.pack.recency(),
                    slot.ordinal,
                    slot.pack.path().to_path_buf(),
                    Arc::clone(&slot.pack),
                )
            })
            .collect();
        slots.sort_by(|a, b| {
            b.0.cmp(&a.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.cmp(&b.2))
        });
        slots.into_iter().map(|(_, _, _, pack)| pack).collect()
    }

    fn read_data(&self, oid: &Oid) -> Result<ObjectData, OdbError> {
        let mut hit_corrupt_pack = false;

        for pack in self.ordered_packs() {
            if !pack.contains(oid) {
                continue;
            }
            // Cross-pack REF_DELTA bases resolve through the rest of the
            // store (minus this pack, to keep the chase finite).
            let outcome = pack.read_resolving(oid, |base| {
                self.read_base_elsewhere(base, pack.pack_id())
            });
            match outcome {
                Ok(Some(obj)) => {
                    return Ok(ObjectData {
                        kind: obj.kind,
                        data: obj.data,
                    })
                }
                Ok(None) => continue,
                Err(_) => {
                    self.quarantine(&pack);
                    hit_corrupt_pack = true;
                    continue;
                }
            }
        }

        if let Some(obj) = self.loose.read(oid)? {
            return Ok(ObjectData {
                kind: obj.kind(),
                data: obj.to_payload(),
            });
        }

        if hit_corrupt_pack {
            Err(OdbError::Corrupt {
                oid: *oid,
                reason: "every pack holding this object is corrupt".into(),
            })
        } else {
            Err(OdbError::Missing(*oid))
        }
    }

    fn read_base_elsewhere(&self, base: &Oid, skip_pack: u64) -> Option<(ObjectKind, Vec<u8>)> {
        for pack in self.ordered_packs() {
            if pack.pack_id() == skip_pack {
                continue;
            }
            if let Ok(Some(obj)) = pack.read(base) {
                return Some((obj.kind, obj.data));
            }
        }
        self.loose
            .read(base)
            .ok()
            .flatten()
            .map(|obj| (obj.kind(), obj.to_payload()))
    }

    fn quarantine(&self, pack: &Pack) {
        self.quarantine
            .lock()
            .unwrap()
            .insert(pack.path().to_path_buf());
        let id = pack.pack_id();
        self.windows.evict_pack(id);
        let mut packs = self.packs.write().unwrap();
        packs.retain(|slot| slot.pack.pack_id() != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrite_object::Blob;

    #[test]
    fn missing_object_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::open(dir.path().join("objects")).unwrap();
        let ghost = Oid::from_hex("e69de29bb2d1d6434b8b29ae775ad8c2e48c5391").unwrap();
        assert!(matches!(store.read(&ghost), Err(OdbError::Missing(_))));
        assert!(store.try_read(&ghost).unwrap().is_none());
    }

    #[test]
    fn type_hint_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::open(dir.path().join("objects")).unwrap();
        let oid = store
            .write(&Object::Blob(Blob::from_bytes("content")))
            .unwrap();

        assert!(store.open_object(&oid, Some(ObjectKind::Blob)).is_ok());
        assert!(matches!(
            store.open_object(&oid, Some(ObjectKind::Commit)),
            Err(OdbError::WrongKind {
                expected: ObjectKind::Commit,
                actual: ObjectKind::Blob,
                ..
            })
        ));
    }

    #[test]
    fn info_from_loose() {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::open(dir.path().join("objects")).unwrap();
        let oid = store
            .write(&Object::Blob(Blob::from_bytes("12345")))
            .unwrap();
        let info = store.info(&oid).unwrap();
        assert_eq!(info.kind, ObjectKind::Blob);
        assert_eq!(info.size, 5);
    }
}
