//! Reading objects out of a `.pack` file.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use ferrite_hash::{HashKind, ObjectHasher, Oid};
use ferrite_object::ObjectKind;
use flate2::read::ZlibDecoder;
use memmap2::Mmap;

use crate::entry::{EntryHeader, PackEntryKind};
use crate::window::{next_pack_id, DeltaBaseCache, WindowCache, WINDOW_SIZE};
use crate::{PackError, MAX_DELTA_DEPTH, PACK_HEADER_LEN, PACK_MAGIC};

/// How pack bytes are brought into memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadStrategy {
    /// Map the whole file; cheapest on 64-bit hosts.
    #[default]
    Mmap,
    /// Pull fixed windows through the shared [`WindowCache`]; bounded
    /// address space, used for very large packs or constrained hosts.
    Streamed,
}

/// A fully reconstructed object out of a pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedObject {
    pub kind: ObjectKind,
    pub data: Vec<u8>,
}

enum Source {
    Mmap(Mmap),
    Streamed {
        file: Mutex<File>,
        cache: Arc<WindowCache>,
    },
}

/// An open pack plus its index.
pub struct Pack {
    source: Source,
    len: u64,
    pack_id: u64,
    index: crate::PackIndex,
    count: u32,
    hash: HashKind,
    path: PathBuf,
    base_cache: Arc<DeltaBaseCache>,
    /// Monotonic access stamp; the object store prefers the hottest pack.
    last_access: AtomicU64,
    trailer: OnceLock<Result<(), (String, String)>>,
}

static ACCESS_CLOCK: AtomicU64 = AtomicU64::new(1);

impl Pack {
    /// Open `<name>.pack` (with its `.idx` beside it) using mmap.
    pub fn open(pack_path: impl AsRef<Path>) -> Result<Self, PackError> {
        Self::open_with(
            pack_path,
            ReadStrategy::Mmap,
            WindowCache::new(crate::window::DEFAULT_WINDOW_BUDGET),
            DeltaBaseCache::new(crate::window::DEFAULT_BASE_BUDGET),
        )
    }

    /// Open with an explicit strategy and shared caches.
    pub fn open_with(
        pack_path: impl AsRef<Path>,
        strategy: ReadStrategy,
        windows: Arc<WindowCache>,
        bases: Arc<DeltaBaseCache>,
    ) -> Result<Self, PackError> {
        let path = pack_path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let len = file.metadata()?.len();

        let source = match strategy {
            ReadStrategy::Mmap => Source::Mmap(unsafe { Mmap::map(&file)? }),
            ReadStrategy::Streamed => Source::Streamed {
                file: Mutex::new(file),
                cache: windows,
            },
        };

        let hash = HashKind::Sha1;
        if len < (PACK_HEADER_LEN + hash.raw_len()) as u64 {
            return Err(PackError::BadHeader("file too small".into()));
        }

        let mut pack = Self {
            source,
            len,
            pack_id: next_pack_id(),
            index: crate::PackIndex::open(path.with_extension("idx"))?,
            count: 0,
            hash,
            path,
            base_cache: bases,
            last_access: AtomicU64::new(0),
            trailer: OnceLock::new(),
        };

        let mut header = [0u8; PACK_HEADER_LEN];
        pack.read_exact_at(0, &mut header)?;
        if &header[0..4] != PACK_MAGIC {
            return Err(PackError::BadHeader("bad magic".into()));
        }
        let version = u32::from_be_bytes(header[4..8].try_into().unwrap());
        if version != 2 && version != 3 {
            return Err(PackError::BadVersion(version));
        }
        pack.count = u32::from_be_bytes(header[8..12].try_into().unwrap());

        if pack.index.len() != pack.count {
            return Err(PackError::BadHeader(format!(
                "pack holds {} objects, index lists {}",
                pack.count,
                pack.index.len()
            )));
        }

        Ok(pack)
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn index(&self) -> &crate::PackIndex {
        &self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pack_id(&self) -> u64 {
        self.pack_id
    }

    /// Total file size in bytes, trailer included.
    pub fn len_bytes(&self) -> u64 {
        self.len
    }

    pub fn contains(&self, oid: &Oid) -> bool {
        self.index.offset_of(oid).is_some()
    }

    /// Stamp of the most recent read; higher means hotter.
    pub fn recency(&self) -> u64 {
        self.last_access.load(Ordering::Relaxed)
    }

    /// Read an object by id. `Ok(None)` when this pack lacks it.
    pub fn read(&self, oid: &Oid) -> Result<Option<PackedObject>, PackError> {
        match self.index.offset_of(oid) {
            Some(offset) => self.read_at(offset).map(Some),
            None => Ok(None),
        }
    }

    /// Read an object by id, resolving foreign REF_DELTA bases through
    /// `resolve` (the thin-pack escape hatch).
    pub fn read_resolving(
        &self,
        oid: &Oid,
        resolve: impl Fn(&Oid) -> Option<(ObjectKind, Vec<u8>)>,
    ) -> Result<Option<PackedObject>, PackError> {
        match self.index.offset_of(oid) {
            Some(offset) => self.read_at_resolving(offset, resolve).map(Some),
            None => Ok(None),
        }
    }

    /// Read the object stored at a pack offset.
    pub fn read_at(&self, offset: u64) -> Result<PackedObject, PackError> {
        self.read_at_resolving(offset, |_| None)
    }

    /// Type and inflated size at `offset` without reconstructing deltas
    /// beyond the one entry.
    pub fn info_at(&self, offset: u64) -> Result<(ObjectKind, u64), PackError> {
        self.touch();
        let mut at = offset;
        for _ in 0..MAX_DELTA_DEPTH {
            let header = self.entry_header(at)?;
            match header.kind {
                PackEntryKind::Whole(kind) => {
                    if at == offset {
                        return Ok((kind, header.inflated_size));
                    }
                    // Delta chain: the size is the outermost delta's declared
                    // result size.
                    let delta = self.entry_data(offset)?;
                    let mut cursor = 0;
                    let (_, used) = crate::delta::read_varint(&delta).ok_or(
                        PackError::BadDelta {
                            at: offset,
                            reason: "truncated base size".into(),
                        },
                    )?;
                    cursor += used;
                    let (result, _) = crate::delta::read_varint(&delta[cursor..]).ok_or(
                        PackError::BadDelta {
                            at: offset,
                            reason: "truncated result size".into(),
                        },
                    )?;
                    return Ok((kind, result as u64));
                }
                PackEntryKind::OfsDelta { back } => at -= back,
                PackEntryKind::RefDelta { base } => match self.index.offset_of(&base) {
                    Some(base_at) => at = base_at,
                    None => return Err(PackError::MissingBase(base)),
                },
            }
        }
        Err(PackError::DeltaTooDeep {
            at: offset,
            max: MAX_DELTA_DEPTH,
        })
    }

    fn read_at_resolving(
        &self,
        offset: u64,
        resolve: impl Fn(&Oid) -> Option<(ObjectKind, Vec<u8>)>,
    ) -> Result<PackedObject, PackError> {
        self.touch();
        self.check_trailer()?;

        // Collect the delta chain outermost-first, stopping at a whole
        // object, a cached base, or an externally resolved thin base.
        let mut chain: Vec<(u64, Vec<u8>)> = Vec::new();
        let mut at = offset;

        // `data_at` tracks which pack entry the current `data` buffer
        // reconstructs; `None` for a base fetched outside this pack.
        let (base_kind, base_data, mut data_at) = loop {
            if chain.len() > MAX_DELTA_DEPTH {
                return Err(PackError::DeltaTooDeep {
                    at: offset,
                    max: MAX_DELTA_DEPTH,
                });
            }
            if !chain.is_empty() {
                if let Some(hit) = self.base_cache.get(self.pack_id, at) {
                    break (hit.0, hit.1.clone(), Some(at));
                }
            }

            let header = self.entry_header(at)?;
            let data = self.entry_data_checked(at, &header)?;
            match header.kind {
                PackEntryKind::Whole(kind) => break (kind, data, Some(at)),
                PackEntryKind::OfsDelta { back } => {
                    let base_at = at - back;
                    chain.push((at, data));
                    at = base_at;
                }
                PackEntryKind::RefDelta { base } => {
                    chain.push((at, data));
                    match self.index.offset_of(&base) {
                        Some(base_at) => at = base_at,
                        None => match resolve(&base) {
                            Some((kind, bytes)) => break (kind, bytes, None),
                            None => return Err(PackError::MissingBase(base)),
                        },
                    }
                }
            }
        };

        // Apply innermost-first. Before each application `data` is the
        // reconstruction of the entry at `data_at`, which is worth caching
        // for the next reader of the same chain.
        let kind = base_kind;
        let mut data = base_data;
        for (entry_at, delta) in chain.iter().rev() {
            if let Some(base_at) = data_at {
                self.base_cache.put(self.pack_id, base_at, kind, data.clone());
            }
            data = crate::delta::apply(&data, delta)?;
            data_at = Some(*entry_at);
        }

        Ok(PackedObject { kind, data })
    }

    /// The entry header at a pack offset.
    pub(crate) fn entry_header(&self, offset: u64) -> Result<EntryHeader, PackError> {
        let mut reader = SourceReader {
            pack: self,
            pos: offset,
        };
        EntryHeader::read(&mut reader, offset, self.hash)
    }

    /// Inflate one entry's data stream (for a delta entry: the delta).
    pub(crate) fn entry_data(&self, offset: u64) -> Result<Vec<u8>, PackError> {
        let header = self.entry_header(offset)?;
        self.entry_data_checked(offset, &header)
    }

    fn entry_data_checked(
        &self,
        offset: u64,
        header: &EntryHeader,
    ) -> Result<Vec<u8>, PackError> {
        let reader = SourceReader {
            pack: self,
            pos: offset + header.header_len as u64,
        };
        let mut decoder = ZlibDecoder::new(reader);
        let mut data = Vec::with_capacity(header.inflated_size as usize);
        decoder
            .read_to_end(&mut data)
            .map_err(|_| PackError::CorruptEntry(offset))?;
        if data.len() as u64 != header.inflated_size {
            return Err(PackError::CorruptEntry(offset));
        }
        Ok(data)
    }

    /// Verify the trailing checksum once per open pack.
    fn check_trailer(&self) -> Result<(), PackError> {
        let outcome = self.trailer.get_or_init(|| {
            let id_len = self.hash.raw_len();
            let body_len = self.len - id_len as u64;

            let mut hasher = ObjectHasher::new(self.hash);
            let mut buf = vec![0u8; 64 * 1024];
            let mut at = 0u64;
            while at < body_len {
                let want = ((body_len - at) as usize).min(buf.len());
                if self.read_exact_at(at, &mut buf[..want]).is_err() {
                    return Err(("<unreadable>".into(), "<unreadable>".into()));
                }
                hasher.update(&buf[..want]);
                at += want as u64;
            }
            let computed = match hasher.finish() {
                Ok(oid) => oid,
                Err(_) => return Err(("<collision>".into(), "<collision>".into())),
            };

            let mut stored = vec![0u8; id_len];
            if self.read_exact_at(body_len, &mut stored).is_err() {
                return Err(("<unreadable>".into(), "<unreadable>".into()));
            }
            if computed.as_bytes() == stored.as_slice() {
                Ok(())
            } else {
                Err((
                    ferrite_hash::hex::encode(&stored),
                    computed.to_hex(),
                ))
            }
        });

        match outcome {
            Ok(()) => Ok(()),
            Err((stored, computed)) => Err(PackError::ChecksumMismatch {
                stored: stored.clone(),
                computed: computed.clone(),
            }),
        }
    }

    fn touch(&self) {
        let stamp = ACCESS_CLOCK.fetch_add(1, Ordering::Relaxed);
        self.last_access.store(stamp, Ordering::Relaxed);
    }

    /// Copy bytes at an absolute offset, spanning windows when streamed.
    pub(crate) fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), PackError> {
        if offset + buf.len() as u64 > self.len {
            return Err(PackError::CorruptEntry(offset));
        }
        match &self.source {
            Source::Mmap(map) => {
                let at = offset as usize;
                buf.copy_from_slice(&map[at..at + buf.len()]);
                Ok(())
            }
            Source::Streamed { .. } => {
                let mut done = 0usize;
                while done < buf.len() {
                    let at = offset + done as u64;
                    let window = self.window_holding(at)?;
                    let in_window = (at % WINDOW_SIZE as u64) as usize;
                    let take = (window.len() - in_window).min(buf.len() - done);
                    buf[done..done + take]
                        .copy_from_slice(&window[in_window..in_window + take]);
                    done += take;
                }
                Ok(())
            }
        }
    }

    /// Fetch (or load and cache) the window containing `offset`.
    fn window_holding(&self, offset: u64) -> Result<Arc<Vec<u8>>, PackError> {
        let Source::Streamed { file, cache } = &self.source else {
            unreachable!("window_holding is only called for streamed packs");
        };
        let ordinal = offset / WINDOW_SIZE as u64;
        if let Some(window) = cache.get(self.pack_id, ordinal) {
            return Ok(window);
        }

        let start = ordinal * WINDOW_SIZE as u64;
        let want = ((self.len - start) as usize).min(WINDOW_SIZE);
        let mut bytes = vec![0u8; want];
        {
            let mut file = file.lock().unwrap();
            file.seek(SeekFrom::Start(start))?;
            file.read_exact(&mut bytes)?;
        }
        let window = Arc::new(bytes);
        cache.put(self.pack_id, ordinal, Arc::clone(&window));
        Ok(window)
    }
}

/// `Read` adapter over a pack's byte source.
struct SourceReader<'a> {
    pack: &'a Pack,
    pos: u64,
}

impl Read for SourceReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = self.pack.len.saturating_sub(self.pos);
        if remaining == 0 {
            return Ok(0);
        }
        let want = (buf.len() as u64).min(remaining) as usize;
        self.pack
            .read_exact_at(self.pos, &mut buf[..want])
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        self.pos += want as u64;
        Ok(want)
    }
}
