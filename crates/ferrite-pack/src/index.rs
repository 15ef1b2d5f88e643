//! Pack index (v2) reading and writing.
//!
//! Layout: `\xfftOc` + version, 256-entry fan-out, sorted ids, CRC32 per
//! entry, 31-bit offsets (high bit redirects into a 64-bit table for packs
//! past 2 GiB), then the pack checksum and the index's own checksum.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use ferrite_hash::{Fanout, HashKind, ObjectHasher, Oid, ShortId};
use memmap2::Mmap;

use crate::{PackError, IDX_MAGIC, IDX_VERSION};

/// One `(id, pack offset, entry crc)` row of an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    pub oid: Oid,
    pub offset: u64,
    pub crc: u32,
}

/// A memory-mapped v2 pack index.
pub struct PackIndex {
    data: Mmap,
    count: u32,
    fanout: Fanout,
    oid_base: usize,
    crc_base: usize,
    off_base: usize,
    off64_base: usize,
    path: PathBuf,
    hash: HashKind,
}

impl PackIndex {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PackError> {
        let path = path.as_ref().to_path_buf();
        let file = std::fs::File::open(&path)?;
        let data = unsafe { Mmap::map(&file)? };
        let hash = HashKind::Sha1;
        let id_len = hash.raw_len();

        if data.len() < 8 + 1024 + 2 * id_len {
            return Err(PackError::BadIndex("file too small".into()));
        }
        if data[0..4] != IDX_MAGIC {
            return Err(PackError::BadIndex("bad magic".into()));
        }
        let version = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        if version != IDX_VERSION {
            return Err(PackError::BadIndex(format!("unsupported version {version}")));
        }

        let fanout = Fanout::from_bytes(&data[8..8 + 1024])
            .map_err(|e| PackError::BadIndex(e.to_string()))?;
        let count = fanout.total();
        let n = count as usize;

        let oid_base = 8 + 1024;
        let crc_base = oid_base + n * id_len;
        let off_base = crc_base + n * 4;
        let off64_base = off_base + n * 4;

        if data.len() < off64_base + 2 * id_len {
            return Err(PackError::BadIndex(format!(
                "file of {} bytes cannot hold {} entries",
                data.len(),
                count
            )));
        }

        Ok(Self {
            data,
            count,
            fanout,
            oid_base,
            crc_base,
            off_base,
            off64_base,
            path,
            hash,
        })
    }

    pub fn len(&self) -> u32 {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pack offset of `oid`, or `None` when this pack lacks it.
    pub fn offset_of(&self, oid: &Oid) -> Option<u64> {
        self.position_of(oid).map(|pos| self.offset_at(pos))
    }

    /// Sorted position of `oid` within the id table.
    pub fn position_of(&self, oid: &Oid) -> Option<u32> {
        let bucket = self.fanout.bucket(oid.first_byte());
        let target = oid.as_bytes();
        let (mut lo, mut hi) = (bucket.start, bucket.end);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.oid_bytes(mid).cmp(target) {
                Ordering::Less => lo = mid + 1,
                Ordering::Greater => hi = mid,
                Ordering::Equal => return Some(mid as u32),
            }
        }
        None
    }

    /// All ids matching an abbreviation, in sorted order.
    pub fn matches_of(&self, short: &ShortId) -> Vec<Oid> {
        let bucket = self.fanout.bucket(short.first_byte());
        let mut out = Vec::new();
        for pos in bucket {
            let oid = self.oid_at(pos as u32);
            match short.prefix_cmp(&oid) {
                Ordering::Less => break,
                Ordering::Equal => out.push(oid),
                Ordering::Greater => {}
            }
        }
        out
    }

    pub fn oid_at(&self, pos: u32) -> Oid {
        Oid::from_raw(self.oid_bytes(pos as usize), self.hash).expect("index id width")
    }

    pub fn crc_at(&self, pos: u32) -> u32 {
        let at = self.crc_base + pos as usize * 4;
        u32::from_be_bytes(self.data[at..at + 4].try_into().unwrap())
    }

    pub fn offset_at(&self, pos: u32) -> u64 {
        let at = self.off_base + pos as usize * 4;
        let raw = u32::from_be_bytes(self.data[at..at + 4].try_into().unwrap());
        if raw & 0x8000_0000 == 0 {
            return u64::from(raw);
        }
        let large = (raw & 0x7fff_ffff) as usize;
        let at64 = self.off64_base + large * 8;
        u64::from_be_bytes(self.data[at64..at64 + 8].try_into().unwrap())
    }

    /// Checksum of the pack this index describes.
    pub fn pack_checksum(&self) -> Oid {
        let id_len = self.hash.raw_len();
        let at = self.data.len() - 2 * id_len;
        Oid::from_raw(&self.data[at..at + id_len], self.hash).expect("trailer width")
    }

    /// Iterate `(oid, offset)` in id order.
    pub fn iter(&self) -> impl Iterator<Item = (Oid, u64)> + '_ {
        (0..self.count).map(|pos| (self.oid_at(pos), self.offset_at(pos)))
    }

    fn oid_bytes(&self, pos: usize) -> &[u8] {
        let id_len = self.hash.raw_len();
        let at = self.oid_base + pos * id_len;
        &self.data[at..at + id_len]
    }
}

/// Serialize a v2 index for `entries` (sorted internally) and the given
/// pack checksum. Returns the full file bytes including both trailers.
pub fn write_index(entries: &[IndexEntry], pack_checksum: &Oid) -> Result<Vec<u8>, PackError> {
    let mut sorted: Vec<IndexEntry> = entries.to_vec();
    sorted.sort_by(|a, b| a.oid.cmp(&b.oid));

    let mut out = Vec::with_capacity(8 + 1024 + sorted.len() * 28 + 40);
    out.extend_from_slice(&IDX_MAGIC);
    out.extend_from_slice(&IDX_VERSION.to_be_bytes());

    let oids: Vec<Oid> = sorted.iter().map(|e| e.oid).collect();
    out.extend_from_slice(&Fanout::build(&oids).to_bytes());

    for entry in &sorted {
        out.extend_from_slice(entry.oid.as_bytes());
    }
    for entry in &sorted {
        out.extend_from_slice(&entry.crc.to_be_bytes());
    }

    let mut large: Vec<u64> = Vec::new();
    for entry in &sorted {
        if entry.offset < 0x8000_0000 {
            out.extend_from_slice(&(entry.offset as u32).to_be_bytes());
        } else {
            let slot = 0x8000_0000u32 | large.len() as u32;
            out.extend_from_slice(&slot.to_be_bytes());
            large.push(entry.offset);
        }
    }
    for offset in large {
        out.extend_from_slice(&offset.to_be_bytes());
    }

    out.extend_from_slice(pack_checksum.as_bytes());
    let own = ObjectHasher::digest(pack_checksum.kind(), &out)?;
    out.extend_from_slice(own.as_bytes());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(first: u8, last: u8) -> Oid {
        let mut raw = [0u8; 20];
        raw[0] = first;
        raw[19] = last;
        Oid::from_raw(&raw, HashKind::Sha1).unwrap()
    }

    fn open_written(entries: &[IndexEntry]) -> (tempfile::TempDir, PackIndex) {
        let dir = tempfile::tempdir().unwrap();
        let bytes = write_index(entries, &oid(0xaa, 0xbb)).unwrap();
        let path = dir.path().join("pack-test.idx");
        std::fs::write(&path, bytes).unwrap();
        let idx = PackIndex::open(&path).unwrap();
        (dir, idx)
    }

    #[test]
    fn lookup_present_and_absent() {
        let entries = [
            IndexEntry { oid: oid(0x02, 1), offset: 12, crc: 0x11 },
            IndexEntry { oid: oid(0x02, 2), offset: 300, crc: 0x22 },
            IndexEntry { oid: oid(0xf0, 1), offset: 4096, crc: 0x33 },
        ];
        let (_dir, idx) = open_written(&entries);

        assert_eq!(idx.len(), 3);
        for entry in &entries {
            assert_eq!(idx.offset_of(&entry.oid), Some(entry.offset));
        }
        assert_eq!(idx.offset_of(&oid(0x02, 3)), None);
        assert_eq!(idx.offset_of(&oid(0x55, 0)), None);
    }

    #[test]
    fn crc_table_preserved() {
        let entries = [
            IndexEntry { oid: oid(0x10, 1), offset: 50, crc: 0xdead_beef },
            IndexEntry { oid: oid(0x20, 1), offset: 90, crc: 0xcafe_f00d },
        ];
        let (_dir, idx) = open_written(&entries);
        let pos0 = idx.position_of(&oid(0x10, 1)).unwrap();
        let pos1 = idx.position_of(&oid(0x20, 1)).unwrap();
        assert_eq!(idx.crc_at(pos0), 0xdead_beef);
        assert_eq!(idx.crc_at(pos1), 0xcafe_f00d);
    }

    #[test]
    fn large_offsets_use_the_64_bit_table() {
        let big = 3 * (1u64 << 31); // past the 31-bit boundary
        let entries = [
            IndexEntry { oid: oid(0x01, 1), offset: 10, crc: 0 },
            IndexEntry { oid: oid(0x02, 1), offset: big, crc: 0 },
            IndexEntry { oid: oid(0x03, 1), offset: (1 << 31) - 1, crc: 0 },
        ];
        let (_dir, idx) = open_written(&entries);
        assert_eq!(idx.offset_of(&oid(0x02, 1)), Some(big));
        assert_eq!(idx.offset_of(&oid(0x03, 1)), Some((1 << 31) - 1));
        assert_eq!(idx.offset_of(&oid(0x01, 1)), Some(10));
    }

    #[test]
    fn abbreviation_matches() {
        let entries = [
            IndexEntry { oid: oid(0xab, 1), offset: 1, crc: 0 },
            IndexEntry { oid: oid(0xab, 2), offset: 2, crc: 0 },
            IndexEntry { oid: oid(0xac, 1), offset: 3, crc: 0 },
        ];
        let (_dir, idx) = open_written(&entries);
        let short = ShortId::from_hex("ab").unwrap();
        assert_eq!(idx.matches_of(&short).len(), 2);

        let exact = ShortId::from_oid(&oid(0xab, 1), 40).unwrap();
        assert_eq!(idx.matches_of(&exact), vec![oid(0xab, 1)]);

        let missing = ShortId::from_hex("dd00").unwrap();
        assert!(idx.matches_of(&missing).is_empty());
    }

    #[test]
    fn empty_index_round_trips() {
        let (_dir, idx) = open_written(&[]);
        assert!(idx.is_empty());
        assert_eq!(idx.iter().count(), 0);
        assert_eq!(idx.offset_of(&oid(0, 0)), None);
    }

    #[test]
    fn iteration_is_id_sorted() {
        let entries = [
            IndexEntry { oid: oid(0x90, 0), offset: 3, crc: 0 },
            IndexEntry { oid: oid(0x10, 0), offset: 1, crc: 0 },
            IndexEntry { oid: oid(0x50, 0), offset: 2, crc: 0 },
        ];
        let (_dir, idx) = open_written(&entries);
        let offsets: Vec<u64> = idx.iter().map(|(_, off)| off).collect();
        assert_eq!(offsets, vec![1, 2, 3]);
    }

    #[test]
    fn garbage_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.idx");
        std::fs::write(&path, b"not an index").unwrap();
        assert!(matches!(PackIndex::open(&path), Err(PackError::BadIndex(_))));
    }

    #[test]
    fn pack_checksum_read_back() {
        let (_dir, idx) = open_written(&[IndexEntry { oid: oid(1, 1), offset: 9, crc: 0 }]);
        assert_eq!(idx.pack_checksum(), oid(0xaa, 0xbb));
    }
}
