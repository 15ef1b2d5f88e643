//! Writing packs.
//!
//! `PackWriter` streams entries to any sink while hashing everything
//! written, so the trailing checksum (and the pack's final name) falls out
//! of the write itself. Entry order for generated packs is the
//! conventional one: commits, then trees, blobs and tags, which keeps
//! walkers reading mostly forward.

use std::collections::HashMap;
use std::io::Write;

use ferrite_hash::{HashKind, ObjectHasher, Oid};
use ferrite_object::ObjectKind;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::delta;
use crate::entry::{encode_entry_header, encode_ofs_offset};
use crate::index::IndexEntry;
use crate::{kind_code, PackError, PACK_MAGIC, PACK_VERSION};

/// An object scheduled for a pack, optionally as a delta.
#[derive(Debug, Clone)]
pub struct PlannedObject {
    pub oid: Oid,
    pub kind: ObjectKind,
    pub data: Vec<u8>,
    /// Delta against this base when set. A base outside the object set
    /// produces a REF_DELTA, i.e. a thin pack.
    pub delta_base: Option<Oid>,
}

/// Streaming pack writer.
pub struct PackWriter<W: Write> {
    out: W,
    hasher: ObjectHasher,
    written: u64,
    declared: u32,
    entries: u32,
    offsets: HashMap<Oid, u64>,
    crcs: Vec<IndexEntry>,
    hash: HashKind,
}

impl<W: Write> PackWriter<W> {
    /// Begin a pack of exactly `count` objects.
    pub fn new(out: W, count: u32, hash: HashKind) -> Result<Self, PackError> {
        let mut writer = Self {
            out,
            hasher: ObjectHasher::new(hash),
            written: 0,
            declared: count,
            entries: 0,
            offsets: HashMap::new(),
            crcs: Vec::with_capacity(count as usize),
            hash,
        };
        let mut header = Vec::with_capacity(12);
        header.extend_from_slice(PACK_MAGIC);
        header.extend_from_slice(&PACK_VERSION.to_be_bytes());
        header.extend_from_slice(&count.to_be_bytes());
        writer.emit(&header)?;
        Ok(writer)
    }

    /// Write a self-contained entry. Returns its offset.
    pub fn add_whole(&mut self, oid: Oid, kind: ObjectKind, payload: &[u8]) -> Result<u64, PackError> {
        let offset = self.written;
        let mut raw = encode_entry_header(kind_code(kind), payload.len() as u64);
        raw.extend_from_slice(&deflate(payload)?);
        self.finish_entry(oid, offset, &raw)
    }

    /// Write an OFS_DELTA against a base already in this pack.
    pub fn add_ofs_delta(
        &mut self,
        oid: Oid,
        base: &Oid,
        delta_stream: &[u8],
    ) -> Result<u64, PackError> {
        let base_offset = *self
            .offsets
            .get(base)
            .ok_or(PackError::MissingBase(*base))?;
        let offset = self.written;
        let mut raw = encode_entry_header(6, delta_stream.len() as u64);
        raw.extend_from_slice(&encode_ofs_offset(offset - base_offset));
        raw.extend_from_slice(&deflate(delta_stream)?);
        self.finish_entry(oid, offset, &raw)
    }

    /// Write a REF_DELTA; the base may live outside the pack (thin pack).
    pub fn add_ref_delta(
        &mut self,
        oid: Oid,
        base: &Oid,
        delta_stream: &[u8],
    ) -> Result<u64, PackError> {
        let offset = self.written;
        let mut raw = encode_entry_header(7, delta_stream.len() as u64);
        raw.extend_from_slice(base.as_bytes());
        raw.extend_from_slice(&deflate(delta_stream)?);
        self.finish_entry(oid, offset, &raw)
    }

    /// Write the trailing checksum. Returns it with the index rows and the
    /// total pack size in bytes.
    pub fn finish(mut self) -> Result<(Oid, Vec<IndexEntry>, u64), PackError> {
        if self.entries != self.declared {
            return Err(PackError::CountMismatch {
                declared: self.declared,
                found: self.entries,
            });
        }
        let checksum = self.hasher.finish()?;
        self.out.write_all(checksum.as_bytes())?;
        self.out.flush()?;
        let total = self.written + self.hash.raw_len() as u64;
        Ok((checksum, self.crcs, total))
    }

    fn finish_entry(&mut self, oid: Oid, offset: u64, raw: &[u8]) -> Result<u64, PackError> {
        self.emit(raw)?;
        let mut crc = crc32fast::Hasher::new();
        crc.update(raw);
        self.offsets.insert(oid, offset);
        self.crcs.push(IndexEntry {
            oid,
            offset,
            crc: crc.finalize(),
        });
        self.entries += 1;
        Ok(offset)
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<(), PackError> {
        self.out.write_all(bytes)?;
        self.hasher.update(bytes);
        self.written += bytes.len() as u64;
        Ok(())
    }
}

pub(crate) fn deflate(data: &[u8]) -> Result<Vec<u8>, PackError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Write a complete pack for `objects` in conventional order.
///
/// Objects with `delta_base` set are written as deltas: OFS_DELTA when the
/// base precedes them in the pack, REF_DELTA otherwise (thin). Returns
/// the checksum, index rows, and total byte size.
pub fn write_pack<W: Write>(
    objects: &[PlannedObject],
    out: W,
    hash: HashKind,
) -> Result<(Oid, Vec<IndexEntry>, u64), PackError> {
    let mut ordered: Vec<&PlannedObject> = objects.iter().collect();
    ordered.sort_by_key(|obj| match obj.kind {
        ObjectKind::Commit => 0,
        ObjectKind::Tree => 1,
        ObjectKind::Blob => 2,
        ObjectKind::Tag => 3,
    });

    let mut writer = PackWriter::new(out, ordered.len() as u32, hash)?;
    let in_pack: std::collections::HashSet<Oid> = objects.iter().map(|o| o.oid).collect();

    // Bases must precede their deltas for OFS encoding; two passes over
    // the ordered list get every in-pack base down first.
    let mut written: std::collections::HashSet<Oid> = std::collections::HashSet::new();
    let mut pending: Vec<&PlannedObject> = Vec::new();

    for obj in &ordered {
        match &obj.delta_base {
            None => {
                writer.add_whole(obj.oid, obj.kind, &obj.data)?;
                written.insert(obj.oid);
            }
            Some(base) if !in_pack.contains(base) => {
                // Thin delta against an object the receiver already has.
                let delta = &obj.data;
                writer.add_ref_delta(obj.oid, base, delta)?;
                written.insert(obj.oid);
            }
            Some(_) => pending.push(obj),
        }
    }
    for obj in pending {
        let base = obj.delta_base.as_ref().expect("pending implies base");
        if written.contains(base) {
            writer.add_ofs_delta(obj.oid, base, &obj.data)?;
        } else {
            writer.add_ref_delta(obj.oid, base, &obj.data)?;
        }
        written.insert(obj.oid);
    }

    writer.finish()
}

/// Plan a whole (non-delta) object.
pub fn plan_whole(oid: Oid, kind: ObjectKind, data: Vec<u8>) -> PlannedObject {
    PlannedObject {
        oid,
        kind,
        data,
        delta_base: None,
    }
}

/// Plan `target` as a delta against `base_data`.
pub fn plan_delta(
    oid: Oid,
    kind: ObjectKind,
    base: Oid,
    base_data: &[u8],
    target: &[u8],
) -> PlannedObject {
    PlannedObject {
        oid,
        kind,
        data: delta::compute(base_data, target),
        delta_base: Some(base),
    }
}
