//! Pack entry headers.
//!
//! Each entry starts with a byte holding a continuation bit, a 3-bit type
//! code and the low 4 bits of the inflated size; continuation bytes add 7
//! size bits each. `OFS_DELTA` entries follow with a big-endian base-128
//! back-offset (the `+1` shifted encoding), `REF_DELTA` with the raw base
//! id.

use std::io::Read;

use ferrite_hash::{HashKind, Oid};
use ferrite_object::ObjectKind;

use crate::{code_kind, PackError};

/// Kind of a single pack entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackEntryKind {
    /// Self-contained object of the given kind.
    Whole(ObjectKind),
    /// Delta whose base lives `back` bytes before this entry.
    OfsDelta { back: u64 },
    /// Delta whose base is named by id (possibly outside this pack).
    RefDelta { base: Oid },
}

/// Decoded entry header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryHeader {
    pub kind: PackEntryKind,
    /// Inflated size of this entry's data (for a delta: the delta stream).
    pub inflated_size: u64,
    /// Bytes consumed by the header itself.
    pub header_len: usize,
}

impl EntryHeader {
    /// Read an entry header from a byte stream positioned at the entry.
    pub fn read(reader: &mut impl Read, at: u64, hash: HashKind) -> Result<Self, PackError> {
        let mut header_len = 0usize;
        let first = read_byte(reader, at, &mut header_len)?;

        let type_code = (first >> 4) & 0x07;
        let mut size = u64::from(first & 0x0f);
        let mut shift = 4;
        let mut byte = first;
        while byte & 0x80 != 0 {
            byte = read_byte(reader, at, &mut header_len)?;
            if shift > 57 {
                return Err(PackError::CorruptEntry(at));
            }
            size |= u64::from(byte & 0x7f) << shift;
            shift += 7;
        }

        let kind = match type_code {
            6 => {
                let mut byte = read_byte(reader, at, &mut header_len)?;
                let mut back = u64::from(byte & 0x7f);
                while byte & 0x80 != 0 {
                    byte = read_byte(reader, at, &mut header_len)?;
                    back = back
                        .checked_add(1)
                        .and_then(|b| b.checked_shl(7))
                        .map(|b| b | u64::from(byte & 0x7f))
                        .ok_or(PackError::CorruptEntry(at))?;
                }
                if back == 0 || back > at {
                    return Err(PackError::CorruptEntry(at));
                }
                PackEntryKind::OfsDelta { back }
            }
            7 => {
                let mut raw = vec![0u8; hash.raw_len()];
                reader
                    .read_exact(&mut raw)
                    .map_err(|_| PackError::CorruptEntry(at))?;
                header_len += raw.len();
                PackEntryKind::RefDelta {
                    base: Oid::from_raw(&raw, hash)?,
                }
            }
            code => match code_kind(code) {
                Some(kind) => PackEntryKind::Whole(kind),
                None => return Err(PackError::CorruptEntry(at)),
            },
        };

        Ok(Self {
            kind,
            inflated_size: size,
            header_len,
        })
    }
}

fn read_byte(reader: &mut impl Read, at: u64, consumed: &mut usize) -> Result<u8, PackError> {
    let mut buf = [0u8; 1];
    reader
        .read_exact(&mut buf)
        .map_err(|_| PackError::CorruptEntry(at))?;
    *consumed += 1;
    Ok(buf[0])
}

/// Encode the type + size prefix of an entry header.
pub fn encode_entry_header(type_code: u8, inflated_size: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(10);
    let mut size = inflated_size;
    let mut byte = (type_code << 4) | (size & 0x0f) as u8;
    size >>= 4;
    while size > 0 {
        out.push(byte | 0x80);
        byte = (size & 0x7f) as u8;
        size >>= 7;
    }
    out.push(byte);
    out
}

/// Encode an `OFS_DELTA` back-offset.
pub fn encode_ofs_offset(back: u64) -> Vec<u8> {
    let mut bytes = vec![(back & 0x7f) as u8];
    let mut rest = back >> 7;
    while rest > 0 {
        rest -= 1;
        bytes.push(0x80 | (rest & 0x7f) as u8);
        rest >>= 7;
    }
    bytes.reverse();
    bytes
}
