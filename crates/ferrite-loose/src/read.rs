use std::fs;
use std::io::Read;

use flate2::read::ZlibDecoder;
use ferrite_hash::{ObjectHasher, Oid};
use ferrite_object::{header, Object, ObjectKind};

use crate::{LooseError, LooseStore};

/// Type and size read from a loose object without inflating the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LooseHeader {
    pub kind: ObjectKind,
    pub size: usize,
}

impl LooseStore {
    /// Does a loose file exist for this id?
    pub fn contains(&self, oid: &Oid) -> bool {
        self.path_for(oid).is_file()
    }

    /// Read and parse a loose object. `Ok(None)` when absent.
    pub fn read(&self, oid: &Oid) -> Result<Option<Object>, LooseError> {
        let Some(raw) = self.read_raw(oid)? else {
            return Ok(None);
        };
        let (_, declared, header_len) = header::parse(&raw)?;
        if raw.len() - header_len != declared {
            return Err(LooseError::Corrupt {
                oid: oid.to_hex(),
                reason: format!(
                    "size header says {declared}, payload is {}",
                    raw.len() - header_len
                ),
            });
        }
        Ok(Some(Object::parse(&raw)?))
    }

    /// Read a loose object and confirm it hashes to its own id.
    pub fn read_verified(&self, oid: &Oid) -> Result<Option<Object>, LooseError> {
        let Some(raw) = self.read_raw(oid)? else {
            return Ok(None);
        };
        let actual = ObjectHasher::digest(self.hash(), &raw)?;
        if actual != *oid {
            return Err(LooseError::IdMismatch {
                path: self.path_for(oid),
                expected: oid.to_hex(),
                actual: actual.to_hex(),
            });
        }
        Ok(Some(Object::parse(&raw)?))
    }

    /// Read only the header, inflating just enough bytes to find the NUL.
    pub fn read_header(&self, oid: &Oid) -> Result<Option<LooseHeader>, LooseError> {
        let compressed = match fs::read(self.path_for(oid)) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut decoder = ZlibDecoder::new(compressed.as_slice());
        let mut buf = [0u8; 64];
        let mut filled = 0;
        loop {
            if filled == buf.len() {
                return Err(LooseError::Corrupt {
                    oid: oid.to_hex(),
                    reason: "header longer than 64 bytes".into(),
                });
            }
            let n = decoder
                .read(&mut buf[filled..])
                .map_err(|e| LooseError::Inflate {
                    oid: oid.to_hex(),
                    source: e,
                })?;
            if n == 0 {
                return Err(LooseError::Corrupt {
                    oid: oid.to_hex(),
                    reason: "EOF before header NUL".into(),
                });
            }
            filled += n;
            if buf[..filled].contains(&0) {
                break;
            }
        }

        let (kind, size, _) = header::parse(&buf[..filled])?;
        Ok(Some(LooseHeader { kind, size }))
    }

    /// Inflate the raw serialization (header + payload).
    fn read_raw(&self, oid: &Oid) -> Result<Option<Vec<u8>>, LooseError> {
        let compressed = match fs::read(self.path_for(oid)) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let mut decoder = ZlibDecoder::new(compressed.as_slice());
        let mut raw = Vec::new();
        decoder
            .read_to_end(&mut raw)
            .map_err(|e| LooseError::Inflate {
                oid: oid.to_hex(),
                source: e,
            })?;
        Ok(Some(raw))
    }
}
