use crate::{HashKind, IdError, Oid};

enum Inner {
    Sha1(Box<sha1_checked::Sha1>),
    Sha256(sha2::Sha256),
}

/// Streaming object hasher.
///
/// SHA-1 runs with collision detection (the SHAttered defense); a detected
/// collision attack surfaces as [`IdError::Collision`] instead of a bogus
/// id. Feed data incrementally or through the `std::io::Write` impl.
pub struct ObjectHasher {
    inner: Inner,
}

impl ObjectHasher {
    pub fn new(kind: HashKind) -> Self {
        use digest::Digest;
        let inner = match kind {
            HashKind::Sha1 => Inner::Sha1(Box::new(sha1_checked::Sha1::new())),
            HashKind::Sha256 => Inner::Sha256(sha2::Sha256::new()),
        };
        Self { inner }
    }

    pub fn update(&mut self, data: &[u8]) {
        use digest::Digest;
        match &mut self.inner {
            Inner::Sha1(h) => h.update(data),
            Inner::Sha256(h) => h.update(data),
        }
    }

    pub fn finish(self) -> Result<Oid, IdError> {
        match self.inner {
            Inner::Sha1(h) => {
                let out = h.try_finalize();
                if out.has_collision() {
                    return Err(IdError::Collision);
                }
                let mut bytes = [0u8; 20];
                bytes.copy_from_slice(out.hash().as_slice());
                Ok(Oid::Sha1(bytes))
            }
            Inner::Sha256(h) => {
                use digest::Digest;
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(h.finalize().as_slice());
                Ok(Oid::Sha256(bytes))
            }
        }
    }

    /// Hash a complete buffer in one call.
    pub fn digest(kind: HashKind, data: &[u8]) -> Result<Oid, IdError> {
        let mut h = Self::new(kind);
        h.update(data);
        h.finish()
    }

    /// Hash a git object: `"<kind> <size>\0"` followed by the payload.
    pub fn object_id(kind: HashKind, obj_kind: &str, payload: &[u8]) -> Result<Oid, IdError> {
        let mut h = Self::new(kind);
        h.update(obj_kind.as_bytes());
        h.update(b" ");
        h.update(payload.len().to_string().as_bytes());
        h.update(b"\0");
        h.update(payload);
        h.finish()
    }
}

impl std::io::Write for ObjectHasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
