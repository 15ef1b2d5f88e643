/// The hash function an object id was produced with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashKind {
    /// 160-bit SHA-1, git's legacy format.
    #[default]
    Sha1,
    /// 256-bit SHA-256, the extended object format.
    Sha256,
}

impl HashKind {
    /// Digest width in bytes (20 or 32).
    pub const fn raw_len(self) -> usize {
        match self {
            HashKind::Sha1 => 20,
            HashKind::Sha256 => 32,
        }
    }

    /// Hex width in characters (40 or 64).
    pub const fn hex_len(self) -> usize {
        self.raw_len() * 2
    }

    /// Infer the kind from a hex string length.
    pub fn from_hex_len(len: usize) -> Option<Self> {
        match len {
            40 => Some(HashKind::Sha1),
            64 => Some(HashKind::Sha256),
            _ => None,
        }
    }

    /// Infer the kind from a raw digest length.
    pub fn from_raw_len(len: usize) -> Option<Self> {
        match len {
            20 => Some(HashKind::Sha1),
            32 => Some(HashKind::Sha256),
            _ => None,
        }
    }
}

impl std::fmt::Display for HashKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            HashKind::Sha1 => "sha1",
            HashKind::Sha256 => "sha256",
        })
    }
}
