use std::fmt;
use std::str::FromStr;

use crate::hex;
use crate::{HashKind, IdError};

/// A git object id: the hash of an object's canonical serialization.
///
/// Equality is byte equality; ordering is unsigned lexicographic byte
/// order, which is the order pack indexes and `packed-refs` use. The first
/// byte doubles as the fan-out discriminator.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Oid {
    Sha1([u8; 20]),
    Sha256([u8; 32]),
}

impl Oid {
    /// The all-zero id, used on the wire for "no such object".
    pub const ZERO_SHA1: Self = Self::Sha1([0u8; 20]);
    pub const ZERO_SHA256: Self = Self::Sha256([0u8; 32]);

    /// The zero id of the given kind.
    pub fn zero(kind: HashKind) -> Self {
        match kind {
            HashKind::Sha1 => Self::ZERO_SHA1,
            HashKind::Sha256 => Self::ZERO_SHA256,
        }
    }

    /// Wrap raw digest bytes of the given kind.
    pub fn from_raw(raw: &[u8], kind: HashKind) -> Result<Self, IdError> {
        if raw.len() != kind.raw_len() {
            return Err(IdError::BadRawLength {
                expected: kind.raw_len(),
                actual: raw.len(),
            });
        }
        Ok(match kind {
            HashKind::Sha1 => {
                let mut bytes = [0u8; 20];
                bytes.copy_from_slice(raw);
                Self::Sha1(bytes)
            }
            HashKind::Sha256 => {
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(raw);
                Self::Sha256(bytes)
            }
        })
    }

    /// Parse a full hex id; the kind is inferred from the length.
    pub fn from_hex(s: &str) -> Result<Self, IdError> {
        let kind = HashKind::from_hex_len(s.len()).ok_or(IdError::BadHexLength(s.len()))?;
        match kind {
            HashKind::Sha1 => {
                let mut bytes = [0u8; 20];
                hex::decode(s, &mut bytes)?;
                Ok(Self::Sha1(bytes))
            }
            HashKind::Sha256 => {
                let mut bytes = [0u8; 32];
                hex::decode(s, &mut bytes)?;
                Ok(Self::Sha256(bytes))
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Sha1(b) => b,
            Self::Sha256(b) => b,
        }
    }

    pub fn kind(&self) -> HashKind {
        match self {
            Self::Sha1(_) => HashKind::Sha1,
            Self::Sha256(_) => HashKind::Sha256,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.as_bytes().iter().all(|&b| b == 0)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    /// Fan-out discriminator: the first digest byte.
    pub fn first_byte(&self) -> u8 {
        self.as_bytes()[0]
    }

    /// Relative path of the loose object file: `"xx/yyyy…"`.
    pub fn loose_path(&self) -> String {
        let hex = self.to_hex();
        format!("{}/{}", &hex[..2], &hex[2..])
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Oid({})", &self.to_hex()[..8])
    }
}

impl FromStr for Oid {
    type Err = IdError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const EMPTY_BLOB: &str = "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391";
    const SHA256_EMPTY: &str = "473a0f4c3be8a93681a267e3b1e9a7dcda1185436fe141f7749120a303721813";

    #[test]
    fn hex_round_trip() {
        let oid = Oid::from_hex(EMPTY_BLOB).unwrap();
        assert_eq!(oid.kind(), HashKind::Sha1);
        assert_eq!(oid.to_hex(), EMPTY_BLOB);
        assert_eq!(EMPTY_BLOB.parse::<Oid>().unwrap(), oid);
    }

    #[test]
    fn sha256_round_trip() {
        let oid = Oid::from_hex(SHA256_EMPTY).unwrap();
        assert_eq!(oid.kind(), HashKind::Sha256);
        assert_eq!(oid.to_hex(), SHA256_EMPTY);
    }

    #[test]
    fn ordering_is_unsigned_lex() {
        let a = Oid::from_hex("00ffffffffffffffffffffffffffffffffffffff").unwrap();
        let b = Oid::from_hex("0100000000000000000000000000000000000000").unwrap();
        let c = Oid::from_hex("ff00000000000000000000000000000000000000").unwrap();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn usable_as_map_key() {
        let oid = Oid::from_hex(EMPTY_BLOB).unwrap();
        let mut map = HashMap::new();
        map.insert(oid, 1);
        assert_eq!(map.get(&oid), Some(&1));
    }

    #[test]
    fn zero_detection() {
        assert!(Oid::ZERO_SHA1.is_zero());
        assert!(Oid::zero(HashKind::Sha256).is_zero());
        assert!(!Oid::from_hex(EMPTY_BLOB).unwrap().is_zero());
    }

    #[test]
    fn raw_length_enforced() {
        let err = Oid::from_raw(&[0u8; 19], HashKind::Sha1).unwrap_err();
        assert_eq!(
            err,
            IdError::BadRawLength {
                expected: 20,
                actual: 19
            }
        );
    }

    #[test]
    fn loose_path_splits_first_byte() {
        let oid = Oid::from_hex(EMPTY_BLOB).unwrap();
        assert_eq!(oid.loose_path(), format!("e6/{}", &EMPTY_BLOB[2..]));
        assert_eq!(oid.first_byte(), 0xe6);
    }

    #[test]
    fn debug_is_abbreviated() {
        let oid = Oid::from_hex(EMPTY_BLOB).unwrap();
        assert_eq!(format!("{:?}", oid), "Oid(e69de29b)");
    }
}
