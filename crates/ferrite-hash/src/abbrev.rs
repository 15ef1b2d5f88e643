use std::cmp::Ordering;
use std::fmt;

use crate::{hex, IdError, Oid};

/// An abbreviated object id: a prefix of `nibbles` hex digits.
///
/// Stored as packed digest bytes; for an odd nibble count the low half of
/// the last byte is zero and excluded from comparisons.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ShortId {
    bytes: [u8; 32],
    nibbles: usize,
}

impl ShortId {
    /// Parse a hex prefix of 2 to 64 nibbles.
    pub fn from_hex(s: &str) -> Result<Self, IdError> {
        let input = s.as_bytes();
        if input.len() < 2 || input.len() > 64 {
            return Err(IdError::BadAbbrevLength(input.len()));
        }
        let mut bytes = [0u8; 32];
        for (i, &b) in input.iter().enumerate() {
            let digit = hex::digit(b, i)?;
            if i % 2 == 0 {
                bytes[i / 2] |= digit << 4;
            } else {
                bytes[i / 2] |= digit;
            }
        }
        Ok(Self {
            bytes,
            nibbles: input.len(),
        })
    }

    /// Abbreviate a full id to its first `nibbles` digits.
    pub fn from_oid(oid: &Oid, nibbles: usize) -> Result<Self, IdError> {
        if nibbles < 2 || nibbles > oid.kind().hex_len() {
            return Err(IdError::BadAbbrevLength(nibbles));
        }
        let mut bytes = [0u8; 32];
        let full = (nibbles + 1) / 2;
        bytes[..full].copy_from_slice(&oid.as_bytes()[..full]);
        if nibbles % 2 == 1 {
            bytes[full - 1] &= 0xf0;
        }
        Ok(Self { bytes, nibbles })
    }

    /// Number of hex digits in this abbreviation.
    pub fn len(&self) -> usize {
        self.nibbles
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// The fan-out bucket this prefix starts in.
    pub fn first_byte(&self) -> u8 {
        self.bytes[0]
    }

    /// Three-way comparison against a full id.
    ///
    /// Returns `Equal` iff `oid` begins with this prefix; otherwise orders
    /// the prefix against the id, which lets binary searches narrow onto
    /// the candidate range.
    pub fn prefix_cmp(&self, oid: &Oid) -> Ordering {
        let full = self.nibbles / 2;
        let target = oid.as_bytes();

        match self.bytes[..full].cmp(&target[..full.min(target.len())]) {
            Ordering::Equal => {}
            other => return other,
        }
        if self.nibbles % 2 == 1 {
            let mine = self.bytes[full] >> 4;
            let theirs = target.get(full).copied().unwrap_or(0) >> 4;
            return mine.cmp(&theirs);
        }
        Ordering::Equal
    }

    /// Does `oid` begin with this prefix?
    pub fn matches(&self, oid: &Oid) -> bool {
        self.prefix_cmp(oid) == Ordering::Equal
    }

    pub fn to_hex(&self) -> String {
        let full = hex::encode(&self.bytes[..(self.nibbles + 1) / 2]);
        full[..self.nibbles].to_string()
    }
}

impl fmt::Display for ShortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ShortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ShortId({})", self.to_hex())
    }
}

impl std::str::FromStr for ShortId {
    type Err = IdError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391";

    #[test]
    fn prefix_matches_own_oid() {
        let oid = Oid::from_hex(FULL).unwrap();
        for n in [2, 3, 7, 12, 40] {
            let short = ShortId::from_oid(&oid, n).unwrap();
            assert!(short.matches(&oid), "nibbles={n}");
            assert_eq!(short.to_hex(), &FULL[..n]);
        }
    }

    #[test]
    fn parse_round_trip() {
        let short: ShortId = "e69de2".parse().unwrap();
        assert_eq!(short.len(), 6);
        assert_eq!(short.to_hex(), "e69de2");
        assert_eq!(short.first_byte(), 0xe6);
    }

    #[test]
    fn odd_length_prefix() {
        let oid = Oid::from_hex(FULL).unwrap();
        let short = ShortId::from_hex("e69de29bb").unwrap();
        assert_eq!(short.len(), 9);
        assert!(short.matches(&oid));
        assert_eq!(short.to_hex(), "e69de29bb");
    }

    #[test]
    fn mismatch_orders_correctly() {
        let oid = Oid::from_hex(FULL).unwrap();
        let below = ShortId::from_hex("e69dd0").unwrap();
        let above = ShortId::from_hex("e69df0").unwrap();
        assert_eq!(below.prefix_cmp(&oid), Ordering::Less);
        assert_eq!(above.prefix_cmp(&oid), Ordering::Greater);
        assert!(!below.matches(&oid));
    }

    #[test]
    fn odd_nibble_mismatch_in_last_digit() {
        let oid = Oid::from_hex(FULL).unwrap();
        // FULL starts e69de29bb2...; "e69de29bb3" shares 9 digits, differs in the 10th,
        // so the 9-digit truncation still matches but the 10-digit one must not.
        let nine = ShortId::from_hex("e69de29bb").unwrap();
        let ten = ShortId::from_hex("e69de29bb3").unwrap();
        assert!(nine.matches(&oid));
        assert!(!ten.matches(&oid));
    }

    #[test]
    fn length_bounds_enforced() {
        assert!(ShortId::from_hex("e").is_err());
        assert!(ShortId::from_hex(&"f".repeat(65)).is_err());
        let oid = Oid::from_hex(FULL).unwrap();
        assert!(ShortId::from_oid(&oid, 41).is_err());
        assert!(ShortId::from_oid(&oid, 1).is_err());
    }
}
