use crate::{IdError, Oid};

/// 256-entry cumulative-count table keyed by an id's first byte.
///
/// Entry `i` holds the number of ids whose first byte is `<= i`; pack
/// indexes use this to narrow a binary search to one bucket before
/// touching any id bytes.
#[derive(Debug, Clone)]
pub struct Fanout {
    counts: [u32; 256],
}

impl Fanout {
    /// Build from ids already sorted in id order. Order is not re-checked.
    pub fn build(sorted: &[Oid]) -> Self {
        let mut counts = [0u32; 256];
        for oid in sorted {
            counts[oid.first_byte() as usize] += 1;
        }
        for i in 1..256 {
            counts[i] += counts[i - 1];
        }
        Self { counts }
    }

    /// The index range of ids starting with `first_byte`.
    pub fn bucket(&self, first_byte: u8) -> std::ops::Range<usize> {
        let end = self.counts[first_byte as usize] as usize;
        let start = match first_byte {
            0 => 0,
            b => self.counts[(b - 1) as usize] as usize,
        };
        start..end
    }

    /// Total id count.
    pub fn total(&self) -> u32 {
        self.counts[255]
    }

    /// Decode from 1024 big-endian bytes, verifying monotonicity.
    pub fn from_bytes(data: &[u8]) -> Result<Self, IdError> {
        if data.len() < 1024 {
            return Err(IdError::FanoutTruncated(data.len()));
        }
        let mut counts = [0u32; 256];
        for (i, slot) in counts.iter_mut().enumerate() {
            let at = i * 4;
            *slot = u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]]);
        }
        for i in 1..256 {
            if counts[i] < counts[i - 1] {
                return Err(IdError::FanoutNotMonotonic {
                    index: i,
                    prev: counts[i - 1],
                    value: counts[i],
                });
            }
        }
        Ok(Self { counts })
    }

    /// Encode as 1024 big-endian bytes.
    pub fn to_bytes(&self) -> [u8; 1024] {
        let mut out = [0u8; 1024];
        for (i, count) in self.counts.iter().enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&count.to_be_bytes());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HashKind;

    fn oid(first: u8, last: u8) -> Oid {
        let mut raw = [0u8; 20];
        raw[0] = first;
        raw[19] = last;
        Oid::from_raw(&raw, HashKind::Sha1).unwrap()
    }

    #[test]
    fn buckets_cover_sorted_input() {
        let ids = vec![oid(0x00, 1), oid(0x00, 2), oid(0x03, 1), oid(0xfe, 1)];
        let fan = Fanout::build(&ids);
        assert_eq!(fan.total(), 4);
        assert_eq!(fan.bucket(0x00), 0..2);
        assert_eq!(fan.bucket(0x01), 2..2);
        assert_eq!(fan.bucket(0x03), 2..3);
        assert_eq!(fan.bucket(0xfe), 3..4);
        assert_eq!(fan.bucket(0xff), 4..4);
    }

    #[test]
    fn empty_fanout() {
        let fan = Fanout::build(&[]);
        assert_eq!(fan.total(), 0);
        assert!(fan.bucket(0x80).is_empty());
    }

    #[test]
    fn byte_round_trip() {
        let ids: Vec<Oid> = (0..=255u8).map(|b| oid(b, 0)).collect();
        let fan = Fanout::build(&ids);
        let bytes = fan.to_bytes();
        let back = Fanout::from_bytes(&bytes).unwrap();
        assert_eq!(fan.counts, back.counts);
    }

    #[test]
    fn truncated_rejected() {
        assert!(matches!(
            Fanout::from_bytes(&[0u8; 512]),
            Err(IdError::FanoutTruncated(512))
        ));
    }

    #[test]
    fn decreasing_rejected() {
        let mut bytes = [0u8; 1024];
        bytes[0..4].copy_from_slice(&5u32.to_be_bytes());
        bytes[4..8].copy_from_slice(&3u32.to_be_bytes());
        assert!(matches!(
            Fanout::from_bytes(&bytes),
            Err(IdError::FanoutNotMonotonic { index: 1, prev: 5, value: 3 })
        ));
    }
}
