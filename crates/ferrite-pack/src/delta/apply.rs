use super::read_varint;
use crate::PackError;

/// Reconstruct a target buffer from `base` and a delta stream.
///
/// Every copy is bounds-checked against the base and the output may never
/// exceed the declared result size; a delta that tries either is corrupt.
pub fn apply(base: &[u8], delta: &[u8]) -> Result<Vec<u8>, PackError> {
    let mut at = 0usize;

    let (base_size, used) = read_varint(delta).ok_or_else(|| bad(0, "truncated base size"))?;
    at += used;
    let (result_size, used) =
        read_varint(&delta[at..]).ok_or_else(|| bad(at, "truncated result size"))?;
    at += used;

    if base_size != base.len() {
        return Err(bad(
            0,
            &format!("base size {} != actual {}", base_size, base.len()),
        ));
    }

    let mut out = Vec::with_capacity(result_size);

    while at < delta.len() {
        let op = delta[at];
        at += 1;

        if op & 0x80 != 0 {
            let mut offset = 0usize;
            let mut len = 0usize;
            for (bit, shift) in [(0x01u8, 0u32), (0x02, 8), (0x04, 16), (0x08, 24)] {
                if op & bit != 0 {
                    let byte = *delta.get(at).ok_or_else(|| bad(at, "truncated copy offset"))?;
                    offset |= (byte as usize) << shift;
                    at += 1;
                }
            }
            for (bit, shift) in [(0x10u8, 0u32), (0x20, 8), (0x40, 16)] {
                if op & bit != 0 {
                    let byte = *delta.get(at).ok_or_else(|| bad(at, "truncated copy length"))?;
                    len |= (byte as usize) << shift;
                    at += 1;
                }
            }
            if len == 0 {
                len = 0x10000;
            }

            let end = offset
                .checked_add(len)
                .ok_or_else(|| bad(at, "copy overflow"))?;
            if end > base.len() {
                return Err(bad(
                    at,
                    &format!("copy {offset}+{len} past base of {}", base.len()),
                ));
            }
            if out.len() + len > result_size {
                return Err(bad(at, "copy exceeds declared result size"));
            }
            out.extend_from_slice(&base[offset..end]);
        } else if op != 0 {
            let len = op as usize;
            if at + len > delta.len() {
                return Err(bad(at, "truncated insert"));
            }
            if out.len() + len > result_size {
                return Err(bad(at, "insert exceeds declared result size"));
            }
            out.extend_from_slice(&delta[at..at + len]);
            at += len;
        } else {
            return Err(bad(at - 1, "reserved opcode 0"));
        }
    }

    if out.len() != result_size {
        return Err(bad(
            at,
            &format!("result size {} != declared {}", out.len(), result_size),
        ));
    }
    Ok(out)
}

fn bad(at: usize, reason: &str) -> PackError {
    PackError::BadDelta {
        at: at as u64,
        reason: reason.into(),
    }
}
