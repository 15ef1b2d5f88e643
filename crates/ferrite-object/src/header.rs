//! The `"<kind> <size>\0"` object header.

use crate::{ObjectError, ObjectKind};

/// Parse a header, returning `(kind, payload size, header length)`.
pub fn parse(data: &[u8]) -> Result<(ObjectKind, usize, usize), ObjectError> {
    let nul = data
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| ObjectError::BadHeader("missing NUL".into()))?;
    let space = data[..nul]
        .iter()
        .position(|&b| b == b' ')
        .ok_or_else(|| ObjectError::BadHeader("missing space".into()))?;

    let kind = ObjectKind::from_bytes(&data[..space])?;
    let size_str = std::str::from_utf8(&data[space + 1..nul])
        .map_err(|_| ObjectError::BadHeader("size is not ASCII".into()))?;
    if size_str.len() > 1 && size_str.starts_with('0') {
        return Err(ObjectError::BadHeader(format!(
            "size has leading zero: {size_str}"
        )));
    }
    let size: usize = size_str
        .parse()
        .map_err(|_| ObjectError::BadHeader(format!("bad size: {size_str}")))?;

    Ok((kind, size, nul + 1))
}

/// Encode a header.
pub fn write(kind: ObjectKind, size: usize) -> Vec<u8> {
    format!("{} {}\0", kind, size).into_bytes()
}
