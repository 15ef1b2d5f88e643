/// Errors raised by identity handling.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IdError {
    #[error("invalid hex digit {byte:#04x} at position {pos}")]
    BadHexDigit { byte: u8, pos: usize },

    #[error("hex string of length {0} matches no hash kind")]
    BadHexLength(usize),

    #[error("raw id of length {actual}, expected {expected}")]
    BadRawLength { expected: usize, actual: usize },

    #[error("abbreviation of {0} nibbles is out of range")]
    BadAbbrevLength(usize),

    #[error("SHA-1 collision attack detected while hashing")]
    Collision,

    #[error("fan-out table entry {index} decreases ({prev} -> {value})")]
    FanoutNotMonotonic { index: usize, prev: u32, value: u32 },

    #[error("fan-out table truncated: {0} bytes")]
    FanoutTruncated(usize),
}
