//! Wire framing: pkt-line, side-band, capabilities.
//!
//! Everything here is byte-exact against the git protocol documents; a
//! change in any constant breaks interoperability with the wider git
//! ecosystem.

mod caps;
mod pktline;
mod sideband;

pub use caps::CapSet;
pub use pktline::{Packet, PktReader, PktWriter, MAX_PKT_LEN, MAX_PKT_PAYLOAD};
pub use sideband::{Band, SideBandReader, SideBandWriter, MAX_BAND_64K_PAYLOAD, MAX_BAND_PAYLOAD};

/// Errors of the framing layer.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("bad pkt-line length: {0}")]
    BadPktLength(String),

    #[error("pkt-line payload of {0} bytes exceeds the maximum")]
    PayloadTooLong(usize),

    #[error("unexpected end of stream while reading a pkt-line")]
    UnexpectedEof,

    #[error("unknown side-band channel {0}")]
    UnknownBand(u8),

    #[error("remote error: {0}")]
    RemoteFatal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
