//! Pkt-line: 4 hex digits of length (including the 4 themselves), then
//! payload. `0000` flush, `0001` delim, `0002` response-end; lengths 3
//! and below those specials are illegal.

use std::io::{Read, Write};

use crate::WireError;

/// Largest legal packet, header included.
pub const MAX_PKT_LEN: usize = 65520;
/// Largest payload: [`MAX_PKT_LEN`] minus the 4 header bytes.
pub const MAX_PKT_PAYLOAD: usize = MAX_PKT_LEN - 4;

/// One received packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Data(Vec<u8>),
    /// `0000` — section end.
    Flush,
    /// `0001` — protocol v2 section delimiter.
    Delim,
    /// `0002` — protocol v2 response end.
    ResponseEnd,
}

impl Packet {
    pub fn data(&self) -> Option<&[u8]> {
        match self {
            Packet::Data(data) => Some(data),
            _ => None,
        }
    }
}

/// Reads pkt-lines; never consumes a byte past the declared length.
pub struct PktReader<R> {
    inner: R,
}

impl<R: Read> PktReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// The next packet.
    pub fn read_packet(&mut self) -> Result<Packet, WireError> {
        let mut header = [0u8; 4];
        self.inner.read_exact(&mut header).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                WireError::UnexpectedEof
            } else {
                WireError::Io(e)
            }
        })?;

        let text = std::str::from_utf8(&header)
            .map_err(|_| WireError::BadPktLength(format!("{header:02x?}")))?;
        let length = usize::from_str_radix(text, 16)
            .map_err(|_| WireError::BadPktLength(text.into()))?;

        match length {
            0 => Ok(Packet::Flush),
            1 => Ok(Packet::Delim),
            2 => Ok(Packet::ResponseEnd),
            3 => Err(WireError::BadPktLength("0003".into())),
            _ if length > MAX_PKT_LEN => {
                Err(WireError::BadPktLength(format!("{length:#x}")))
            }
            _ => {
                let mut payload = vec![0u8; length - 4];
                self.inner.read_exact(&mut payload).map_err(|e| {
                    if e.kind() == std::io::ErrorKind::UnexpectedEof {
                        WireError::UnexpectedEof
                    } else {
                        WireError::Io(e)
                    }
                })?;
                Ok(Packet::Data(payload))
            }
        }
    }

    /// The next data payload, `None` on flush.
    pub fn read_data(&mut self) -> Result<Option<Vec<u8>>, WireError> {
        match self.read_packet()? {
            Packet::Data(data) => Ok(Some(data)),
            _ => Ok(None),
        }
    }

    /// Data packets up to (and consuming) the next flush.
    pub fn read_to_flush(&mut self) -> Result<Vec<Vec<u8>>, WireError> {
        let mut lines = Vec::new();
        while let Packet::Data(data) = self.read_packet()? {
            lines.push(data);
        }
        Ok(lines)
    }
}

/// Writes pkt-lines.
pub struct PktWriter<W> {
    inner: W,
}

impl<W: Write> PktWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    /// One data packet.
    pub fn write_data(&mut self, payload: &[u8]) -> Result<(), WireError> {
        if payload.len() > MAX_PKT_PAYLOAD {
            return Err(WireError::PayloadTooLong(payload.len()));
        }
        write!(self.inner, "{:04x}", payload.len() + 4)?;
        self.inner.write_all(payload)?;
        Ok(())
    }

    /// A textual line; a missing trailing newline is added.
    pub fn write_text(&mut self, line: &str) -> Result<(), WireError> {
        if line.ends_with('\n') {
            self.write_data(line.as_bytes())
        } else {
            let mut payload = Vec::with_capacity(line.len() + 1);
            payload.extend_from_slice(line.as_bytes());
            payload.push(b'\n');
            self.write_data(&payload)
        }
    }

    pub fn write_flush(&mut self) -> Result<(), WireError> {
        self.inner.write_all(b"0000")?;
        Ok(())
    }

    pub fn write_delim(&mut self) -> Result<(), WireError> {
        self.inner.write_all(b"0001")?;
        Ok(())
    }

    pub fn write_response_end(&mut self) -> Result<(), WireError> {
        self.inner.write_all(b"0002")?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), WireError> {
        self.inner.flush()?;
        Ok(())
    }
}
