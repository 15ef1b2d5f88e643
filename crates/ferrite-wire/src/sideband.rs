//! Side-band multiplexing.
//!
//! Payloads gain a leading channel byte: 1 carries pack data, 2 carries
//! progress text, 3 carries one fatal error message. The small variant
//! caps packets at 1000 bytes total, `side-band-64k` at the pkt-line
//! maximum.

use std::io::{Read, Write};

use crate::pktline::{Packet, PktReader, PktWriter};
use crate::WireError;

/// Payload cap for the original `side-band` (1000 minus header and
/// channel byte).
pub const MAX_BAND_PAYLOAD: usize = 995;
/// Payload cap for `side-band-64k`.
pub const MAX_BAND_64K_PAYLOAD: usize = crate::MAX_PKT_PAYLOAD - 1;

/// The three channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    /// Channel 1: pack data.
    Data,
    /// Channel 2: progress text for the user.
    Progress,
    /// Channel 3: fatal error; the session is over.
    Error,
}

impl Band {
    pub fn code(self) -> u8 {
        match self {
            Band::Data => 1,
            Band::Progress => 2,
            Band::Error => 3,
        }
    }

    fn from_code(code: u8) -> Result<Self, WireError> {
        match code {
            1 => Ok(Band::Data),
            2 => Ok(Band::Progress),
            3 => Ok(Band::Error),
            other => Err(WireError::UnknownBand(other)),
        }
    }
}

/// Demultiplexer: yields data, routes progress to a callback, turns
/// channel 3 into an error.
pub struct SideBandReader<R> {
    packets: PktReader<R>,
    on_progress: Option<Box<dyn FnMut(&[u8]) + Send>>,
}

impl<R: Read> SideBandReader<R> {
    pub fn new(packets: PktReader<R>) -> Self {
        Self {
            packets,
            on_progress: None,
        }
    }

    /// Install a progress sink (band 2 text).
    pub fn on_progress(mut self, callback: Box<dyn FnMut(&[u8]) + Send>) -> Self {
        self.on_progress = Some(callback);
        self
    }

    /// Next chunk of channel-1 data; `None` once the section flushes.
    pub fn read_data(&mut self) -> Result<Option<Vec<u8>>, WireError> {
        loop {
            match self.packets.read_packet()? {
                Packet::Flush | Packet::Delim | Packet::ResponseEnd => return Ok(None),
                Packet::Data(payload) => {
                    if payload.is_empty() {
                        continue;
                    }
                    match Band::from_code(payload[0])? {
                        Band::Data => return Ok(Some(payload[1..].to_vec())),
                        Band::Progress => {
                            if let Some(sink) = self.on_progress.as_mut() {
                                sink(&payload[1..]);
                            }
                        }
                        Band::Error => {
                            return Err(WireError::RemoteFatal(
                                String::from_utf8_lossy(&payload[1..])
                                    .trim_end()
                                    .to_string(),
                            ))
                        }
                    }
                }
            }
        }
    }

    /// Concatenate all channel-1 data to the flush.
    pub fn read_all_data(&mut self) -> Result<Vec<u8>, WireError> {
        let mut out = Vec::new();
        while let Some(chunk) = self.read_data()? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    pub fn into_inner(self) -> PktReader<R> {
        self.packets
    }
}

/// Multiplexer side: frames writes onto one channel.
pub struct SideBandWriter<'a, W: Write> {
    packets: &'a mut PktWriter<W>,
    /// Per-packet payload cap (995 or 65515).
    max_payload: usize,
}

impl<'a, W: Write> SideBandWriter<'a, W> {
    pub fn new(packets: &'a mut PktWriter<W>, wide: bool) -> Self {
        Self {
            packets,
            max_payload: if wide {
                MAX_BAND_64K_PAYLOAD
            } else {
                MAX_BAND_PAYLOAD
            },
        }
    }

    /// Send `data` on `band`, splitting into as many packets as needed.
    pub fn write(&mut self, band: Band, data: &[u8]) -> Result<(), WireError> {
        for chunk in data.chunks(self.max_payload) {
            let mut payload = Vec::with_capacity(chunk.len() + 1);
            payload.push(band.code());
            payload.extend_from_slice(chunk);
            self.packets.write_data(&payload)?;
        }
        Ok(())
    }

    /// End the multiplexed section.
    pub fn finish(self) -> Result<(), WireError> {
        self.packets.write_flush()?;
        self.packets.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn mux(frames: &[(Band, &[u8])], wide: bool) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut packets = PktWriter::new(&mut buf);
            let mut writer = SideBandWriter::new(&mut packets, wide);
            for (band, data) in frames {
                writer.write(*band, data).unwrap();
            }
            writer.finish().unwrap();
        }
        buf
    }

    #[test]
    fn data_and_progress_demux() {
        let buf = mux(
            &[
                (Band::Progress, b"Counting objects: 3\n"),
                (Band::Data, b"PACKdata"),
                (Band::Progress, b"done.\n"),
                (Band::Data, b"more"),
            ],
            true,
        );

        let progress = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = std::sync::Arc::clone(&progress);
        let mut reader = SideBandReader::new(PktReader::new(Cursor::new(buf)))
            .on_progress(Box::new(move |text| {
                sink.lock().unwrap().push(String::from_utf8_lossy(text).to_string());
            }));

        let data = reader.read_all_data().unwrap();
        assert_eq!(data, b"PACKdatamore");
        assert_eq!(
            *progress.lock().unwrap(),
            vec!["Counting objects: 3\n", "done.\n"]
        );
    }

    #[test]
    fn band_three_is_fatal() {
        let buf = mux(&[(Band::Error, b"access denied\n")], true);
        let mut reader = SideBandReader::new(PktReader::new(Cursor::new(buf)));
        match reader.read_data() {
            Err(WireError::RemoteFatal(message)) => assert_eq!(message, "access denied"),
            other => panic!("expected RemoteFatal, got {other:?}"),
        }
    }

    #[test]
    fn narrow_band_splits_at_995() {
        let big = vec![b'z'; 2500];
        let buf = mux(&[(Band::Data, &big)], false);

        let mut packets = PktReader::new(Cursor::new(buf));
        let mut sizes = Vec::new();
        while let Packet::Data(payload) = packets.read_packet().unwrap() {
            assert!(payload.len() - 1 <= MAX_BAND_PAYLOAD);
            sizes.push(payload.len() - 1);
        }
        assert_eq!(sizes, vec![995, 995, 510]);
    }

    #[test]
    fn wide_band_fills_large_packets() {
        let big = vec![b'q'; MAX_BAND_64K_PAYLOAD + 10];
        let buf = mux(&[(Band::Data, &big)], true);

        let mut reader = SideBandReader::new(PktReader::new(Cursor::new(buf)));
        assert_eq!(reader.read_all_data().unwrap().len(), big.len());
    }

    #[test]
    fn unknown_channel_is_an_error() {
        let mut buf = Vec::new();
        PktWriter::new(&mut buf).write_data(&[9, b'x']).unwrap();
        buf.extend_from_slice(b"0000");
        let mut reader = SideBandReader::new(PktReader::new(Cursor::new(buf)));
        assert!(matches!(reader.read_data(), Err(WireError::UnknownBand(9))));
    }
}
