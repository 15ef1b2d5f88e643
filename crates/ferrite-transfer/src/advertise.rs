//! The ref advertisement that opens every v0/v1 session.
//!
//! A pkt-line stream of `<id> <refname>` in ref-name order; the first
//! line carries a NUL and the capability list. An empty repository
//! advertises the zero id against the literal name `capabilities^{}`
//! so the capability list still has a line to ride on.

use std::io::{Read, Write};

use bstr::BString;
use ferrite_hash::Oid;
use ferrite_wire::{CapSet, Packet, PktReader, PktWriter, WireError};

use crate::TransferError;

/// A parsed advertisement.
#[derive(Debug, Clone)]
pub struct Advertised {
    /// `(id, refname)` pairs in advertisement order.
    pub refs: Vec<(Oid, BString)>,
    pub caps: CapSet,
}

impl Advertised {
    pub fn find(&self, refname: &str) -> Option<Oid> {
        self.refs
            .iter()
            .find(|(_, name)| name == refname)
            .map(|(oid, _)| *oid)
    }

    /// True when the remote has nothing (unborn HEAD, no refs).
    pub fn is_empty_repo(&self) -> bool {
        self.refs.is_empty()
    }
}

/// Write an advertisement for `refs` with `caps`.
pub fn write_advertisement(
    out: &mut PktWriter<impl Write>,
    refs: &[(Oid, BString)],
    caps: &CapSet,
) -> Result<(), WireError> {
    match refs.first() {
        None => {
            let line = format!(
                "{} capabilities^{{}}\0{}\n",
                Oid::ZERO_SHA1.to_hex(),
                caps.to_wire()
            );
            out.write_data(line.as_bytes())?;
        }
        Some((first_oid, first_name)) => {
            let mut line = Vec::new();
            line.extend_from_slice(first_oid.to_hex().as_bytes());
            line.push(b' ');
            line.extend_from_slice(first_name);
            line.push(0);
            line.extend_from_slice(caps.to_wire().as_bytes());
            line.push(b'\n');
            out.write_data(&line)?;

            for (oid, name) in &refs[1..] {
                let mut line = Vec::new();
                line.extend_from_slice(oid.to_hex().as_bytes());
                line.push(b' ');
                line.extend_from_slice(name);
                line.push(b'\n');
                out.write_data(&line)?;
            }
        }
    }
    out.write_flush()?;
    out.flush()
}

/// Parse an advertisement up to its flush packet.
pub fn parse_advertisement(
    input: &mut PktReader<impl Read>,
) -> Result<Advertised, TransferError> {
    let mut refs = Vec::new();
    let mut caps = CapSet::new();
    let mut first = true;

    loop {
        let line = match input.read_packet()? {
            Packet::Flush => break,
            Packet::Data(line) => line,
            other => {
                return Err(TransferError::Protocol(format!(
                    "unexpected packet in advertisement: {other:?}"
                )))
            }
        };

        let (payload, cap_text) = match line.iter().position(|&b| b == 0) {
            Some(nul) => (&line[..nul], Some(&line[nul + 1..])),
            None => (&line[..], None),
        };
        if let Some(cap_text) = cap_text {
            if !first {
                return Err(TransferError::Protocol(
                    "capability list after the first line".into(),
                ));
            }
            caps = CapSet::parse(String::from_utf8_lossy(cap_text).trim_end());
        }
        first = false;

        let text = String::from_utf8_lossy(payload);
        let text = text.trim_end();
        let (oid, name) = crate::parse_oid_token(text)?;
        if name == "capabilities^{}" && oid.is_zero() {
            continue; // empty-repository placeholder line
        }
        if name.is_empty() {
            return Err(TransferError::Protocol(format!("bad ref line: {text}")));
        }
        refs.push((oid, BString::from(name)));
    }

    Ok(Advertised { refs, caps })
}
