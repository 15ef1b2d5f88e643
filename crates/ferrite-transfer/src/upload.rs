//! The server half of fetch: upload-pack.

use std::io::{Read, Write};

use bstr::BString;
use ferrite_hash::{HashKind, Oid};
use ferrite_pack::write_pack;
use ferrite_wire::{Band, CapSet, Packet, PktReader, PktWriter, SideBandWriter};

use crate::hooks::Hooks;
use crate::{collect_closure, parse_oid_token, TransferError};

/// Capabilities this server advertises for fetch.
fn server_caps() -> CapSet {
    let mut caps = CapSet::new();
    caps.add("multi_ack")
        .add("thin-pack")
        .add("side-band")
        .add("side-band-64k")
        .add("ofs-delta")
        .add("include-tag")
        .add("agent=ferrite/0.2");
    caps
}

/// One upload-pack session over a byte channel.
pub struct UploadPack<'a> {
    repo: &'a ferrite_repo::Repository,
    hooks: Hooks,
}

impl<'a> UploadPack<'a> {
    pub fn new(repo: &'a ferrite_repo::Repository) -> Self {
        Self {
            repo,
            hooks: Hooks::none(),
        }
    }

    pub fn with_hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Phase 1: advertise refs (`info/refs` in smart HTTP).
    pub fn advertise(&self, output: impl Write) -> Result<(), TransferError> {
        let mut writer = PktWriter::new(output);
        let refs = self.advertised_refs()?;
        crate::write_advertisement(&mut writer, &refs, &server_caps())?;
        Ok(())
    }

    /// Phase 2: read wants and haves up to `done`, answer with ACK/NAK
    /// and the pack.
    pub fn serve(
        &mut self,
        input: impl Read,
        output: impl Write,
    ) -> Result<(), TransferError> {
        let mut reader = PktReader::new(input);
        let mut writer = PktWriter::new(output);

        // Wants section (up to the flush). The first want line carries
        // the client's capability choices.
        let mut wants: Vec<Oid> = Vec::new();
        let mut client_caps = CapSet::new();
        loop {
            match reader.read_packet()? {
                Packet::Flush => break,
                Packet::Data(line) => {
                    let text = String::from_utf8_lossy(&line);
                    let text = text.trim_end();
                    let rest = text.strip_prefix("want ").ok_or_else(|| {
                        TransferError::Protocol(format!("expected want, got: {text}"))
                    })?;
                    let (oid, caps_text) = parse_oid_token(rest)?;
                    if wants.is_empty() && !caps_text.is_empty() {
                        client_caps = CapSet::parse(caps_text);
                    }
                    wants.push(oid);
                }
                other => {
                    return Err(TransferError::Protocol(format!(
                        "unexpected packet in wants: {other:?}"
                    )))
                }
            }
        }
        if wants.is_empty() {
            // Nothing wanted: the session ends quietly (ls-remote).
            return Ok(());
        }

        // Haves, terminated by `done`. Stateless single round: every
        // have arrives before the pack is due.
        let multi_ack = client_caps.has("multi_ack");
        let mut common: Vec<Oid> = Vec::new();
        loop {
            match reader.read_packet()? {
                Packet::Flush => continue,
                Packet::Data(line) => {
                    let text = String::from_utf8_lossy(&line);
                    let text = text.trim_end();
                    if text == "done" {
                        break;
                    }
                    let rest = text.strip_prefix("have ").ok_or_else(|| {
                        TransferError::Protocol(format!("expected have, got: {text}"))
                    })?;
                    let (oid, _) = parse_oid_token(rest)?;
                    if self.repo.odb().contains(&oid) {
                        common.push(oid);
                        if multi_ack {
                            writer.write_text(&format!("ACK {} continue", oid.to_hex()))?;
                        }
                    }
                }
                other => {
                    return Err(TransferError::Protocol(format!(
                        "unexpected packet in haves: {other:?}"
                    )))
                }
            }
        }

        match common.last() {
            Some(last) => writer.write_text(&format!("ACK {}", last.to_hex()))?,
            None => writer.write_text("NAK")?,
        }

        // Pack phase, multiplexed when the client asked for side-band.
        let wide = client_caps.has("side-band-64k");
        let banded = wide || client_caps.has("side-band");

        let mut ctx = crate::HookContext::new();
        if let Some(hook) = self.hooks.pre_upload.as_mut() {
            hook(&mut ctx, &wants);
        }

        let planned = collect_closure(self.repo.odb(), &wants, &common)?;
        let mut pack_bytes = Vec::new();
        write_pack(&planned, &mut pack_bytes, HashKind::Sha1)?;

        if let Some(hook) = self.hooks.post_upload.as_mut() {
            hook(&mut ctx, &wants);
        }

        if banded {
            let mut band = SideBandWriter::new(&mut writer, wide);
            let progress = ctx.take();
            if !progress.is_empty() {
                band.write(Band::Progress, &progress)?;
            }
            band.write(
                Band::Progress,
                format!("Counting objects: {}, done.\n", planned.len()).as_bytes(),
            )?;
            band.write(Band::Data, &pack_bytes)?;
            band.finish()?;
        } else {
            writer.get_mut().write_all(&pack_bytes)?;
            writer.flush()?;
        }
        Ok(())
    }

    /// `HEAD` first (when resolvable), then every ref in name order.
    fn advertised_refs(&self) -> Result<Vec<(Oid, BString)>, TransferError> {
        let mut refs = Vec::new();
        if let Some(head) = self.repo.head()? {
            refs.push((head, BString::from("HEAD")));
        }
        for (name, oid) in self.repo.refs().iter(None)? {
            refs.push((oid, BString::from(name.as_str())));
        }
        Ok(refs)
    }
}
