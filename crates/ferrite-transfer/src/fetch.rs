//! The client half of fetch.

use std::io::Read;

use bstr::BString;
use ferrite_hash::{HashKind, Oid};
use ferrite_pack::IndexPack;
use ferrite_refs::RefName;
use ferrite_util::{NullMonitor, ProgressMonitor};
use ferrite_wire::{CapSet, Packet, PktReader, PktWriter, SideBandReader};

use crate::{Advertised, TransferError};

/// What a completed fetch did.
#[derive(Debug)]
pub struct FetchOutcome {
    /// Refs the remote advertised that we asked for, with their ids.
    pub ref_updates: Vec<(BString, Oid)>,
    /// Bytes of pack stream received (0 when already up to date).
    pub pack_size: u64,
    /// Objects delivered by the pack.
    pub new_objects: u32,
    /// Progress text the server sent on band 2, verbatim.
    pub messages: String,
}

/// A fetch against one advertisement, in the stateless one-round shape.
pub struct FetchClient<'a> {
    repo: &'a ferrite_repo::Repository,
}

impl<'a> FetchClient<'a> {
    pub fn new(repo: &'a ferrite_repo::Repository) -> Self {
        Self { repo }
    }

    fn client_caps(&self, server: &CapSet) -> CapSet {
        let mut caps = CapSet::new();
        if server.has("multi_ack") {
            caps.add("multi_ack");
        }
        if server.has("side-band-64k") {
            caps.add("side-band-64k");
        } else if server.has("side-band") {
            caps.add("side-band");
        }
        if server.has("ofs-delta") {
            caps.add("ofs-delta");
        }
        caps.add("agent=ferrite/0.2");
        caps
    }

    /// Which advertised tips we lack. Empty means up to date.
    pub fn select_wants(
        &self,
        advertised: &Advertised,
        wanted_refs: &[&str],
    ) -> Result<Vec<Oid>, TransferError> {
        let mut wants = Vec::new();
        for (oid, name) in &advertised.refs {
            if name == "HEAD" {
                continue;
            }
            let selected = wanted_refs.is_empty()
                || wanted_refs.iter().any(|w| name == *w);
            if selected && !self.repo.odb().contains(oid) && !wants.contains(oid) {
                wants.push(*oid);
            }
        }
        Ok(wants)
    }

    /// Serialize the complete request: wants, haves, `done`.
    pub fn write_request(
        &self,
        advertised: &Advertised,
        wants: &[Oid],
    ) -> Result<Vec<u8>, TransferError> {
        let mut buf = Vec::new();
        let mut writer = PktWriter::new(&mut buf);
        let caps = self.client_caps(&advertised.caps);

        for (i, want) in wants.iter().enumerate() {
            if i == 0 {
                writer.write_text(&format!("want {} {}", want.to_hex(), caps.to_wire()))?;
            } else {
                writer.write_text(&format!("want {}", want.to_hex()))?;
            }
        }
        writer.write_flush()?;

        for (_name, oid) in self.repo.refs().iter(None)? {
            writer.write_text(&format!("have {}", oid.to_hex()))?;
        }
        writer.write_text("done")?;
        Ok(buf)
    }

    /// Consume the server's response: ACK/NAK lines, then the pack,
    /// which installs into the local object store.
    pub fn read_response(
        &self,
        advertised: &Advertised,
        wanted_refs: &[&str],
        response: impl Read,
        monitor: &mut dyn ProgressMonitor,
    ) -> Result<FetchOutcome, TransferError> {
        let mut reader = PktReader::new(response);

        // Negotiation closes with a bare ACK <id> or NAK.
        loop {
            match reader.read_packet()? {
                Packet::Data(line) => {
                    let text = String::from_utf8_lossy(&line);
                    let text = text.trim_end();
                    if text == "NAK" || (text.starts_with("ACK ") && !text.ends_with("continue"))
                    {
                        break;
                    }
                    if text.starts_with("ACK ") {
                        continue;
                    }
                    return Err(TransferError::Protocol(format!(
                        "unexpected negotiation line: {text}"
                    )));
                }
                Packet::Flush => {
                    return Err(TransferError::Protocol(
                        "stream ended before negotiation finished".into(),
                    ))
                }
                other => {
                    return Err(TransferError::Protocol(format!(
                        "unexpected packet in negotiation: {other:?}"
                    )))
                }
            }
        }

        // The pack rides band 1; progress text collects for the caller.
        let progress = std::sync::Arc::new(std::sync::Mutex::new(String::new()));
        let sink = std::sync::Arc::clone(&progress);
        let mut demux = SideBandReader::new(reader).on_progress(Box::new(move |text| {
            sink.lock()
                .unwrap()
                .push_str(&String::from_utf8_lossy(text));
        }));
        let pack_bytes = demux.read_all_data()?;

        let mut outcome = FetchOutcome {
            ref_updates: Vec::new(),
            pack_size: pack_bytes.len() as u64,
            new_objects: 0,
            messages: String::new(),
        };

        if !pack_bytes.is_empty() {
            let ingested = IndexPack::new(HashKind::Sha1).run(
                pack_bytes.as_slice(),
                &self.repo.odb().pack_dir(),
                |oid| {
                    self.repo
                        .odb()
                        .open_object(oid, None)
                        .ok()
                        .map(|data| (data.kind, data.data))
                },
                monitor,
            )?;
            outcome.new_objects = ingested.object_count;
            self.repo.odb().refresh()?;
        }

        for (oid, name) in &advertised.refs {
            if name == "HEAD" {
                continue;
            }
            let selected =
                wanted_refs.is_empty() || wanted_refs.iter().any(|w| name == *w);
            if selected {
                outcome.ref_updates.push((name.clone(), *oid));
            }
        }

        outcome.messages = progress.lock().unwrap().clone();
        Ok(outcome)
    }

    /// Apply the fetched tips to local refs of the same names.
    pub fn update_refs(&self, outcome: &FetchOutcome) -> Result<(), TransferError> {
        for (name, oid) in &outcome.ref_updates {
            let name = RefName::new(name.to_string())
                .map_err(|e| TransferError::Protocol(e.to_string()))?;
            self.repo
                .refs()
                .update(name, *oid)
                .force(true)
                .apply()?;
        }
        Ok(())
    }

    /// Convenience: full round against in-memory request/response pairs.
    pub fn fetch_round(
        &self,
        advertised: &Advertised,
        wanted_refs: &[&str],
        serve: impl FnOnce(&[u8]) -> Result<Vec<u8>, TransferError>,
    ) -> Result<FetchOutcome, TransferError> {
        let wants = self.select_wants(advertised, wanted_refs)?;
        if wants.is_empty() {
            return Ok(FetchOutcome {
                ref_updates: Vec::new(),
                pack_size: 0,
                new_objects: 0,
                messages: String::new(),
            });
        }
        let request = self.write_request(advertised, &wants)?;
        let response = serve(&request)?;
        let outcome =
            self.read_response(advertised, wanted_refs, response.as_slice(), &mut NullMonitor)?;
        self.update_refs(&outcome)?;
        Ok(outcome)
    }
}
