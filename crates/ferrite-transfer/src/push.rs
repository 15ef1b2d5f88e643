//! The client half of push.

use std::io::Read;

use ferrite_hash::{HashKind, Oid};
use ferrite_pack::write_pack;
use ferrite_refs::RefName;
use ferrite_wire::{CapSet, PktReader, PktWriter, SideBandReader};

use crate::{collect_closure, Advertised, TransferError};

/// One ref the push wants to move.
#[derive(Debug, Clone)]
pub struct PushedRef {
    pub name: RefName,
    /// `None` deletes the remote ref.
    pub new: Option<Oid>,
}

/// Per-ref result from the remote's report-status.
#[derive(Debug)]
pub struct PushOutcome {
    pub unpack_ok: bool,
    /// `(refname, Ok | Err(reason))` in report order.
    pub ref_status: Vec<(String, Result<(), String>)>,
    /// Band-2 text from the server (hook output), verbatim.
    pub messages: String,
}

impl PushOutcome {
    pub fn all_ok(&self) -> bool {
        self.unpack_ok && self.ref_status.iter().all(|(_, s)| s.is_ok())
    }
}

/// A push against one advertisement, in the stateless one-round shape.
pub struct PushClient<'a> {
    repo: &'a ferrite_repo::Repository,
    atomic: bool,
}

impl<'a> PushClient<'a> {
    pub fn new(repo: &'a ferrite_repo::Repository) -> Self {
        Self {
            repo,
            atomic: false,
        }
    }

    /// Ask the server for all-or-nothing application.
    pub fn atomic(mut self, atomic: bool) -> Self {
        self.atomic = atomic;
        self
    }

    fn client_caps(&self, server: &CapSet) -> CapSet {
        let mut caps = CapSet::new();
        if server.has("report-status") {
            caps.add("report-status");
        }
        if server.has("side-band-64k") {
            caps.add("side-band-64k");
        }
        if server.has("delete-refs") {
            caps.add("delete-refs");
        }
        if self.atomic && server.has("atomic") {
            caps.add("atomic");
        }
        caps.add("agent=ferrite/0.2");
        caps
    }

    /// Serialize the full request: commands, then the pack of objects
    /// the remote is missing.
    pub fn write_request(
        &self,
        advertised: &Advertised,
        updates: &[PushedRef],
    ) -> Result<Vec<u8>, TransferError> {
        if updates.is_empty() {
            return Err(TransferError::PushRejected("nothing to push".into()));
        }

        let mut buf = Vec::new();
        let mut writer = PktWriter::new(&mut buf);
        let caps = self.client_caps(&advertised.caps);

        for (i, update) in updates.iter().enumerate() {
            let old = advertised
                .find(update.name.as_str())
                .unwrap_or(Oid::ZERO_SHA1);
            let new = update.new.unwrap_or(Oid::ZERO_SHA1);
            let line = format!("{} {} {}", old.to_hex(), new.to_hex(), update.name);
            if i == 0 {
                let mut payload = line.into_bytes();
                payload.push(0);
                payload.extend_from_slice(caps.to_wire().as_bytes());
                payload.push(b'\n');
                writer.write_data(&payload)?;
            } else {
                writer.write_text(&line)?;
            }
        }
        writer.write_flush()?;

        // Objects newly reachable from the pushed tips, minus what the
        // remote advertises (its tips stand in for its whole history).
        let wants: Vec<Oid> = updates.iter().filter_map(|u| u.new).collect();
        if !wants.is_empty() {
            let haves: Vec<Oid> = advertised
                .refs
                .iter()
                .map(|(oid, _)| *oid)
                .filter(|oid| self.repo.odb().contains(oid))
                .collect();
            let planned = collect_closure(self.repo.odb(), &wants, &haves)?;
            write_pack(&planned, writer.get_mut(), HashKind::Sha1)?;
        }
        Ok(buf)
    }

    /// Parse the server's report-status response.
    pub fn read_response(&self, response: impl Read) -> Result<PushOutcome, TransferError> {
        let reader = PktReader::new(response);
        let progress = std::sync::Arc::new(std::sync::Mutex::new(String::new()));
        let sink = std::sync::Arc::clone(&progress);
        let mut demux = SideBandReader::new(reader).on_progress(Box::new(move |text| {
            sink.lock()
                .unwrap()
                .push_str(&String::from_utf8_lossy(text));
        }));
        let report = demux.read_all_data()?;

        let mut outcome = PushOutcome {
            unpack_ok: false,
            ref_status: Vec::new(),
            messages: String::new(),
        };

        let mut lines = PktReader::new(report.as_slice());
        for line in lines.read_to_flush()? {
            let text = String::from_utf8_lossy(&line);
            let text = text.trim_end();
            if let Some(rest) = text.strip_prefix("unpack ") {
                outcome.unpack_ok = rest == "ok";
            } else if let Some(rest) = text.strip_prefix("ok ") {
                outcome.ref_status.push((rest.to_string(), Ok(())));
            } else if let Some(rest) = text.strip_prefix("ng ") {
                let (name, reason) = rest.split_once(' ').unwrap_or((rest, "rejected"));
                outcome
                    .ref_status
                    .push((name.to_string(), Err(reason.to_string())));
            }
        }

        outcome.messages = progress.lock().unwrap().clone();
        Ok(outcome)
    }

    /// Convenience: full round against an in-memory serving closure.
    pub fn push_round(
        &self,
        advertised: &Advertised,
        updates: &[PushedRef],
        serve: impl FnOnce(&[u8]) -> Result<Vec<u8>, TransferError>,
    ) -> Result<PushOutcome, TransferError> {
        let request = self.write_request(advertised, updates)?;
        let response = serve(&request)?;
        self.read_response(response.as_slice())
    }
}
