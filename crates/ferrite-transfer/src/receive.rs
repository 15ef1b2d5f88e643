//! The server half of push: receive-pack.

use std::io::{Read, Write};

use bstr::BString;
use ferrite_hash::{HashKind, Oid};
use ferrite_pack::IndexPack;
use ferrite_refs::{RefEdit, RefEditKind, RefName, Transaction, UpdateOutcome};
use ferrite_util::NullMonitor;
use ferrite_wire::{Band, CapSet, Packet, PktReader, PktWriter, SideBandWriter};

use crate::hooks::{HookContext, Hooks, RefCommand, RefCommandKind};
use crate::{parse_oid_token, TransferError};

fn server_caps() -> CapSet {
    let mut caps = CapSet::new();
    caps.add("report-status")
        .add("delete-refs")
        .add("side-band-64k")
        .add("ofs-delta")
        .add("atomic")
        .add("agent=ferrite/0.2");
    caps
}

/// Per-command result as reported to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandStatus {
    Ok,
    Rejected(String),
}

/// What a receive session did.
#[derive(Debug)]
pub struct ReceiveOutcome {
    /// Commands with their final status, in arrival order.
    pub commands: Vec<(RefCommand, CommandStatus)>,
    /// Exact size of the received pack stream, when one was sent.
    pub pack_size: Option<u64>,
}

/// One receive-pack session.
pub struct ReceivePack<'a> {
    repo: &'a ferrite_repo::Repository,
    hooks: Hooks,
}

impl<'a> ReceivePack<'a> {
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

    /// Phase 1: advertise current refs.
    pub fn advertise(&self, output: impl Write) -> Result<(), TransferError> {
        let mut writer = PktWriter::new(output);
        let mut refs: Vec<(Oid, BString)> = Vec::new();
        for (name, oid) in self.repo.refs().iter(None)? {
            refs.push((oid, BString::from(name.as_str())));
        }
        crate::write_advertisement(&mut writer, &refs, &server_caps())?;
        Ok(())
    }

    /// Phase 2: read commands and pack, verify, run hooks, update refs,
    /// report.
    pub fn serve(
        &mut self,
        input: impl Read,
        output: impl Write,
    ) -> Result<ReceiveOutcome, TransferError> {
        let mut reader = PktReader::new(input);
        let mut writer = PktWriter::new(output);

        // Command list; first line carries client capabilities.
        let mut commands: Vec<RefCommand> = Vec::new();
        let mut client_caps = CapSet::new();
        loop {
            match reader.read_packet()? {
                Packet::Flush => break,
                Packet::Data(line) => {
                    let (payload, caps_text) = match line.iter().position(|&b| b == 0) {
                        Some(nul) => (&line[..nul], Some(&line[nul + 1..])),
                        None => (&line[..], None),
                    };
                    if let Some(caps_text) = caps_text {
                        if !commands.is_empty() {
                            return Err(TransferError::Protocol(
                                "capabilities after the first command".into(),
                            ));
                        }
                        client_caps =
                            CapSet::parse(String::from_utf8_lossy(caps_text).trim_end());
                    }
                    let text = String::from_utf8_lossy(payload);
                    let text = text.trim_end();
                    let (old, rest) = parse_oid_token(text)?;
                    let (new, name_text) = parse_oid_token(rest)?;
                    let name = RefName::new(name_text)
                        .map_err(|_| TransferError::BadCommand(name_text.to_string()))?;
                    let command = RefCommand { old, new, name };
                    if command.old.is_zero() && command.new.is_zero() {
                        return Err(TransferError::BadCommand(
                            "both sides zero".to_string(),
                        ));
                    }
                    commands.push(command);
                }
                other => {
                    return Err(TransferError::Protocol(format!(
                        "unexpected packet in commands: {other:?}"
                    )))
                }
            }
        }

        if commands.is_empty() {
            return Ok(ReceiveOutcome {
                commands: Vec::new(),
                pack_size: None,
            });
        }

        // The pack follows iff any command introduces objects.
        let needs_pack = commands
            .iter()
            .any(|c| c.kind() != RefCommandKind::Delete);
        let mut pack_size = None;
        let mut unpack_error: Option<String> = None;
        if needs_pack {
            match IndexPack::new(HashKind::Sha1).run(
                reader.get_mut(),
                &self.repo.odb().pack_dir(),
                |oid| {
                    self.repo
                        .odb()
                        .open_object(oid, None)
                        .ok()
                        .map(|data| (data.kind, data.data))
                },
                &mut NullMonitor,
            ) {
                Ok(outcome) => {
                    pack_size = Some(outcome.pack_size);
                    self.repo.odb().refresh()?;
                }
                Err(e) => unpack_error = Some(e.to_string()),
            }
        }

        let mut ctx = HookContext::new();
        let statuses = if let Some(reason) = &unpack_error {
            commands
                .iter()
                .map(|_| CommandStatus::Rejected(format!("unpack failed: {reason}")))
                .collect()
        } else {
            self.decide_and_apply(&commands, &client_caps, &mut ctx)?
        };

        if let Some(hook) = self.hooks.post_receive.as_mut() {
            let applied: Vec<RefCommand> = commands
                .iter()
                .zip(&statuses)
                .filter(|(_, s)| **s == CommandStatus::Ok)
                .map(|(c, _)| c.clone())
                .collect();
            if !applied.is_empty() {
                hook(&mut ctx, &applied);
            }
        }

        // Report, multiplexed when negotiated.
        if client_caps.has("report-status") {
            let report = render_report(&commands, &statuses, unpack_error.as_deref())?;
            if client_caps.has("side-band-64k") || client_caps.has("side-band") {
                let wide = client_caps.has("side-band-64k");
                let mut band = SideBandWriter::new(&mut writer, wide);
                let messages = ctx.take();
                if !messages.is_empty() {
                    band.write(Band::Progress, &messages)?;
                }
                band.write(Band::Data, &report)?;
                band.finish()?;
            } else {
                writer.get_mut().write_all(&report)?;
                writer.flush()?;
            }
        }

        Ok(ReceiveOutcome {
            commands: commands.into_iter().zip(statuses).collect(),
            pack_size,
        })
    }

    /// Run the hook chain and apply the surviving commands.
    fn decide_and_apply(
        &mut self,
        commands: &[RefCommand],
        client_caps: &CapSet,
        ctx: &mut HookContext,
    ) -> Result<Vec<CommandStatus>, TransferError> {
        // Objects named by create/update must exist after the unpack.
        let mut statuses: Vec<Option<CommandStatus>> = commands
            .iter()
            .map(|c| {
                if c.kind() != RefCommandKind::Delete && !self.repo.odb().contains(&c.new) {
                    Some(CommandStatus::Rejected("missing necessary objects".into()))
                } else {
                    None
                }
            })
            .collect();

        // Pre-receive decides over the whole surviving set.
        if let Some(hook) = self.hooks.pre_receive.as_mut() {
            let survivors: Vec<RefCommand> = commands
                .iter()
                .zip(&statuses)
                .filter(|(_, s)| s.is_none())
                .map(|(c, _)| c.clone())
                .collect();
            if let Err(reason) = hook(ctx, &survivors) {
                for slot in statuses.iter_mut().filter(|s| s.is_none()) {
                    *slot = Some(CommandStatus::Rejected(reason.clone()));
                }
            }
        }

        // The update hook decides per command.
        if let Some(hook) = self.hooks.update.as_mut() {
            for (command, slot) in commands.iter().zip(statuses.iter_mut()) {
                if slot.is_none() {
                    if let Err(reason) = hook(ctx, command) {
                        *slot = Some(CommandStatus::Rejected(reason));
                    }
                }
            }
        }

        let atomic = client_caps.has("atomic");
        if atomic {
            // Any rejection aborts the whole set.
            if statuses.iter().any(|s| s.is_some()) {
                return Ok(statuses
                    .into_iter()
                    .map(|s| {
                        s.unwrap_or_else(|| {
                            CommandStatus::Rejected("atomic push failed".into())
                        })
                    })
                    .collect());
            }
            let mut tx = Transaction::new();
            for command in commands {
                tx.add(RefEdit {
                    name: command.name.clone(),
                    kind: match command.kind() {
                        RefCommandKind::Create => RefEditKind::Create { new: command.new },
                        RefCommandKind::Delete => RefEditKind::Delete { old: command.old },
                        RefCommandKind::Update => RefEditKind::Update {
                            old: command.old,
                            new: command.new,
                        },
                    },
                    message: Some(BString::from("push")),
                });
            }
            let outcomes = tx.commit(self.repo.refs().git_dir(), None)?;
            return Ok(outcomes
                .into_iter()
                .map(|outcome| match outcome {
                    o if o.is_success() => CommandStatus::Ok,
                    UpdateOutcome::Rejected { .. } => {
                        CommandStatus::Rejected("failed to lock".into())
                    }
                    other => CommandStatus::Rejected(format!("{other:?}")),
                })
                .collect());
        }

        // Non-atomic: apply each survivor on its own.
        let mut out = Vec::with_capacity(commands.len());
        for (command, slot) in commands.iter().zip(statuses.into_iter()) {
            if let Some(status) = slot {
                out.push(status);
                continue;
            }
            let outcome = match command.kind() {
                RefCommandKind::Create => self
                    .repo
                    .refs()
                    .update(command.name.clone(), command.new)
                    .expect(None)
                    .apply()?,
                RefCommandKind::Delete => self
                    .repo
                    .refs()
                    .delete(command.name.clone())
                    .expect(Some(command.old))
                    .apply()?,
                RefCommandKind::Update => self
                    .repo
                    .refs()
                    .update(command.name.clone(), command.new)
                    .expect(Some(command.old))
                    .force(true)
                    .apply()?,
            };
            out.push(if outcome.is_success() {
                CommandStatus::Ok
            } else {
                CommandStatus::Rejected(match outcome {
                    UpdateOutcome::Rejected { .. } => "stale info".into(),
                    UpdateOutcome::LockFailure => "failed to lock".into(),
                    other => format!("{other:?}"),
                })
            });
        }
        Ok(out)
    }
}

/// The report-status section: its own pkt-line stream.
fn render_report(
    commands: &[RefCommand],
    statuses: &[CommandStatus],
    unpack_error: Option<&str>,
) -> Result<Vec<u8>, TransferError> {
    let mut buf = Vec::new();
    let mut writer = PktWriter::new(&mut buf);
    match unpack_error {
        None => writer.write_text("unpack ok")?,
        Some(reason) => writer.write_text(&format!("unpack {reason}"))?,
    }
    for (command, status) in commands.iter().zip(statuses) {
        match status {
            CommandStatus::Ok => writer.write_text(&format!("ok {}", command.name))?,
            CommandStatus::Rejected(reason) => {
                writer.write_text(&format!("ng {} {}", command.name, reason))?
            }
        }
    }
    writer.write_flush()?;
    Ok(buf)
}
