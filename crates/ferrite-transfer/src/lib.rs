//! The smart transfer protocol: the server halves (upload-pack and
//! receive-pack) and their client counterparts (fetch and push).
//!
//! Sessions run over caller-supplied byte channels in the stateless
//! one-round shape smart HTTP uses: the requesting side writes its whole
//! request (wants + haves + `done`, or commands + pack), the serving
//! side reads it and answers. Physical transports live outside this
//! crate.

mod advertise;
mod closure;
mod fetch;
pub mod hooks;
pub mod http;
mod push;
mod receive;
mod upload;

pub use advertise::{parse_advertisement, write_advertisement, Advertised};
pub use closure::collect_closure;
pub use fetch::{FetchClient, FetchOutcome};
pub use hooks::{HookContext, Hooks, RefCommand, RefCommandKind};
pub use push::{PushClient, PushOutcome, PushedRef};
pub use receive::{CommandStatus, ReceiveOutcome, ReceivePack};
pub use upload::UploadPack;

use ferrite_hash::Oid;

/// Errors of the transfer layer.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("illegal ref command: {0}")]
    BadCommand(String),

    #[error("hook rejected the update: {0}")]
    HookRejected(String),

    #[error("push rejected: {0}")]
    PushRejected(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Wire(#[from] ferrite_wire::WireError),

    #[error(transparent)]
    Pack(#[from] ferrite_pack::PackError),

    #[error(transparent)]
    Odb(#[from] ferrite_odb::OdbError),

    #[error(transparent)]
    Refs(#[from] ferrite_refs::RefError),

    #[error(transparent)]
    Revwalk(#[from] ferrite_revwalk::RevWalkError),

    #[error(transparent)]
    Repo(#[from] ferrite_repo::RepoError),

    #[error(transparent)]
    Object(#[from] ferrite_object::ObjectError),

    #[error(transparent)]
    Id(#[from] ferrite_hash::IdError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Parse `<40-hex> ` off the front of a protocol line.
pub(crate) fn parse_oid_token(line: &str) -> Result<(Oid, &str), TransferError> {
    if line.len() < 40 {
        return Err(TransferError::Protocol(format!("short id in: {line}")));
    }
    let (hex, rest) = line.split_at(40);
    let oid =
        Oid::from_hex(hex).map_err(|_| TransferError::Protocol(format!("bad id in: {line}")))?;
    Ok((oid, rest.strip_prefix(' ').unwrap_or(rest)))
}
