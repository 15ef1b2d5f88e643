use bstr::{BStr, BString, ByteSlice};
use ferrite_hash::Oid;
use ferrite_util::Ident;

use crate::ObjectError;

/// A commit: a tree snapshot, parent links, two identities, and a message.
///
/// Headers this parser does not know (`encoding`, `mergetag`, …) are kept
/// verbatim in `extra_headers` so a parse/serialize cycle reproduces the
/// original bytes and therefore the original id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    pub tree: Oid,
    pub parents: Vec<Oid>,
    pub author: Ident,
    pub committer: Ident,
    /// Detached signature, exactly as stored (without the header name).
    pub gpgsig: Option<BString>,
    /// Unknown headers in original order: (name, possibly multi-line value).
    pub extra_headers: Vec<(BString, BString)>,
    pub message: BString,
}

impl Commit {
    /// Parse a commit payload.
    pub fn parse(payload: &[u8]) -> Result<Self, ObjectError> {
        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;
        let mut gpgsig = None;
        let mut extra_headers = Vec::new();

        let (headers, message) = split_headers(payload);
        for (name, value) in headers {
            match name.as_slice() {
                b"tree" => tree = Some(parse_oid(value.as_bstr())?),
                b"parent" => parents.push(parse_oid(value.as_bstr())?),
                b"author" => author = Some(Ident::parse(value.as_ref())?),
                b"committer" => committer = Some(Ident::parse(value.as_ref())?),
                b"gpgsig" => gpgsig = Some(value),
                _ => extra_headers.push((name, value)),
            }
        }

        Ok(Self {
            tree: tree.ok_or(ObjectError::MissingCommitHeader("tree"))?,
            parents,
            author: author.ok_or(ObjectError::MissingCommitHeader("author"))?,
            committer: committer.ok_or(ObjectError::MissingCommitHeader("committer"))?,
            gpgsig,
            extra_headers,
            message,
        })
    }

    /// Canonical payload bytes.
    pub fn to_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"tree ");
        out.extend_from_slice(self.tree.to_hex().as_bytes());
        out.push(b'\n');
        for parent in &self.parents {
            out.extend_from_slice(b"parent ");
            out.extend_from_slice(parent.to_hex().as_bytes());
            out.push(b'\n');
        }
        write_header(&mut out, b"author", &self.author.to_bytes());
        write_header(&mut out, b"committer", &self.committer.to_bytes());
        for (name, value) in &self.extra_headers {
            write_header(&mut out, name, value);
        }
        if let Some(sig) = &self.gpgsig {
            write_header(&mut out, b"gpgsig", sig);
        }
        out.push(b'\n');
        out.extend_from_slice(&self.message);
        out
    }

    /// A root commit has no parents.
    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// A merge commit has two or more parents.
    pub fn is_merge(&self) -> bool {
        self.parents.len() >= 2
    }

    /// First line of the message, without the newline.
    pub fn summary(&self) -> &BStr {
        match self.message.find_byte(b'\n') {
            Some(end) => self.message[..end].as_bstr(),
            None => self.message.as_bstr(),
        }
    }
}

fn parse_oid(value: &BStr) -> Result<Oid, ObjectError> {
    let s = value
        .to_str()
        .map_err(|_| ObjectError::BadHeader("non-ASCII id".into()))?;
    Ok(Oid::from_hex(s)?)
}

/// Split a commit/tag payload into headers and message.
///
/// A header value continues across lines that start with a single space
/// (the continuation encoding `gpgsig` relies on).
pub(crate) fn split_headers(payload: &[u8]) -> (Vec<(BString, BString)>, BString) {
    let mut headers: Vec<(BString, BString)> = Vec::new();
    let mut at = 0;

    while at < payload.len() {
        if payload[at] == b'\n' {
            // Blank line: the rest is the message.
            at += 1;
            break;
        }
        let line_end = payload[at..]
            .iter()
            .position(|&b| b == b'\n')
            .map(|i| i + at)
            .unwrap_or(payload.len());
        let line = &payload[at..line_end];

        if line[0] == b' ' {
            // Continuation of the previous header.
            if let Some((_, value)) = headers.last_mut() {
                value.push(b'\n');
                value.extend_from_slice(&line[1..]);
            }
        } else if let Some(space) = line.iter().position(|&b| b == b' ') {
            headers.push((BString::from(&line[..space]), BString::from(&line[space + 1..])));
        } else {
            headers.push((BString::from(line), BString::new(Vec::new())));
        }
        at = line_end + 1;
    }

    (headers, BString::from(&payload[at.min(payload.len())..]))
}

/// Write a header, re-encoding embedded newlines as continuations.
pub(crate) fn write_header(out: &mut Vec<u8>, name: &[u8], value: &[u8]) {
    out.extend_from_slice(name);
    out.push(b' ');
    for (i, line) in value.split(|&b| b == b'\n').enumerate() {
        if i > 0 {
            out.extend_from_slice(b"\n ");
        }
        out.extend_from_slice(line);
    }
    out.push(b'\n');
}
