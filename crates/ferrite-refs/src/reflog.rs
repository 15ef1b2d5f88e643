//! The reflog: an append-only journal per ref under `logs/`.
//!
//! Line format: `<old> <new> <ident> <secs> <zone>\t<message>`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use bstr::{BString, ByteSlice};
use ferrite_hash::Oid;
use ferrite_util::Ident;

use crate::{RefError, RefName};

/// One reflog line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflogEntry {
    pub old: Oid,
    pub new: Oid,
    pub who: Ident,
    pub message: BString,
}

fn log_path(git_dir: &Path, name: &RefName) -> PathBuf {
    git_dir.join("logs").join(name.as_str())
}

/// Append one entry; creates the log file and its directories.
pub(crate) fn append(
    git_dir: &Path,
    name: &RefName,
    entry: &ReflogEntry,
) -> Result<(), RefError> {
    let path = log_path(git_dir, name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::OpenOptions::new().create(true).append(true).open(path)?;

    let mut line = Vec::new();
    line.extend_from_slice(entry.old.to_hex().as_bytes());
    line.push(b' ');
    line.extend_from_slice(entry.new.to_hex().as_bytes());
    line.push(b' ');
    line.extend_from_slice(&entry.who.to_bytes());
    line.push(b'\t');
    // Reflog messages are single-line by format.
    let message = entry.message.replace(b"\n", b" ");
    line.extend_from_slice(message.trim());
    line.push(b'\n');
    file.write_all(&line)?;
    Ok(())
}

/// Read the whole log, oldest entry first. Missing log → empty.
pub fn read_reflog(git_dir: &Path, name: &RefName) -> Result<Vec<ReflogEntry>, RefError> {
    let content = match fs::read(log_path(git_dir, name)) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut entries = Vec::new();
    for (lineno, line) in content.split(|&b| b == b'\n').enumerate() {
        if line.is_empty() {
            continue;
        }
        entries.push(parse_line(line, lineno + 1)?);
    }
    Ok(entries)
}

fn parse_line(line: &[u8], lineno: usize) -> Result<ReflogEntry, RefError> {
    let bad = || RefError::MalformedReflog(lineno);

    let (meta, message) = match line.find_byte(b'\t') {
        Some(tab) => (&line[..tab], &line[tab + 1..]),
        None => (line, &b""[..]),
    };

    let text = meta.to_str().map_err(|_| bad())?;
    let (old_hex, rest) = text.split_once(' ').ok_or_else(bad)?;
    let (new_hex, ident_text) = rest.split_once(' ').ok_or_else(bad)?;

    Ok(ReflogEntry {
        old: Oid::from_hex(old_hex).map_err(|_| bad())?,
        new: Oid::from_hex(new_hex).map_err(|_| bad())?,
        who: Ident::parse(ident_text.as_bytes().as_bstr()).map_err(|_| bad())?,
        message: BString::from(message),
    })
}
