//! Loose ref files: one file per ref under the git directory.

use std::fs;
use std::path::{Path, PathBuf};

use ferrite_hash::Oid;

use crate::{Ref, RefError, RefName};

/// Absolute path of a loose ref file.
pub(crate) fn ref_path(git_dir: &Path, name: &RefName) -> PathBuf {
    git_dir.join(name.as_str())
}

/// Read a loose ref. `Ok(None)` when no file exists.
pub(crate) fn read(git_dir: &Path, name: &RefName) -> Result<Option<Ref>, RefError> {
    let path = ref_path(git_dir, name);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        // A directory of the same name means child refs exist, not this one.
        Err(e) if path.is_dir() => {
            let _ = e;
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    let line = content.trim_end();

    if let Some(target) = line.strip_prefix("ref: ") {
        let target = RefName::new(target.trim())
            .map_err(|_| RefError::InvalidTarget(name.to_string()))?;
        return Ok(Some(Ref::Symbolic {
            name: name.clone(),
            target,
        }));
    }

    let target =
        Oid::from_hex(line).map_err(|_| RefError::MalformedRef(name.to_string()))?;
    Ok(Some(Ref::Direct {
        name: name.clone(),
        target,
    }))
}

/// Overwrite a loose ref with a direct value (no locking; callers that
/// need the CAS protocol go through [`crate::RefUpdate`]).
pub(crate) fn write(git_dir: &Path, name: &RefName, target: &Oid) -> Result<(), RefError> {
    let path = ref_path(git_dir, name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, format!("{}\n", target.to_hex()))?;
    Ok(())
}

/// Point a symbolic ref at another name.
pub(crate) fn write_symbolic(
    git_dir: &Path,
    name: &RefName,
    target: &RefName,
) -> Result<(), RefError> {
    let path = ref_path(git_dir, name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, format!("ref: {}\n", target))?;
    Ok(())
}

/// Remove a loose ref file; missing is fine.
pub(crate) fn delete(git_dir: &Path, name: &RefName) -> Result<(), RefError> {
    match fs::remove_file(ref_path(git_dir, name)) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    // Prune now-empty parent directories up to refs/.
    let mut dir = ref_path(git_dir, name);
    while dir.pop() {
        if dir == git_dir.join("refs") || dir == *git_dir {
            break;
        }
        if fs::remove_dir(&dir).is_err() {
            break;
        }
    }
    Ok(())
}

/// Every loose ref under `refs/` (plus nothing else), sorted by name.
pub(crate) fn enumerate(git_dir: &Path) -> Result<Vec<RefName>, RefError> {
    let refs_root = git_dir.join("refs");
    let mut found = Vec::new();
    if refs_root.is_dir() {
        walk(&refs_root, git_dir, &mut found)?;
    }
    found.sort();
    Ok(found)
}

fn walk(dir: &Path, git_dir: &Path, found: &mut Vec<RefName>) -> Result<(), RefError> {
    for entry in fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk(&path, git_dir, found)?;
        } else if let Ok(relative) = path.strip_prefix(git_dir) {
            let text = relative.to_string_lossy().replace('\\', "/");
            if text.ends_with(".lock") {
                continue;
            }
            if let Ok(name) = RefName::new(text) {
                found.push(name);
            }
        }
    }
    Ok(())
}
