//! The `packed-refs` snapshot.
//!
//! A sorted text file of `<oid> <name>` lines; a `^<oid>` line after a
//! tag ref carries the peeled target. Rewrites go through a lock on the
//! whole file, copy-on-write.

use std::fs;
use std::io::Write;
use std::path::Path;

use ferrite_hash::Oid;
use ferrite_util::LockFile;

use crate::{RefError, RefName};

const HEADER: &str = "# pack-refs with: peeled fully-peeled sorted \n";

/// One packed ref, possibly with its peeled (tag-dereferenced) target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedRef {
    pub name: RefName,
    pub oid: Oid,
    pub peeled: Option<Oid>,
}

/// Parsed snapshot of the `packed-refs` file.
#[derive(Debug, Clone, Default)]
pub struct PackedRefs {
    refs: Vec<PackedRef>,
}

impl PackedRefs {
    /// Load `packed-refs`; a missing file is an empty snapshot.
    pub fn load(git_dir: &Path) -> Result<Self, RefError> {
        let content = match fs::read_to_string(git_dir.join("packed-refs")) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, RefError> {
        let mut refs: Vec<PackedRef> = Vec::new();
        for (lineno, line) in content.lines().enumerate() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(peeled_hex) = line.strip_prefix('^') {
                let peeled = Oid::from_hex(peeled_hex.trim())
                    .map_err(|_| RefError::MalformedPacked(lineno + 1, line.into()))?;
                match refs.last_mut() {
                    Some(last) => last.peeled = Some(peeled),
                    None => {
                        return Err(RefError::MalformedPacked(lineno + 1, line.into()));
                    }
                }
                continue;
            }
            let (hex, name) = line
                .split_once(' ')
                .ok_or_else(|| RefError::MalformedPacked(lineno + 1, line.into()))?;
            let oid = Oid::from_hex(hex)
                .map_err(|_| RefError::MalformedPacked(lineno + 1, line.into()))?;
            let name = RefName::new(name.trim())
                .map_err(|_| RefError::MalformedPacked(lineno + 1, line.into()))?;
            refs.push(PackedRef {
                name,
                oid,
                peeled: None,
            });
        }
        refs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self { refs })
    }

    pub fn find(&self, name: &RefName) -> Option<&PackedRef> {
        self.refs
            .binary_search_by(|r| r.name.cmp(name))
            .ok()
            .map(|at| &self.refs[at])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PackedRef> {
        self.refs.iter()
    }

    pub fn len(&self) -> usize {
        self.refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }

    /// Add or replace one entry in memory.
    pub fn upsert(&mut self, entry: PackedRef) {
        match self.refs.binary_search_by(|r| r.name.cmp(&entry.name)) {
            Ok(at) => self.refs[at] = entry,
            Err(at) => self.refs.insert(at, entry),
        }
    }

    /// Drop one entry in memory.
    pub fn remove(&mut self, name: &RefName) -> bool {
        match self.refs.binary_search_by(|r| r.name.cmp(name)) {
            Ok(at) => {
                self.refs.remove(at);
                true
            }
            Err(_) => false,
        }
    }

    /// Rewrite `packed-refs` atomically under its lock.
    pub fn store(&self, git_dir: &Path) -> Result<(), RefError> {
        let mut lock = LockFile::take(git_dir.join("packed-refs"))?;
        lock.write_all(HEADER.as_bytes())
            .map_err(RefError::from)?;
        for entry in &self.refs {
            lock.write_all(format!("{} {}\n", entry.oid.to_hex(), entry.name).as_bytes())?;
            if let Some(peeled) = &entry.peeled {
                lock.write_all(format!("^{}\n", peeled.to_hex()).as_bytes())?;
            }
        }
        lock.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(n: u8) -> Oid {
        let mut raw = [0u8; 20];
        raw[19] = n;
        Oid::from_raw(&raw, ferrite_hash::HashKind::Sha1).unwrap()
    }

    #[test]
    fn parse_with_peeled_lines() {
        let text = format!(
            "# pack-refs with: peeled fully-peeled sorted \n{} refs/heads/main\n{} refs/tags/v1\n^{}\n",
            oid(1).to_hex(),
            oid(2).to_hex(),
            oid(3).to_hex()
        );
        let packed = PackedRefs::parse(&text).unwrap();
        assert_eq!(packed.len(), 2);

        let tag = packed
            .find(&RefName::new("refs/tags/v1").unwrap())
            .unwrap();
        assert_eq!(tag.oid, oid(2));
        assert_eq!(tag.peeled, Some(oid(3)));

        let branch = packed
            .find(&RefName::new("refs/heads/main").unwrap())
            .unwrap();
        assert_eq!(branch.peeled, None);
    }

    #[test]
    fn store_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut packed = PackedRefs::default();
        packed.upsert(PackedRef {
            name: RefName::new("refs/tags/v2").unwrap(),
            oid: oid(9),
            peeled: Some(oid(8)),
        });
        packed.upsert(PackedRef {
            name: RefName::new("refs/heads/main").unwrap(),
            oid: oid(7),
            peeled: None,
        });
        packed.store(dir.path()).unwrap();

        let loaded = PackedRefs::load(dir.path()).unwrap();
        assert_eq!(loaded.len(), 2);
        // Sorted by name on disk and in memory.
        let names: Vec<_> = loaded.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["refs/heads/main", "refs/tags/v2"]);
        assert_eq!(
            loaded
                .find(&RefName::new("refs/tags/v2").unwrap())
                .unwrap()
                .peeled,
            Some(oid(8))
        );
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(PackedRefs::load(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn stray_peel_line_is_malformed() {
        assert!(matches!(
            PackedRefs::parse(&format!("^{}\n", oid(1).to_hex())),
            Err(RefError::MalformedPacked(1, _))
        ));
    }

    #[test]
    fn remove_and_upsert() {
        let mut packed = PackedRefs::default();
        let name = RefName::new("refs/heads/x").unwrap();
        packed.upsert(PackedRef {
            name: name.clone(),
            oid: oid(1),
            peeled: None,
        });
        packed.upsert(PackedRef {
            name: name.clone(),
            oid: oid(2),
            peeled: None,
        });
        assert_eq!(packed.len(), 1);
        assert_eq!(packed.find(&name).unwrap().oid, oid(2));
        assert!(packed.remove(&name));
        assert!(!packed.remove(&name));
    }
}
