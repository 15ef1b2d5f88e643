use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{LockError, UtilError};
use crate::Result;

const LOCK_SUFFIX: &str = ".lock";

/// Advisory file lock guarding an atomic rewrite.
///
/// The protocol is the one every git file update uses:
/// 1. create `<target>.lock` with O_CREAT|O_EXCL — failure means another
///    writer holds the lock,
/// 2. write the replacement content into the lock file,
/// 3. fsync and rename the lock over the target (`commit`), or
/// 4. unlink the lock without touching the target (`discard`, also what
///    Drop does for a lock that was never committed).
pub struct LockFile {
    target: PathBuf,
    lock_path: PathBuf,
    file: Option<File>,
    resolved: bool,
}

impl LockFile {
    /// Take the lock for `target`, creating `<target>.lock` exclusively.
    pub fn take(target: impl AsRef<Path>) -> Result<Self> {
        let target = target.as_ref().to_path_buf();
        let mut name = target.as_os_str().to_os_string();
        name.push(LOCK_SUFFIX);
        let lock_path = PathBuf::from(name);

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    UtilError::Lock(LockError::Held {
                        path: lock_path.clone(),
                    })
                } else {
                    UtilError::Lock(LockError::Create {
                        path: lock_path.clone(),
                        source: e,
                    })
                }
            })?;

        Ok(Self {
            target,
            lock_path,
            file: Some(file),
            resolved: false,
        })
    }

    /// Non-blocking variant: `Ok(None)` when the lock is held elsewhere.
    pub fn try_take(target: impl AsRef<Path>) -> Result<Option<Self>> {
        match Self::take(target) {
            Ok(lock) => Ok(Some(lock)),
            Err(UtilError::Lock(LockError::Held { .. })) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// The file the lock protects.
    pub fn target(&self) -> &Path {
        &self.target
    }

    /// The `.lock` file itself.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Flush, fsync, and rename the lock file over the target.
    pub fn commit(mut self) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            let lock_path = self.lock_path.clone();
            file.flush().map_err(|e| {
                UtilError::Lock(LockError::Commit {
                    path: lock_path.clone(),
                    source: e,
                })
            })?;
            file.sync_all().map_err(|e| {
                UtilError::Lock(LockError::Commit {
                    path: lock_path.clone(),
                    source: e,
                })
            })?;
        }
        self.file.take();
        fs::rename(&self.lock_path, &self.target).map_err(|e| self.commit_err(e))?;
        self.resolved = true;
        Ok(())
    }

    /// Drop the lock without changing the target.
    pub fn discard(mut self) -> Result<()> {
        self.file.take();
        match fs::remove_file(&self.lock_path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        self.resolved = true;
        Ok(())
    }

    fn commit_err(&self, source: io::Error) -> UtilError {
        UtilError::Lock(LockError::Commit {
            path: self.lock_path.clone(),
            source,
        })
    }
}

impl Write for LockFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("lock already resolved"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("lock already resolved"))?
            .flush()
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if !self.resolved {
            self.file.take();
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_replaces_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("HEAD");
        fs::write(&target, b"old\n").unwrap();

        let mut lock = LockFile::take(&target).unwrap();
        lock.write_all(b"new\n").unwrap();
        lock.commit().unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"new\n");
        assert!(!dir.path().join("HEAD.lock").exists());
    }

    #[test]
    fn discard_keeps_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("config");
        fs::write(&target, b"kept").unwrap();

        let mut lock = LockFile::take(&target).unwrap();
        lock.write_all(b"thrown away").unwrap();
        lock.discard().unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"kept");
        assert!(!dir.path().join("config.lock").exists());
    }

    #[test]
    fn drop_without_commit_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("index");
        fs::write(&target, b"kept").unwrap();

        {
            let mut lock = LockFile::take(&target).unwrap();
            lock.write_all(b"half written").unwrap();
        }

        assert_eq!(fs::read(&target).unwrap(), b"kept");
        assert!(!dir.path().join("index.lock").exists());
    }

    #[test]
    fn second_take_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("packed-refs");

        let _held = LockFile::take(&target).unwrap();
        match LockFile::take(&target) {
            Err(UtilError::Lock(LockError::Held { .. })) => {}
            other => panic!("expected Held, got {:?}", other.map(|_| ())),
        }
        assert!(LockFile::try_take(&target).unwrap().is_none());
    }

    #[test]
    fn lock_creates_missing_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("FETCH_HEAD");

        let mut lock = LockFile::take(&target).unwrap();
        lock.write_all(b"fresh").unwrap();
        lock.commit().unwrap();

        assert_eq!(fs::read(&target).unwrap(), b"fresh");
    }
}
