use std::fs;
use std::io::Write;
use std::path::Path;

use flate2::write::ZlibEncoder;
use ferrite_hash::{ObjectHasher, Oid};
use ferrite_object::{header, Object, ObjectKind};

use crate::{LooseError, LooseStore};

impl LooseStore {
    /// Store an object, returning its id. Idempotent.
    pub fn write(&self, obj: &Object) -> Result<Oid, LooseError> {
        self.write_payload(obj.kind(), &obj.to_payload())
    }

    /// Store a raw payload of a known kind, returning its id. Idempotent.
    pub fn write_payload(&self, kind: ObjectKind, payload: &[u8]) -> Result<Oid, LooseError> {
        let hdr = header::write(kind, payload.len());
        let oid = {
            let mut hasher = ObjectHasher::new(self.hash());
            hasher.update(&hdr);
            hasher.update(payload);
            hasher.finish()?
        };

        if self.contains(&oid) {
            return Ok(oid);
        }

        let final_path = self.path_for(&oid);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = self.deflate_to_temp(&hdr, payload)?;
        install(&tmp, &final_path)?;
        Ok(oid)
    }

    /// Deflate into a temp file inside the objects directory so the final
    /// rename stays on one filesystem.
    fn deflate_to_temp(
        &self,
        hdr: &[u8],
        payload: &[u8],
    ) -> Result<std::path::PathBuf, LooseError> {
        fs::create_dir_all(self.objects_dir())?;
        let tmp = self.objects_dir().join(format!(
            "tmp_obj_{}_{:x}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .subsec_nanos()
        ));

        let file = fs::File::create(&tmp)?;
        let mut encoder = ZlibEncoder::new(file, self.compression());
        encoder.write_all(hdr)?;
        encoder.write_all(payload)?;
        encoder.finish()?;

        // Loose objects are immutable; 0444 like C git.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&tmp, fs::Permissions::from_mode(0o444))?;
        }

        Ok(tmp)
    }

    pub(crate) fn compression(&self) -> flate2::Compression {
        self.compression
    }
}

/// Move the temp file into place. Losing the race to a concurrent writer
/// of the same object is success.
fn install(tmp: &Path, final_path: &Path) -> Result<(), LooseError> {
    match fs::rename(tmp, final_path) {
        Ok(()) => Ok(()),
        Err(_) if final_path.exists() => {
            let _ = fs::remove_file(tmp);
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(tmp);
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferrite_hash::HashKind;
    use ferrite_object::Blob;

    #[test]
    fn double_write_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::at(dir.path(), HashKind::Sha1);

        let obj = Object::Blob(Blob::from_bytes("same bytes"));
        let first = store.write(&obj).unwrap();
        let second = store.write(&obj).unwrap();
        assert_eq!(first, second);

        // Only the one fan-out directory and one file.
        assert_eq!(store.iter().unwrap().count(), 1);
    }

    #[test]
    fn no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::at(dir.path(), HashKind::Sha1);
        store
            .write(&Object::Blob(Blob::from_bytes("payload")))
            .unwrap();

        let stray: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with("tmp_obj_"))
            .collect();
        assert!(stray.is_empty());
    }

    #[test]
    fn enumerate_written_objects() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::at(dir.path(), HashKind::Sha1);

        let a = store.write(&Object::Blob(Blob::from_bytes("a"))).unwrap();
        let b = store.write(&Object::Blob(Blob::from_bytes("b"))).unwrap();

        let mut expect = vec![a, b];
        expect.sort();
        let found: Vec<_> = store.iter().unwrap().collect();
        assert_eq!(found, expect);
    }
}
