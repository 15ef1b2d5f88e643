use crate::ObjectError;

/// File mode of a tree or index entry.
///
/// The octal codec is lossless for the six modes git actually writes;
/// anything else in a tree is corruption and is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryMode {
    /// Subdirectory (040000).
    Directory,
    /// Regular file (100644).
    Regular,
    /// Executable file (100755).
    Executable,
    /// Symbolic link (120000).
    Symlink,
    /// Submodule commit reference (160000).
    Gitlink,
    /// Absent entry (000000); only meaningful in diffs and index edits.
    Missing,
}

impl EntryMode {
    pub fn from_raw(raw: u32) -> Result<Self, ObjectError> {
        match raw {
            0o040000 => Ok(Self::Directory),
            0o100644 => Ok(Self::Regular),
            0o100755 => Ok(Self::Executable),
            0o120000 => Ok(Self::Symlink),
            0o160000 => Ok(Self::Gitlink),
            0 => Ok(Self::Missing),
            other => Err(ObjectError::BadMode(format!("{other:o}"))),
        }
    }

    /// Parse octal ASCII as it appears in tree entries (no leading zeros).
    pub fn from_octal(s: &[u8]) -> Result<Self, ObjectError> {
        if s.is_empty() || s.len() > 6 {
            return Err(ObjectError::BadMode(
                String::from_utf8_lossy(s).into_owned(),
            ));
        }
        let mut raw: u32 = 0;
        for &b in s {
            if !(b'0'..=b'7').contains(&b) {
                return Err(ObjectError::BadMode(
                    String::from_utf8_lossy(s).into_owned(),
                ));
            }
            raw = raw * 8 + u32::from(b - b'0');
        }
        Self::from_raw(raw)
    }

    pub fn as_raw(&self) -> u32 {
        match self {
            Self::Directory => 0o040000,
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Gitlink => 0o160000,
            Self::Missing => 0,
        }
    }

    /// Octal token as written in tree payloads (`40000`, not `040000`).
    pub fn to_octal(&self) -> String {
        format!("{:o}", self.as_raw())
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, Self::Directory)
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Self::Regular | Self::Executable)
    }

    pub fn is_gitlink(&self) -> bool {
        matches!(self, Self::Gitlink)
    }
}
