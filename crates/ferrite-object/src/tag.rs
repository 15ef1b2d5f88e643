use bstr::BString;
use ferrite_hash::Oid;
use ferrite_util::Ident;

use crate::commit::{split_headers, write_header};
use crate::{ObjectError, ObjectKind};

/// An annotated tag object.
///
/// Lightweight tags never reach this type; they are plain refs handled at
/// the ref-store layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// The object being tagged.
    pub target: Oid,
    /// Kind of the target.
    pub target_kind: ObjectKind,
    /// The tag's short name (no `refs/tags/` prefix).
    pub name: BString,
    /// Missing in some ancient tags, hence optional.
    pub tagger: Option<Ident>,
    pub message: BString,
}

impl Tag {
    pub fn parse(payload: &[u8]) -> Result<Self, ObjectError> {
        let mut target = None;
        let mut target_kind = None;
        let mut name = None;
        let mut tagger = None;

        let (headers, message) = split_headers(payload);
        for (header, value) in headers {
            match header.as_slice() {
                b"object" => {
                    let s = std::str::from_utf8(&value)
                        .map_err(|_| ObjectError::BadHeader("non-ASCII id".into()))?;
                    target = Some(Oid::from_hex(s)?);
                }
                b"type" => target_kind = Some(ObjectKind::from_bytes(&value)?),
                b"tag" => name = Some(value),
                b"tagger" => tagger = Some(Ident::parse(value.as_ref())?),
                _ => {}
            }
        }

        Ok(Self {
            target: target.ok_or(ObjectError::MissingTagHeader("object"))?,
            target_kind: target_kind.ok_or(ObjectError::MissingTagHeader("type"))?,
            name: name.ok_or(ObjectError::MissingTagHeader("tag"))?,
            tagger,
            message,
        })
    }

    pub fn to_payload(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"object ");
        out.extend_from_slice(self.target.to_hex().as_bytes());
        out.push(b'\n');
        out.extend_from_slice(b"type ");
        out.extend_from_slice(self.target_kind.as_str().as_bytes());
        out.push(b'\n');
        write_header(&mut out, b"tag", &self.name);
        if let Some(tagger) = &self.tagger {
            write_header(&mut out, b"tagger", &tagger.to_bytes());
        }
        out.push(b'\n');
        out.extend_from_slice(&self.message);
        out
    }
}
