use std::fmt;

use crate::RefError;

/// A validated ref name (`HEAD`, `refs/heads/main`, …).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefName(String);

impl RefName {
    /// Validate and wrap a name, applying git's check-ref-format rules
    /// (the subset that matters for on-disk storage).
    pub fn new(name: impl Into<String>) -> Result<Self, RefError> {
        let name = name.into();
        if !is_valid(&name) {
            return Err(RefError::InvalidName(name));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Is this a branch (`refs/heads/…`)?
    pub fn is_branch(&self) -> bool {
        self.0.starts_with("refs/heads/")
    }

    /// Is this a tag (`refs/tags/…`)?
    pub fn is_tag(&self) -> bool {
        self.0.starts_with("refs/tags/")
    }

    /// The short human name (`main` for `refs/heads/main`).
    pub fn shorten(&self) -> &str {
        for prefix in ["refs/heads/", "refs/tags/", "refs/remotes/", "refs/"] {
            if let Some(short) = self.0.strip_prefix(prefix) {
                return short;
            }
        }
        &self.0
    }
}

fn is_valid(name: &str) -> bool {
    if name.is_empty() || name == "@" {
        return false;
    }
    // Top-level names: HEAD, FETCH_HEAD, ORIG_HEAD, MERGE_HEAD, and the like.
    if !name.contains('/') {
        return name.chars().all(|c| c.is_ascii_uppercase() || c == '_');
    }
    if name.starts_with('/') || name.ends_with('/') || name.contains("//") {
        return false;
    }
    if name.ends_with('.') || name.ends_with(".lock") {
        return false;
    }
    if name.contains("..") || name.contains("@{") {
        return false;
    }
    for component in name.split('/') {
        if component.is_empty() || component.starts_with('.') || component.ends_with(".lock") {
            return false;
        }
    }
    !name.bytes().any(|b| {
        b < 0x20
            || b == 0x7f
            || matches!(b, b' ' | b'~' | b'^' | b':' | b'?' | b'*' | b'[' | b'\\')
    })
}

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for RefName {
    type Err = RefError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for RefName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_names() {
        for name in [
            "HEAD",
            "FETCH_HEAD",
            "refs/heads/main",
            "refs/heads/feature/nested-topic",
            "refs/tags/v1.0.0",
            "refs/remotes/origin/main",
        ] {
            assert!(RefName::new(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn rejects_hostile_names() {
        for name in [
            "",
            "@",
            "refs/heads/",
            "/refs/heads/x",
            "refs//heads/x",
            "refs/heads/..",
            "refs/heads/a..b",
            "refs/heads/x.lock",
            "refs/heads/.hidden",
            "refs/heads/with space",
            "refs/heads/with:colon",
            "refs/heads/star*",
            "refs/heads/ques?tion",
            "refs/heads/back\\slash",
            "refs/heads/tilde~1",
            "refs/heads/caret^",
            "refs/heads/at@{",
            "refs/heads/trailing.",
            "lowercase-toplevel",
        ] {
            assert!(RefName::new(name).is_err(), "{name}");
        }
    }

    #[test]
    fn shorten_strips_known_prefixes() {
        assert_eq!(RefName::new("refs/heads/main").unwrap().shorten(), "main");
        assert_eq!(RefName::new("refs/tags/v1").unwrap().shorten(), "v1");
        assert_eq!(
            RefName::new("refs/remotes/origin/dev").unwrap().shorten(),
            "origin/dev"
        );
        assert_eq!(RefName::new("HEAD").unwrap().shorten(), "HEAD");
    }

    #[test]
    fn classification() {
        assert!(RefName::new("refs/heads/main").unwrap().is_branch());
        assert!(!RefName::new("refs/tags/v1").unwrap().is_branch());
        assert!(RefName::new("refs/tags/v1").unwrap().is_tag());
    }
}
