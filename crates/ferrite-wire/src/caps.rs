//! Capability lists.
//!
//! In the v0/v1 protocol the first advertisement line carries a
//! NUL-separated, space-delimited capability list. Tokens are
//! reproduced verbatim; some carry `=value`.

/// An ordered capability list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapSet {
    tokens: Vec<String>,
}

impl CapSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the space-separated list after the NUL of the first
    /// advertisement line.
    pub fn parse(text: &str) -> Self {
        Self {
            tokens: text.split_whitespace().map(String::from).collect(),
        }
    }

    /// Add a bare token.
    pub fn add(&mut self, token: impl Into<String>) -> &mut Self {
        self.tokens.push(token.into());
        self
    }

    /// Is a capability (by name, ignoring any `=value`) present?
    pub fn has(&self, name: &str) -> bool {
        self.tokens
            .iter()
            .any(|t| t == name || t.strip_prefix(name).is_some_and(|rest| rest.starts_with('=')))
    }

    /// The value of a `name=value` token.
    pub fn value_of(&self, name: &str) -> Option<&str> {
        self.tokens.iter().find_map(|t| {
            t.strip_prefix(name)
                .and_then(|rest| rest.strip_prefix('='))
        })
    }

    /// All values of a repeatable `name=value` token (e.g. `symref`).
    pub fn values_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.tokens.iter().filter_map(move |t| {
            t.strip_prefix(name)
                .and_then(|rest| rest.strip_prefix('='))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tokens.iter().map(String::as_str)
    }

    /// The wire form: tokens joined by single spaces.
    pub fn to_wire(&self) -> String {
        self.tokens.join(" ")
    }
}

impl std::fmt::Display for CapSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_wire())
    }
}

impl FromIterator<String> for CapSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            tokens: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADVERTISED: &str = "multi_ack thin-pack side-band side-band-64k ofs-delta \
                              delete-refs report-status atomic include-tag \
                              symref=HEAD:refs/heads/main agent=git/2.43.0";

    #[test]
    fn parse_and_query() {
        let caps = CapSet::parse(ADVERTISED);
        for token in [
            "multi_ack",
            "thin-pack",
            "ofs-delta",
            "side-band-64k",
            "report-status",
            "delete-refs",
            "atomic",
            "include-tag",
        ] {
            assert!(caps.has(token), "{token}");
        }
        assert!(!caps.has("quiet"));
        assert!(!caps.has("side")); // prefix of side-band must not match
        assert_eq!(caps.value_of("agent"), Some("git/2.43.0"));
        assert_eq!(caps.value_of("symref"), Some("HEAD:refs/heads/main"));
    }

    #[test]
    fn wire_round_trip_is_verbatim() {
        let caps = CapSet::parse(ADVERTISED);
        let rewired = caps.to_wire();
        assert_eq!(CapSet::parse(&rewired), caps);
        // Token bytes never change shape.
        assert!(rewired.contains("side-band-64k"));
        assert!(rewired.contains("symref=HEAD:refs/heads/main"));
    }

    #[test]
    fn repeated_symrefs() {
        let caps = CapSet::parse("symref=HEAD:refs/heads/a symref=OTHER:refs/heads/b");
        let values: Vec<_> = caps.values_of("symref").collect();
        assert_eq!(values, ["HEAD:refs/heads/a", "OTHER:refs/heads/b"]);
    }

    #[test]
    fn build_and_emit() {
        let mut caps = CapSet::new();
        caps.add("report-status").add("ofs-delta").add("agent=ferrite/0.2");
        assert_eq!(caps.to_wire(), "report-status ofs-delta agent=ferrite/0.2");
    }

    #[test]
    fn empty_list() {
        let caps = CapSet::parse("");
        assert!(caps.is_empty());
        assert_eq!(caps.to_wire(), "");
    }
}
