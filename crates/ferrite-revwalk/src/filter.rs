//! Commit-level predicates applied to emitted commits.

use bstr::ByteSlice;
use ferrite_object::Commit;

/// A predicate over a fully parsed commit.
pub type RevFilter = Box<dyn Fn(&Commit) -> bool + Send>;

/// Keep commits whose message contains `pattern`.
pub fn message_contains(pattern: impl Into<Vec<u8>>) -> RevFilter {
    let pattern = pattern.into();
    Box::new(move |commit: &Commit| commit.message.find(&pattern).is_some())
}

/// Keep commits whose author name or email contains `pattern`.
pub fn author_contains(pattern: impl Into<Vec<u8>>) -> RevFilter {
    let pattern = pattern.into();
    Box::new(move |commit: &Commit| {
        commit.author.name.find(&pattern).is_some()
            || commit.author.email.find(&pattern).is_some()
    })
}

/// Keep commits whose committer name or email contains `pattern`.
pub fn committer_contains(pattern: impl Into<Vec<u8>>) -> RevFilter {
    let pattern = pattern.into();
    Box::new(move |commit: &Commit| {
        commit.committer.name.find(&pattern).is_some()
            || commit.committer.email.find(&pattern).is_some()
    })
}

/// Drop merge commits.
pub fn no_merges() -> RevFilter {
    Box::new(|commit: &Commit| commit.parents.len() < 2)
}

/// Keep only commits committed at or after `epoch_seconds`.
pub fn since(epoch_seconds: i64) -> RevFilter {
    Box::new(move |commit: &Commit| commit.committer.when.seconds >= epoch_seconds)
}

/// Keep only commits committed at or before `epoch_seconds`.
pub fn until(epoch_seconds: i64) -> RevFilter {
    Box::new(move |commit: &Commit| commit.committer.when.seconds <= epoch_seconds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bstr::BString;
    use ferrite_hash::Oid;
    use ferrite_util::{GitTime, Ident};

    fn commit(message: &str, parents: usize, when: i64) -> Commit {
        let mut raw = [0u8; 20];
        raw[19] = 1;
        let oid = Oid::from_raw(&raw, ferrite_hash::HashKind::Sha1).unwrap();
        Commit {
            tree: oid,
            parents: vec![oid; parents],
            author: Ident::new("Alice Dev", "alice@example.com", GitTime::new(when, 0)),
            committer: Ident::new("Bob Int", "bob@example.com", GitTime::new(when, 0)),
            gpgsig: None,
            extra_headers: vec![],
            message: BString::from(message),
        }
    }

    #[test]
    fn message_filter() {
        let f = message_contains("fix");
        assert!(f(&commit("fix: a bug", 1, 0)));
        assert!(!f(&commit("feat: a thing", 1, 0)));
    }

    #[test]
    fn author_and_committer_filters() {
        let c = commit("x", 1, 0);
        assert!(author_contains("alice@")(&c));
        assert!(!author_contains("bob@")(&c));
        assert!(committer_contains("Bob")(&c));
    }

    #[test]
    fn merge_filter() {
        let f = no_merges();
        assert!(f(&commit("plain", 1, 0)));
        assert!(f(&commit("root", 0, 0)));
        assert!(!f(&commit("merge", 2, 0)));
    }

    #[test]
    fn time_window_filters() {
        let c = commit("x", 1, 1000);
        assert!(since(1000)(&c));
        assert!(!since(1001)(&c));
        assert!(until(1000)(&c));
        assert!(!until(999)(&c));
    }
}
