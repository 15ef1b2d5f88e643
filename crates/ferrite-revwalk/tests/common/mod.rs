//! Shared fixture: an on-disk object store seeded with synthetic history.

use bstr::BString;
use ferrite_hash::Oid;
use ferrite_object::{Blob, Commit, EntryMode, Object, Tree, TreeEntry};
use ferrite_odb::ObjectStore;
use ferrite_util::{GitTime, Ident};

pub struct RepoFixture {
    _dir: tempfile::TempDir,
    pub store: ObjectStore,
}

impl RepoFixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::open(dir.path().join("objects")).unwrap();
        Self { _dir: dir, store }
    }

    pub fn ident(&self, when: i64) -> Ident {
        Ident::new("Test Dev", "dev@example.com", GitTime::new(when, 0))
    }

    pub fn empty_tree(&self) -> Oid {
        self.store.write(&Object::Tree(Tree::empty())).unwrap()
    }

    pub fn blob(&self, content: &[u8]) -> Oid {
        self.store
            .write(&Object::Blob(Blob::from_bytes(content)))
            .unwrap()
    }

    pub fn tree(&self, entries: Vec<(EntryMode, &str, Oid)>) -> Oid {
        let tree = Tree::from_entries(
            entries
                .into_iter()
                .map(|(mode, name, oid)| TreeEntry::new(mode, name, oid))
                .collect(),
        )
        .unwrap();
        self.store.write(&Object::Tree(tree)).unwrap()
    }

    /// A commit over the empty tree.
    pub fn commit(&self, message: &str, parents: &[Oid], when: i64) -> Oid {
        self.commit_with_tree(message, parents, when, self.empty_tree())
    }

    pub fn commit_with_tree(
        &self,
        message: &str,
        parents: &[Oid],
        when: i64,
        tree: Oid,
    ) -> Oid {
        let commit = Commit {
            tree,
            parents: parents.to_vec(),
            author: self.ident(when),
            committer: self.ident(when),
            gpgsig: None,
            extra_headers: vec![],
            message: BString::from(message),
        };
        self.store.write(&Object::Commit(commit)).unwrap()
    }
}
