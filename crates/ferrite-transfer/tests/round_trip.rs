//! Full fetch and push rounds between two on-disk repositories over
//! in-memory byte channels.

use bstr::BString;
use ferrite_hash::Oid;
use ferrite_object::{Blob, Commit, EntryMode, Object, Tree, TreeEntry};
use ferrite_refs::RefName;
use ferrite_repo::Repository;
use ferrite_transfer::{
    parse_advertisement, CommandStatus, FetchClient, Hooks, PushClient, PushedRef,
    ReceivePack, UploadPack,
};
use ferrite_util::{GitTime, HostContext, Ident};
use ferrite_wire::PktReader;

struct Repo {
    _dir: tempfile::TempDir,
    repo: Repository,
}

impl Repo {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path().join("repo.git"), true, &HostContext).unwrap();
        Self { _dir: dir, repo }
    }

    fn blob(&self, data: &[u8]) -> Oid {
        self.repo
            .odb()
            .write(&Object::Blob(Blob::from_bytes(data)))
            .unwrap()
    }

    fn tree(&self, entries: Vec<(&str, Oid)>) -> Oid {
        let tree = Tree::from_entries(
            entries
                .into_iter()
                .map(|(name, oid)| TreeEntry::new(EntryMode::Regular, name, oid))
                .collect(),
        )
        .unwrap();
        self.repo.odb().write(&Object::Tree(tree)).unwrap()
    }

    fn commit(&self, tree: Oid, parents: &[Oid], when: i64, message: &str) -> Oid {
        let ident = Ident::new("Dev", "dev@example.com", GitTime::new(when, 0));
        self.repo
            .odb()
            .write(&Object::Commit(Commit {
                tree,
                parents: parents.to_vec(),
                author: ident.clone(),
                committer: ident,
                gpgsig: None,
                extra_headers: vec![],
                message: BString::from(message),
            }))
            .unwrap()
    }

    fn set_ref(&self, name: &str, oid: Oid) {
        self.repo
            .refs()
            .update(RefName::new(name).unwrap(), oid)
            .force(true)
            .apply()
            .unwrap();
    }

    fn seed_history(&self) -> (Oid, Oid) {
        let blob1 = self.blob(b"first version\n");
        let tree1 = self.tree(vec![("file.txt", blob1)]);
        let c1 = self.commit(tree1, &[], 1000, "first\n");

        let blob2 = self.blob(b"second version\n");
        let tree2 = self.tree(vec![("file.txt", blob2)]);
        let c2 = self.commit(tree2, &[c1], 2000, "second\n");

        self.set_ref("refs/heads/main", c2);
        (c1, c2)
    }
}

fn advertise_upload(server: &Repository) -> ferrite_transfer::Advertised {
    let mut bytes = Vec::new();
    UploadPack::new(server).advertise(&mut bytes).unwrap();
    parse_advertisement(&mut PktReader::new(bytes.as_slice())).unwrap()
}

fn advertise_receive(server: &Repository) -> ferrite_transfer::Advertised {
    let mut bytes = Vec::new();
    ReceivePack::new(server).advertise(&mut bytes).unwrap();
    parse_advertisement(&mut PktReader::new(bytes.as_slice())).unwrap()
}

#[test]
fn clone_round_makes_wants_reachable() {
    let server = Repo::new();
    let (c1, c2) = server.seed_history();

    let client = Repo::new();
    let advertised = advertise_upload(&server.repo);
    assert!(advertised.caps.has("multi_ack"));
    assert!(advertised.caps.has("side-band-64k"));

    let fetch = FetchClient::new(&client.repo);
    let outcome = fetch
        .fetch_round(&advertised, &[], |request| {
            let mut response = Vec::new();
            UploadPack::new(&server.repo)
                .serve(request, &mut response)
                .unwrap();
            Ok(response)
        })
        .unwrap();

    assert!(outcome.pack_size > 0);
    assert_eq!(outcome.new_objects, 6); // 2 commits, 2 trees, 2 blobs

    // reachable(wants) ⊆ objects(client): every object of both commits.
    for oid in [c1, c2] {
        let obj = client.repo.odb().read(&oid).unwrap();
        let commit = match obj {
            Object::Commit(commit) => commit,
            other => panic!("expected commit, got {:?}", other.kind()),
        };
        let tree = match client.repo.odb().read(&commit.tree).unwrap() {
            Object::Tree(tree) => tree,
            _ => unreachable!(),
        };
        for entry in tree.entries() {
            assert!(client.repo.odb().contains(&entry.oid));
        }
    }
    assert_eq!(
        client
            .repo
            .refs()
            .resolve(&RefName::new("refs/heads/main").unwrap())
            .unwrap(),
        Some(c2)
    );
}

#[test]
fn incremental_fetch_ships_only_the_difference() {
    let server = Repo::new();
    let (c1, c2) = server.seed_history();

    // The client already has c1's history.
    let client = Repo::new();
    let advertised_at_c1 = {
        server.set_ref("refs/heads/main", c1);
        advertise_upload(&server.repo)
    };
    let fetch = FetchClient::new(&client.repo);
    fetch
        .fetch_round(&advertised_at_c1, &[], |request| {
            let mut response = Vec::new();
            UploadPack::new(&server.repo)
                .serve(request, &mut response)
                .unwrap();
            Ok(response)
        })
        .unwrap();

    server.set_ref("refs/heads/main", c2);
    let advertised = advertise_upload(&server.repo);
    let outcome = fetch
        .fetch_round(&advertised, &[], |request| {
            let mut response = Vec::new();
            UploadPack::new(&server.repo)
                .serve(request, &mut response)
                .unwrap();
            Ok(response)
        })
        .unwrap();

    // Only the second commit, its tree and its blob travel.
    assert_eq!(outcome.new_objects, 3);
    assert!(client.repo.odb().contains(&c2));
}

#[test]
fn fetch_when_up_to_date_moves_nothing() {
    let server = Repo::new();
    server.seed_history();

    let client = Repo::new();
    let advertised = advertise_upload(&server.repo);
    let fetch = FetchClient::new(&client.repo);
    fetch
        .fetch_round(&advertised, &[], |request| {
            let mut response = Vec::new();
            UploadPack::new(&server.repo)
                .serve(request, &mut response)
                .unwrap();
            Ok(response)
        })
        .unwrap();

    let outcome = fetch
        .fetch_round(&advertised, &[], |_| panic!("no request should be sent"))
        .unwrap();
    assert_eq!(outcome.pack_size, 0);
    assert_eq!(outcome.new_objects, 0);
}

#[test]
fn push_round_updates_server_refs() {
    let client = Repo::new();
    let (_, c2) = client.seed_history();

    let server = Repo::new();
    let advertised = advertise_receive(&server.repo);
    assert!(advertised.is_empty_repo());
    assert!(advertised.caps.has("report-status"));
    assert!(advertised.caps.has("delete-refs"));
    assert!(advertised.caps.has("atomic"));

    let push = PushClient::new(&client.repo);
    let outcome = push
        .push_round(
            &advertised,
            &[PushedRef {
                name: RefName::new("refs/heads/main").unwrap(),
                new: Some(c2),
            }],
            |request| {
                let mut response = Vec::new();
                ReceivePack::new(&server.repo)
                    .serve(request, &mut response)
                    .unwrap();
                Ok(response)
            },
        )
        .unwrap();

    assert!(outcome.unpack_ok);
    assert!(outcome.all_ok());
    assert_eq!(
        server
            .repo
            .refs()
            .resolve(&RefName::new("refs/heads/main").unwrap())
            .unwrap(),
        Some(c2)
    );
    assert!(server.repo.odb().contains(&c2));
}

#[test]
fn push_reports_exact_received_pack_size() {
    let client = Repo::new();
    let blob = client.blob(b"a blob of exactly thirty-nine bytes!!!\n");
    let tree = client.tree(vec![("f", blob)]);
    let commit = client.commit(tree, &[], 1000, "one\n");
    client.set_ref("refs/heads/main", commit);

    let server = Repo::new();
    let advertised = advertise_receive(&server.repo);

    let push = PushClient::new(&client.repo);
    let request = push
        .write_request(
            &advertised,
            &[PushedRef {
                name: RefName::new("refs/heads/main").unwrap(),
                new: Some(commit),
            }],
        )
        .unwrap();

    let mut response = Vec::new();
    let outcome = ReceivePack::new(&server.repo)
        .serve(request.as_slice(), &mut response)
        .unwrap();

    // The server accounts for every byte of the pack it received: the
    // request minus the command section is exactly the pack stream.
    let command_section_len = request
        .windows(4)
        .position(|w| w == b"PACK")
        .expect("request embeds a pack");
    assert_eq!(
        outcome.pack_size,
        Some((request.len() - command_section_len) as u64)
    );
}

#[test]
fn stale_push_is_rejected_per_ref() {
    let client = Repo::new();
    let (_, c2) = client.seed_history();

    let server = Repo::new();
    // The server's main already moved somewhere the client has not seen.
    let other_blob = server.blob(b"diverged\n");
    let other_tree = server.tree(vec![("d", other_blob)]);
    let diverged = server.commit(other_tree, &[], 5000, "diverged\n");
    server.set_ref("refs/heads/main", diverged);

    // Client builds its request against a stale advertisement claiming
    // the ref is unborn.
    let stale = ferrite_transfer::Advertised {
        refs: Vec::new(),
        caps: advertise_receive(&server.repo).caps,
    };

    let push = PushClient::new(&client.repo);
    let outcome = push
        .push_round(
            &stale,
            &[PushedRef {
                name: RefName::new("refs/heads/main").unwrap(),
                new: Some(c2),
            }],
            |request| {
                let mut response = Vec::new();
                ReceivePack::new(&server.repo)
                    .serve(request, &mut response)
                    .unwrap();
                Ok(response)
            },
        )
        .unwrap();

    assert!(outcome.unpack_ok);
    assert!(!outcome.all_ok());
    // The server still points at its own commit.
    assert_eq!(
        server
            .repo
            .refs()
            .resolve(&RefName::new("refs/heads/main").unwrap())
            .unwrap(),
        Some(diverged)
    );
}

#[test]
fn delete_ref_round() {
    let client = Repo::new();
    let (_, c2) = client.seed_history();

    let server = Repo::new();
    // First push establishes the branch.
    let push = PushClient::new(&client.repo);
    push.push_round(
        &advertise_receive(&server.repo),
        &[PushedRef {
            name: RefName::new("refs/heads/main").unwrap(),
            new: Some(c2),
        }],
        |request| {
            let mut response = Vec::new();
            ReceivePack::new(&server.repo)
                .serve(request, &mut response)
                .unwrap();
            Ok(response)
        },
    )
    .unwrap();

    // Second push deletes it.
    let outcome = push
        .push_round(
            &advertise_receive(&server.repo),
            &[PushedRef {
                name: RefName::new("refs/heads/main").unwrap(),
                new: None,
            }],
            |request| {
                let mut response = Vec::new();
                ReceivePack::new(&server.repo)
                    .serve(request, &mut response)
                    .unwrap();
                Ok(response)
            },
        )
        .unwrap();

    assert!(outcome.all_ok());
    assert_eq!(
        server
            .repo
            .refs()
            .resolve(&RefName::new("refs/heads/main").unwrap())
            .unwrap(),
        None
    );
}

#[test]
fn atomic_push_applies_nothing_on_any_rejection() {
    let client = Repo::new();
    let (_, c2) = client.seed_history();

    let server = Repo::new();
    // A hook that rejects everything.
    let mut hooks = Hooks::none();
    hooks.pre_receive = Some(Box::new(|_ctx, _commands| {
        Err("policy says no".to_string())
    }));

    let advertised = advertise_receive(&server.repo);
    let push = PushClient::new(&client.repo).atomic(true);
    let outcome = push
        .push_round(
            &advertised,
            &[
                PushedRef {
                    name: RefName::new("refs/heads/main").unwrap(),
                    new: Some(c2),
                },
                PushedRef {
                    name: RefName::new("refs/heads/mirror").unwrap(),
                    new: Some(c2),
                },
            ],
            |request| {
                let mut response = Vec::new();
                ReceivePack::new(&server.repo)
                    .with_hooks(hooks)
                    .serve(request, &mut response)
                    .unwrap();
                Ok(response)
            },
        )
        .unwrap();

    assert!(!outcome.all_ok());
    assert_eq!(outcome.ref_status.len(), 2);
    for (_, status) in &outcome.ref_status {
        assert!(status.is_err());
    }
    assert!(server.repo.refs().iter(None).unwrap().is_empty());
}

#[test]
fn hook_messages_reach_the_client_in_order() {
    let client = Repo::new();
    let (_, c2) = client.seed_history();
    let server = Repo::new();

    let mut hooks = Hooks::none();
    hooks.pre_receive = Some(Box::new(|ctx, _commands| {
        ctx.send_message("message line 1");
        ctx.send_error("no soup for you!");
        ctx.send_message("come back next year!");
        Ok(())
    }));

    let advertised = advertise_receive(&server.repo);
    let push = PushClient::new(&client.repo);
    let outcome = push
        .push_round(
            &advertised,
            &[PushedRef {
                name: RefName::new("refs/heads/main").unwrap(),
                new: Some(c2),
            }],
            |request| {
                let mut response = Vec::new();
                ReceivePack::new(&server.repo)
                    .with_hooks(hooks)
                    .serve(request, &mut response)
                    .unwrap();
                Ok(response)
            },
        )
        .unwrap();

    assert!(outcome.all_ok());
    assert_eq!(
        outcome.messages,
        "message line 1\nerror: no soup for you!\ncome back next year!\n"
    );
}

#[test]
fn update_hook_rejects_a_single_ref() {
    let client = Repo::new();
    let (_, c2) = client.seed_history();
    let server = Repo::new();

    let mut hooks = Hooks::none();
    hooks.update = Some(Box::new(|_ctx, command| {
        if command.name.as_str().ends_with("blocked") {
            Err("this branch is frozen".to_string())
        } else {
            Ok(())
        }
    }));

    let advertised = advertise_receive(&server.repo);
    let push = PushClient::new(&client.repo);
    let outcome = push
        .push_round(
            &advertised,
            &[
                PushedRef {
                    name: RefName::new("refs/heads/main").unwrap(),
                    new: Some(c2),
                },
                PushedRef {
                    name: RefName::new("refs/heads/blocked").unwrap(),
                    new: Some(c2),
                },
            ],
            |request| {
                let mut response = Vec::new();
                ReceivePack::new(&server.repo)
                    .with_hooks(hooks)
                    .serve(request, &mut response)
                    .unwrap();
                Ok(response)
            },
        )
        .unwrap();

    let by_name: std::collections::HashMap<_, _> = outcome
        .ref_status
        .iter()
        .map(|(name, status)| (name.as_str(), status.clone()))
        .collect();
    assert!(by_name["refs/heads/main"].is_ok());
    assert_eq!(
        by_name["refs/heads/blocked"],
        Err("this branch is frozen".to_string())
    );

    // Server applied exactly the accepted one.
    assert_eq!(
        server
            .repo
            .refs()
            .resolve(&RefName::new("refs/heads/main").unwrap())
            .unwrap(),
        Some(c2)
    );
    assert_eq!(
        server
            .repo
            .refs()
            .resolve(&RefName::new("refs/heads/blocked").unwrap())
            .unwrap(),
        None
    );
}

#[test]
fn server_side_receive_outcome_matches_report() {
    let client = Repo::new();
    let (_, c2) = client.seed_history();
    let server = Repo::new();

    let advertised = advertise_receive(&server.repo);
    let push = PushClient::new(&client.repo);
    let request = push
        .write_request(
            &advertised,
            &[PushedRef {
                name: RefName::new("refs/heads/main").unwrap(),
                new: Some(c2),
            }],
        )
        .unwrap();

    let mut response = Vec::new();
    let outcome = ReceivePack::new(&server.repo)
        .serve(request.as_slice(), &mut response)
        .unwrap();
    assert_eq!(outcome.commands.len(), 1);
    assert_eq!(outcome.commands[0].1, CommandStatus::Ok);
    assert!(outcome.pack_size.is_some());
}
