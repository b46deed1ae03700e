use gitlite_core::{Config, Error, ErrorKind, Repository, Silent};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn setup() -> (TempDir, Repository) {
    let dir = TempDir::new().unwrap();
    let repo = Repository::init(&dir.path().join("P"), Config::default()).unwrap();
    (dir, repo)
}

fn write(repo: &Repository, name: &str, body: &str) {
    let path = repo.root().join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

#[test]
fn first_commit_freezes_staged_file() {
    let (_dir, mut repo) = setup();
    write(&repo, "notes.txt", "hello\n");

    repo.add(Path::new("notes.txt")).unwrap();
    let first = repo.commit("first", None).unwrap();

    assert_eq!(repo.commits().len(), 1);
    assert_eq!(first.files(), &["notes.txt".to_string()]);
    assert!(repo.staged().is_empty());
    assert_eq!(repo.head(), Some(first.id()));
}

#[test]
fn second_commit_diff_partitions_files() {
    let (_dir, mut repo) = setup();
    write(&repo, "notes.txt", "hello\n");
    write(&repo, "todo.txt", "milk\n");

    repo.add(Path::new("notes.txt")).unwrap();
    let first = repo.commit("first", None).unwrap();
    repo.add(Path::new("todo.txt")).unwrap();
    let second = repo.commit("second", None).unwrap();

    let diff = repo.diff(first.id(), second.id(), false).unwrap();
    assert_eq!(diff.added, vec!["todo.txt"]);
    assert!(diff.removed.is_empty());
    assert_eq!(diff.common, vec!["notes.txt"]);
}

#[test]
fn deleted_file_leaves_next_commit() {
    let (_dir, mut repo) = setup();
    write(&repo, "notes.txt", "hello\n");
    write(&repo, "todo.txt", "milk\n");

    repo.add(Path::new("notes.txt")).unwrap();
    repo.add(Path::new("todo.txt")).unwrap();
    let first = repo.commit("first", None).unwrap();
    fs::remove_file(repo.root().join("todo.txt")).unwrap();
    write(&repo, "plan.md", "# plan\n");
    repo.add(Path::new("plan.md")).unwrap();
    let second = repo.commit("second", None).unwrap();

    let diff = repo.diff(first.id(), second.id(), false).unwrap();
    assert_eq!(diff.added, vec!["plan.md"]);
    assert_eq!(diff.removed, vec!["todo.txt"]);
    assert_eq!(diff.common, vec!["notes.txt"]);
}

#[test]
fn empty_message_is_rejected() {
    let (_dir, mut repo) = setup();
    write(&repo, "notes.txt", "hello\n");
    repo.add(Path::new("notes.txt")).unwrap();

    let err = repo.commit("", None).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(repo.commits().is_empty());
    assert_eq!(repo.head(), None);
    assert_eq!(repo.staged().len(), 1);
}

#[test]
fn commit_without_staged_files_fails() {
    let (_dir, mut repo) = setup();

    let err = repo.commit("x", None).unwrap_err();

    assert!(matches!(err, Error::EmptyCommit));
    assert!(repo.commits().is_empty());
}

#[test]
fn diff_of_unknown_commits_names_first() {
    let (_dir, repo) = setup();

    let err = repo.diff("unknown1", "unknown2", false).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(err.to_string().contains("unknown1"));
}

#[test]
fn commit_ids_are_unique_and_counts_match() {
    let (_dir, mut repo) = setup();
    let mut ids = HashSet::new();

    for round in 0..10 {
        for n in 0..=round % 3 {
            write(&repo, &format!("f{}_{}.txt", round, n), "x");
            repo.add(Path::new(&format!("f{}_{}.txt", round, n))).unwrap();
        }
        let staged = repo.staged().len();
        // Files of the previous commit that are still on disk carry over.
        let carried = repo.commits().last().map(|c| c.file_count()).unwrap_or(0);
        let commit = repo.commit(&format!("round {}", round), None).unwrap();

        assert_eq!(commit.file_count(), staged + carried);
        assert!(ids.insert(commit.id().to_string()));
        assert!(repo.staged().is_empty());
        assert_eq!(repo.head(), Some(commit.id()));
    }
}

#[test]
fn diff_against_itself_is_empty() {
    let (_dir, mut repo) = setup();
    write(&repo, "a.txt", "a");
    repo.add(Path::new("a.txt")).unwrap();
    let c = repo.commit("only", None).unwrap();

    let diff = repo.diff(c.id(), c.id(), true).unwrap();

    assert!(diff.added.is_empty());
    assert!(diff.removed.is_empty());
    assert!(diff.is_empty());
}

#[test]
fn diff_categories_do_not_overlap() {
    let (_dir, mut repo) = setup();
    for name in ["a.txt", "b.txt", "c.txt", "d.txt"] {
        write(&repo, name, name);
    }
    repo.add(Path::new("a.txt")).unwrap();
    repo.add(Path::new("b.txt")).unwrap();
    let one = repo.commit("one", None).unwrap();
    repo.add(Path::new("b.txt")).unwrap();
    repo.add(Path::new("c.txt")).unwrap();
    repo.add(Path::new("d.txt")).unwrap();
    let two = repo.commit("two", None).unwrap();

    let diff = repo.diff(one.id(), two.id(), false).unwrap();

    let mut seen = HashSet::new();
    for path in diff.added.iter().chain(&diff.removed).chain(&diff.common) {
        assert!(seen.insert(path.clone()), "{} appears twice", path);
    }
    let union: HashSet<String> = one.files().iter().chain(two.files()).cloned().collect();
    assert_eq!(seen, union);
}

#[test]
fn staging_twice_keeps_one_entry() {
    let (_dir, mut repo) = setup();
    write(&repo, "a.txt", "a");

    assert!(repo.add(Path::new("a.txt")).unwrap().newly_staged);
    assert!(!repo.add(Path::new("a.txt")).unwrap().newly_staged);
    assert_eq!(repo.staged().len(), 1);
}

#[test]
fn add_all_twice_stages_nothing_new() {
    let (_dir, mut repo) = setup();
    write(&repo, "a.txt", "a");
    write(&repo, "src/lib.rs", "pub fn x() {}");
    let root = repo.root().to_path_buf();

    let first = repo.add_all(&root, None, &Silent).unwrap();
    let second = repo.add_all(&root, None, &Silent).unwrap();

    assert_eq!(first.added_count(), 2);
    assert_eq!(second.added_count(), 0);
    assert_eq!(second.already_staged, 2);
}

#[test]
fn state_survives_reopen() {
    let (_dir, mut repo) = setup();
    write(&repo, "notes.txt", "hello\n");
    repo.add(Path::new("notes.txt")).unwrap();
    let first = repo.commit("first", Some("hand written".to_string())).unwrap();
    let root = repo.root().to_path_buf();
    drop(repo);

    let reopened = Repository::open(&root, Config::load(&root).unwrap()).unwrap();

    assert_eq!(reopened.head(), Some(first.id()));
    let log = reopened.log();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].summary(), "hand written");
    assert_eq!(log[0].message(), "first");
}
