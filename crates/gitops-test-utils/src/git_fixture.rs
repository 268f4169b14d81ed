//! Git repository fixtures with real commit history.
//!
//! Everything here builds a valid git object store via `git2`. Tests that
//! only need canned manifests should prefer [`ScriptedSource`](crate::ScriptedSource),
//! which skips the filesystem entirely.

use std::fs;
use std::path::Path;

use git2::{Repository, RepositoryInitOptions, Signature};

/// Initialise a real git repository with `main` as the initial branch.
///
/// Realism level: REAL (valid object store, empty history).
///
/// # Panics
/// Panics if `git2` fails to initialise the repository.
pub fn init_repo(path: &Path) -> Repository {
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head("refs/heads/main");
    Repository::init_opts(path, &opts).unwrap_or_else(|e| {
        panic!(
            "init_repo: failed to init repository at {}: {e}",
            path.display()
        )
    })
}

/// Write files into the working tree and commit them, returning the commit id.
///
/// Paths are relative to the repository root and parent directories are
/// created as needed. The commit advances `HEAD` on the current branch, so
/// calling this repeatedly builds a linear history.
///
/// # Panics
/// Panics if any filesystem or git operation fails.
pub fn commit_files(repo: &Repository, files: &[(&str, &str)], message: &str) -> String {
    let workdir = repo
        .workdir()
        .unwrap_or_else(|| panic!("commit_files: repository has no working tree"));

    for (rel, content) in files {
        let path = workdir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap_or_else(|e| {
                panic!("commit_files: failed to create {}: {e}", parent.display())
            });
        }
        fs::write(&path, content)
            .unwrap_or_else(|e| panic!("commit_files: failed to write {rel}: {e}"));
    }

    let mut index = repo
        .index()
        .unwrap_or_else(|e| panic!("commit_files: failed to open index: {e}"));
    for (rel, _) in files {
        index
            .add_path(Path::new(rel))
            .unwrap_or_else(|e| panic!("commit_files: failed to stage {rel}: {e}"));
    }
    index
        .write()
        .unwrap_or_else(|e| panic!("commit_files: failed to write index: {e}"));
    let tree_id = index
        .write_tree()
        .unwrap_or_else(|e| panic!("commit_files: failed to write tree: {e}"));
    let tree = repo
        .find_tree(tree_id)
        .unwrap_or_else(|e| panic!("commit_files: failed to look up tree: {e}"));

    let signature = Signature::now("Fixture", "fixture@example.com")
        .unwrap_or_else(|e| panic!("commit_files: failed to build signature: {e}"));
    // First commit has no parent; every later one chains onto HEAD.
    let parent = repo.head().ok().and_then(|head| head.peel_to_commit().ok());
    let parents: Vec<_> = parent.iter().collect();
    let oid = repo
        .commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )
        .unwrap_or_else(|e| panic!("commit_files: failed to commit: {e}"));
    oid.to_string()
}

/// Tag the current `HEAD` commit with a lightweight tag.
///
/// # Panics
/// Panics if `HEAD` cannot be resolved or the tag cannot be created.
pub fn tag_head(repo: &Repository, name: &str) {
    let head = repo
        .revparse_single("HEAD")
        .unwrap_or_else(|e| panic!("tag_head: failed to resolve HEAD: {e}"));
    repo.tag_lightweight(name, &head, false)
        .unwrap_or_else(|e| panic!("tag_head: failed to create tag {name}: {e}"));
}
